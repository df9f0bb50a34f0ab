//! Markdown file-backed heuristics store.
//!
//! Each lesson is appended as a `## Learned <RFC3339>` section. Appends hold an
//! in-process mutex and an exclusive OS lock on the file for the duration of
//! the write, so concurrent runs in one process or across processes never
//! interleave records.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use tokio::sync::Mutex;

use super::{normalize_lesson, HeuristicsMemory, MemoryError};

const SECTION_PREFIX: &str = "## Learned ";

#[derive(Clone)]
pub struct FileHeuristicsStore {
    path: PathBuf,
    append_lock: Arc<Mutex<()>>,
}

impl FileHeuristicsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            append_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn format_record(lesson: &str, learned_at: DateTime<Utc>) -> String {
    format!("\n\n{}{}\n{}", SECTION_PREFIX, learned_at.to_rfc3339(), escape_headers(lesson))
}

/// Lesson lines that would read back as a section header get a leading
/// backslash; [`unescape_line`] strips it again.
fn escape_headers(lesson: &str) -> String {
    lesson
        .lines()
        .map(|line| {
            if is_section_header(line.trim_start_matches('\\')) {
                format!("\\{line}")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn unescape_line(line: &str) -> &str {
    match line.strip_prefix('\\') {
        Some(rest) if is_section_header(rest.trim_start_matches('\\')) => rest,
        _ => line,
    }
}

fn append_record(path: &Path, record: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    FileExt::lock_exclusive(&file)?;
    let written = file.write_all(record.as_bytes()).and_then(|_| file.flush());
    let unlocked = FileExt::unlock(&file);
    written.and(unlocked)
}

/// Whether `line` opens a lesson section (the timestamp must parse).
fn is_section_header(line: &str) -> bool {
    line.strip_prefix(SECTION_PREFIX)
        .map(|ts| DateTime::parse_from_rfc3339(ts.trim()).is_ok())
        .unwrap_or(false)
}

/// Split the markdown log into lessons. Text before the first section is ignored.
fn parse_lessons(content: &str) -> Vec<String> {
    let mut lessons = Vec::new();
    let mut current: Option<Vec<&str>> = None;

    for line in content.lines() {
        if is_section_header(line) {
            if let Some(body) = current.take() {
                lessons.push(body.join("\n"));
            }
            current = Some(Vec::new());
        } else if let Some(body) = current.as_mut() {
            body.push(unescape_line(line));
        }
    }
    if let Some(body) = current {
        lessons.push(body.join("\n"));
    }

    lessons
        .into_iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

#[async_trait]
impl HeuristicsMemory for FileHeuristicsStore {
    async fn append(&self, lesson: &str) -> Result<(), MemoryError> {
        let record = format_record(normalize_lesson(lesson)?, Utc::now());
        let _guard = self.append_lock.lock().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || append_record(&path, &record))
            .await
            .map_err(|e| MemoryError::Join(e.to_string()))??;
        tracing::debug!("Appended lesson to {}", self.path.display());
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<String>, MemoryError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(parse_lessons(&content)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(MemoryError::Io(err)),
        }
    }
}
