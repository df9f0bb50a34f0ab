//! Guardrails for building inside an existing boilerplate.
//!
//! A [`BoilerplatePolicy`] says which directories a generated change may touch
//! and which files it must never touch. [`validate`] checks model output
//! against a policy without applying anything.
//!
//! # Output contract
//! A file is declared by either:
//! - a fenced code block whose info string is `language:path`, or
//! - a markdown heading (`##` to `######`) whose next non-blank line opens a
//!   fenced code block.
//!
//! Headings without a code block declare nothing. Section headings that do
//! carry a block (checklists, "Files" lists) are still checked against the
//! protected files; they are only exempt from the allowed-directory rule.

mod build;
mod prompt;
mod registry;

pub use build::{GuardrailStatus, GuardrailedBuildOutcome, GuardrailedBuilder};
pub use prompt::{mega_prompt, RepoContext, README_LIMIT, TREE_LIMIT};
pub use registry::BoilerplateRegistry;

use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GuardrailError {
    #[error("No boilerplate found for: {0}")]
    UnknownTemplate(String),

    #[error("Failed to read boilerplate file {path}: {source}")]
    PolicyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid boilerplate file {path}: {source}")]
    PolicyParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A pre-approved starter template and what generated code may touch in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoilerplatePolicy {
    #[serde(default)]
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub stack: Vec<String>,
    /// Directory prefixes, e.g. `src/components/`
    #[serde(default)]
    pub allowed_dirs: Vec<String>,
    /// Path suffixes that must never be written
    #[serde(default)]
    pub protected_files: Vec<String>,
    /// Basename globs (`*` any run, `?` one character)
    #[serde(default)]
    pub protected_patterns: Vec<String>,
}

impl BoilerplatePolicy {
    pub fn is_protected(&self, path: &str) -> bool {
        if self.protected_files.iter().any(|f| path.ends_with(f.as_str())) {
            return true;
        }
        let file_name = path.rsplit('/').next().unwrap_or(path);
        self.protected_patterns
            .iter()
            .filter_map(|pattern| glob_regex(pattern))
            .any(|re| re.is_match(file_name))
    }

    /// `path` is expected to be normalized; absolute paths and paths that
    /// climb out with `..` are never inside an allowed directory.
    pub fn is_in_allowed_dir(&self, path: &str) -> bool {
        !escapes_root(path) && self.allowed_dirs.iter().any(|dir| path.starts_with(dir.as_str()))
    }
}

fn escapes_root(path: &str) -> bool {
    path.starts_with('/') || path.split('/').any(|part| part == "..")
}

/// Anchored regex for a basename glob. Everything except `*` and `?` is literal.
fn glob_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }
    re.push('$');
    match Regex::new(&re) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!("Ignoring protected pattern {:?}: {}", pattern, e);
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    ProtectedFileWrite,
    OutsideAllowedDir,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub path: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ViolationKind::ProtectedFileWrite => {
                write!(f, "Attempted to modify protected file: {}", self.path)
            }
            ViolationKind::OutsideAllowedDir => {
                write!(f, "File outside allowed directories: {}", self.path)
            }
        }
    }
}

fn clean_path(raw: &str) -> String {
    let mut path = raw.trim();
    loop {
        let before = path;
        path = path.trim_matches('`').trim();
        path = path.strip_prefix("**").unwrap_or(path);
        path = path.strip_suffix("**").unwrap_or(path).trim();
        if path == before {
            break;
        }
    }
    normalize_path(path)
}

/// Collapse `.` and `..` components. A `..` that would climb above the start
/// is kept so the path can be rejected.
fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if path.starts_with('/') {
        format!("/{joined}")
    } else {
        joined
    }
}

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*#{2,6}\s+(.+?)\s*$").expect("valid heading regex"));

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

/// Info string of a fence line, empty for a bare fence.
fn fence_info(line: &str) -> &str {
    line.trim_start().trim_start_matches('`').trim()
}

/// Path from a fence info string such as `tsx:src/app/page.tsx`.
fn fence_path(info: &str) -> Option<String> {
    let (_, path) = info.split_once(':')?;
    let path = clean_path(path);
    (!path.is_empty()).then_some(path)
}

/// Section headings that are never file names.
fn is_section_heading(text: &str) -> bool {
    text.to_lowercase().contains("checklist") || text.contains("Files")
}

/// A file path declared in model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredFile {
    pub path: String,
    /// Declared by a section heading ("Checklist", "Files") rather than a file name
    pub section: bool,
}

/// File paths declared in `output`, deduplicated in first-seen order.
///
/// A fence with an info string always opens a block; only a bare fence can
/// close one. A path seen both as a section heading and as a file keeps the
/// stricter, non-section form.
pub fn extract_declared_files(output: &str) -> Vec<DeclaredFile> {
    let lines: Vec<&str> = output.lines().collect();
    let mut declared: Vec<DeclaredFile> = Vec::new();
    let mut push = |path: String, section: bool| match declared.iter_mut().find(|d| d.path == path) {
        Some(existing) => existing.section &= section,
        None => declared.push(DeclaredFile { path, section }),
    };

    let mut in_fence = false;
    for (i, line) in lines.iter().enumerate() {
        if is_fence(line) {
            let info = fence_info(line);
            if info.is_empty() {
                in_fence = !in_fence;
            } else {
                if let Some(path) = fence_path(info) {
                    push(path, false);
                }
                in_fence = true;
            }
            continue;
        }
        if in_fence {
            continue;
        }

        let Some(caps) = HEADING.captures(line) else {
            continue;
        };
        let heading = &caps[1];
        let opens_block = lines[i + 1..]
            .iter()
            .find(|l| !l.trim().is_empty())
            .is_some_and(|l| is_fence(l));
        if opens_block {
            let path = clean_path(heading);
            if !path.is_empty() {
                push(path, is_section_heading(heading));
            }
        }
    }

    declared
}

/// Check declared files against `policy`. Pure; the same input always yields
/// the same violations.
pub fn validate(output: &str, policy: &BoilerplatePolicy) -> Vec<Violation> {
    extract_declared_files(output)
        .into_iter()
        .filter_map(|DeclaredFile { path, section }| {
            if policy.is_protected(&path) {
                Some(Violation {
                    kind: ViolationKind::ProtectedFileWrite,
                    path,
                })
            } else if !section
                && !policy.is_in_allowed_dir(&path)
                && (path.contains('/') || path.contains('.'))
            {
                Some(Violation {
                    kind: ViolationKind::OutsideAllowedDir,
                    path,
                })
            } else {
                None
            }
        })
        .collect()
}
