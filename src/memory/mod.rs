//! Heuristics memory: the durable, append-only log of distilled lessons.
//!
//! Supports:
//! - `file`: markdown log shared by concurrent runs and processes
//! - `in_memory`: non-persistent, for testing and ephemeral runs
//!
//! Lessons are independent records. No lesson is ever edited or deleted.

mod file;
mod in_memory;

pub use file::FileHeuristicsStore;
pub use in_memory::InMemoryHeuristicsStore;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("Heuristics store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Refusing to store an empty lesson")]
    EmptyLesson,

    #[error("Heuristics writer task failed: {0}")]
    Join(String),
}

#[async_trait]
pub trait HeuristicsMemory: Send + Sync {
    /// Durably append one lesson. Concurrent appends never interleave.
    async fn append(&self, lesson: &str) -> Result<(), MemoryError>;

    /// All lessons in append order.
    async fn read_all(&self) -> Result<Vec<String>, MemoryError>;

    /// The `limit` most recent lessons, oldest first.
    async fn recent(&self, limit: usize) -> Result<Vec<String>, MemoryError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut lessons = self.read_all().await?;
        let skip = lessons.len().saturating_sub(limit);
        Ok(lessons.split_off(skip))
    }
}

/// Normalize a lesson before storage.
fn normalize_lesson(lesson: &str) -> Result<&str, MemoryError> {
    let trimmed = lesson.trim();
    if trimmed.is_empty() {
        Err(MemoryError::EmptyLesson)
    } else {
        Ok(trimmed)
    }
}
