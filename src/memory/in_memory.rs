use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{normalize_lesson, HeuristicsMemory, MemoryError};

#[derive(Default)]
pub struct InMemoryHeuristicsStore {
    lessons: RwLock<Vec<String>>,
}

impl InMemoryHeuristicsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HeuristicsMemory for InMemoryHeuristicsStore {
    async fn append(&self, lesson: &str) -> Result<(), MemoryError> {
        let lesson = normalize_lesson(lesson)?;
        self.lessons.write().await.push(lesson.to_string());
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<String>, MemoryError> {
        Ok(self.lessons.read().await.clone())
    }
}
