//! Web search collaborators used during the research phase.
//!
//! Uses the Tavily API when `TAVILY_API_KEY` is set; otherwise an offline
//! provider that returns no results.

mod tavily;

pub use tavily::TavilySearch;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A single search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

impl SearchResult {
    /// Render the hit as a research finding for the distiller.
    pub fn as_finding(&self) -> String {
        format!("Source: {} ({})\n{}", self.title, self.url, self.snippet)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Search request failed: {0}")]
    Request(String),

    #[error("Search API error ({status}): {body}")]
    Api { status: u16, body: String },
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError>;

    fn name(&self) -> &str;
}

/// Provider used when no search backend is configured.
pub struct OfflineSearch;

#[async_trait]
impl SearchProvider for OfflineSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        tracing::debug!("Offline search: no results for {:?}", query);
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "offline"
    }
}

/// Pick a search provider from the environment.
pub fn from_env() -> Arc<dyn SearchProvider> {
    match std::env::var("TAVILY_API_KEY") {
        Ok(key) if !key.trim().is_empty() => Arc::new(TavilySearch::new(key)),
        _ => {
            tracing::info!("TAVILY_API_KEY not set; research phase runs offline");
            Arc::new(OfflineSearch)
        }
    }
}
