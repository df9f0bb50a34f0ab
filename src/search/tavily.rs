//! Tavily search API client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{SearchError, SearchProvider, SearchResult};

const TAVILY_API_URL: &str = "https://api.tavily.com/search";
const DEFAULT_MAX_RESULTS: u32 = 5;

pub struct TavilySearch {
    client: reqwest::Client,
    api_key: String,
    max_results: u32,
}

impl TavilySearch {
    pub fn new(api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            api_key,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results.clamp(1, 10);
        self
    }
}

/// Tavily API request body.
#[derive(Debug, Serialize)]
struct TavilySearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: u32,
    include_answer: bool,
    include_raw_content: bool,
}

/// Tavily API response.
#[derive(Debug, Deserialize)]
struct TavilySearchResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

/// A single result from Tavily.
#[derive(Debug, Deserialize)]
struct TavilyResult {
    title: String,
    url: String,
    content: String,
}

impl From<TavilyResult> for SearchResult {
    fn from(r: TavilyResult) -> Self {
        SearchResult {
            title: r.title,
            url: r.url,
            snippet: r.content,
        }
    }
}

#[async_trait]
impl SearchProvider for TavilySearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        let request = TavilySearchRequest {
            api_key: &self.api_key,
            query,
            max_results: self.max_results,
            include_answer: false,
            include_raw_content: false,
        };

        let response = self
            .client
            .post(TAVILY_API_URL)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| SearchError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Api { status, body });
        }

        let parsed: TavilySearchResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Request(e.to_string()))?;

        Ok(parsed.results.into_iter().map(SearchResult::from).collect())
    }

    fn name(&self) -> &str {
        "tavily"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_maps_content_to_snippet() {
        let body = r#"{"answer": null, "results": [
            {"title": "T", "url": "https://u", "content": "C", "score": 0.9}
        ]}"#;
        let parsed: TavilySearchResponse = serde_json::from_str(body).unwrap();
        let results: Vec<SearchResult> = parsed.results.into_iter().map(Into::into).collect();
        assert_eq!(results[0].snippet, "C");
    }

    #[test]
    fn test_max_results_is_clamped() {
        let search = TavilySearch::new("k".into()).with_max_results(50);
        assert_eq!(search.max_results, 10);
    }
}
