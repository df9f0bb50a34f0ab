//! Scripted collaborators shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::llm::{ChatMessage, ChatResponse, LlmClient, LlmError, TokenUsage};
use crate::search::{SearchError, SearchProvider, SearchResult};

const ANY_MODEL: &str = "*";

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

/// LLM client that replays scripted responses.
///
/// Responses are queued per model id (with a catch-all queue). Once a queue
/// runs dry its last response keeps being returned.
pub struct ScriptedClient {
    scripts: Mutex<HashMap<String, VecDeque<Result<String, LlmError>>>>,
    last: Mutex<HashMap<String, Result<String, LlmError>>>,
    delay: Option<Duration>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedClient {
    pub fn new(responses: Vec<Result<String, LlmError>>) -> Self {
        let mut scripts = HashMap::new();
        scripts.insert(ANY_MODEL.to_string(), responses.into_iter().collect());
        Self {
            scripts: Mutex::new(scripts),
            last: Mutex::new(HashMap::new()),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn for_model(self, model: &str, responses: Vec<Result<String, LlmError>>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(model.to_string(), responses.into_iter().collect());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, model: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.model == model)
            .collect()
    }

    fn next_response(&self, model: &str) -> Result<String, LlmError> {
        let mut scripts = self.scripts.lock().unwrap();
        let key = if scripts.contains_key(model) { model } else { ANY_MODEL };
        let next = scripts.get_mut(key).and_then(|q| q.pop_front());
        let mut last = self.last.lock().unwrap();
        match next {
            Some(response) => {
                last.insert(key.to_string(), response.clone());
                response
            }
            None => last
                .get(key)
                .cloned()
                .unwrap_or_else(|| Err(LlmError::parse_error(format!("no script for {}", model)))),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<ChatResponse, LlmError> {
        self.calls.lock().unwrap().push(RecordedCall {
            model: model.to_string(),
            messages: messages.to_vec(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let content = self.next_response(model)?;
        Ok(ChatResponse {
            content: Some(content),
            finish_reason: Some("stop".to_string()),
            usage: Some(TokenUsage::new(10, 5)),
        })
    }
}

/// Search provider that records queries and returns one canned hit each.
#[derive(Default)]
pub struct ScriptedSearch {
    queries: Mutex<Vec<String>>,
    fail_on: Option<String>,
    delay: Option<Duration>,
    cancel_on_search: Option<CancellationToken>,
}

impl ScriptedSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(query: &str) -> Self {
        Self {
            fail_on: Some(query.to_string()),
            ..Self::default()
        }
    }

    /// Cancel `token` as soon as a search starts, then take `delay` to answer.
    pub fn cancelling(token: CancellationToken, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            cancel_on_search: Some(token),
            ..Self::default()
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for ScriptedSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        self.queries.lock().unwrap().push(query.to_string());
        if let Some(token) = &self.cancel_on_search {
            token.cancel();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_on.as_deref() == Some(query) {
            return Err(SearchError::Request("connection reset".to_string()));
        }
        Ok(vec![SearchResult {
            title: format!("Docs for {}", query),
            url: format!("https://example.com/{}", query.replace(' ', "-")),
            snippet: format!("Notes about {}", query),
        }])
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
