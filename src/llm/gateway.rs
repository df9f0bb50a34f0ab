//! Model invocation gateway: one provider call with timeout and cancellation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::{ChatMessage, LlmClient, LlmError};

/// A single model invocation.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub provider_id: &'a str,
    pub model_id: &'a str,
    /// Sent as a leading system message when non-empty.
    pub system_instruction: &'a str,
    pub conversation: &'a [ChatMessage],
}

/// Uniform call interface over the registered providers.
///
/// # Invariants
/// - At most one provider request per `invoke` call (no retries, no caching)
/// - A call that outlives its timeout is dropped and reported as `Timeout`
/// - A cancelled token drops the in-flight call and reports `Cancelled`
#[derive(Clone, Default)]
pub struct ModelGateway {
    providers: HashMap<String, Arc<dyn LlmClient>>,
}

impl ModelGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider client under `provider_id`, replacing any previous one.
    pub fn register(&mut self, provider_id: impl Into<String>, client: Arc<dyn LlmClient>) {
        self.providers.insert(provider_id.into(), client);
    }

    pub fn with_provider(mut self, provider_id: impl Into<String>, client: Arc<dyn LlmClient>) -> Self {
        self.register(provider_id, client);
        self
    }

    pub fn provider_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Invoke one provider and return the completion text.
    pub async fn invoke(
        &self,
        request: &ModelRequest<'_>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        let client = self
            .providers
            .get(request.provider_id)
            .ok_or_else(|| LlmError::unknown_provider(request.provider_id))?;

        if cancel.is_cancelled() {
            return Err(LlmError::cancelled());
        }

        let mut messages = Vec::with_capacity(request.conversation.len() + 1);
        if !request.system_instruction.trim().is_empty() {
            messages.push(ChatMessage::system(request.system_instruction));
        }
        messages.extend_from_slice(request.conversation);

        tracing::debug!(
            provider = request.provider_id,
            model = request.model_id,
            timeout_ms = timeout.as_millis() as u64,
            "Invoking model"
        );

        let started = Instant::now();
        let call = client.chat_completion(request.model_id, &messages);

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(
                    provider = request.provider_id,
                    model = request.model_id,
                    "Model call cancelled after {:?}",
                    started.elapsed()
                );
                return Err(LlmError::cancelled());
            }
            outcome = tokio::time::timeout(timeout, call) => match outcome {
                Ok(result) => result?,
                Err(_) => {
                    return Err(LlmError::timeout(request.provider_id, request.model_id, timeout));
                }
            },
        };

        tracing::debug!(
            provider = request.provider_id,
            model = request.model_id,
            finish_reason = response.finish_reason.as_deref().unwrap_or("unknown"),
            prompt_tokens = response.usage.as_ref().map(|u| u.prompt_tokens),
            completion_tokens = response.usage.as_ref().map(|u| u.completion_tokens),
            total_tokens = response.usage.as_ref().map(|u| u.total_tokens),
            "Model responded in {:?}",
            started.elapsed()
        );

        response
            .content
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| {
                LlmError::parse_error(format!(
                    "{}/{} returned an empty completion",
                    request.provider_id, request.model_id
                ))
            })
    }
}
