//! LLM client module for interacting with language models.
//!
//! This module provides a trait-based abstraction over text-generation
//! providers, a gateway that enforces per-call timeouts and cancellation,
//! and a failover invoker that walks an ordered list of model attempts.
//!
//! ```text
//!   RoleAgent ──▶ FailoverInvoker ──▶ ModelGateway ──▶ dyn LlmClient
//!                 (ordered attempts)   (timeout/cancel)  (ollama, openrouter)
//! ```

mod error;
mod failover;
mod gateway;
mod ollama;
mod openrouter;

pub use error::{classify_http_status, LlmError, LlmErrorKind};
pub use failover::{FailoverError, FailoverInvoker, ModelAttempt};
pub use gateway::{ModelGateway, ModelRequest};
pub use ollama::{OllamaClient, DEFAULT_OLLAMA_HOST};
pub use openrouter::OpenRouterClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Role in a chat conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    /// Create a simple text message.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        ChatMessage {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// Response from a chat completion.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: Option<String>,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
}

/// Token usage information (if provided by the upstream provider).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Create a usage object ensuring `total_tokens` is consistent.
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// Trait for LLM clients.
///
/// Implementations perform exactly one request per call. Timeouts and
/// cancellation are applied by [`ModelGateway`], which drops the returned
/// future to abort an in-flight request.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a chat completion request.
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<ChatResponse, LlmError>;
}
