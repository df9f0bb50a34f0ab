//! Ollama chat client plus a local server bootstrap.

use std::net::SocketAddr;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::process::Command;

use super::{ChatMessage, ChatResponse, LlmClient, LlmError, TokenUsage};

pub const DEFAULT_OLLAMA_HOST: &str = "http://127.0.0.1:11434";

/// Client for a local (or remote) Ollama server's `/api/chat` endpoint.
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Socket address the server listens on, derived from the base URL.
    fn socket_addr(&self) -> Option<SocketAddr> {
        let without_scheme = self
            .base_url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.base_url);
        let authority = without_scheme.split('/').next()?;
        let authority = authority.replace("localhost", "127.0.0.1");
        if authority.contains(':') {
            authority.parse().ok()
        } else {
            format!("{}:11434", authority).parse().ok()
        }
    }

    /// Whether something accepts connections on the Ollama port.
    pub async fn is_running(&self) -> bool {
        let Some(addr) = self.socket_addr() else {
            return false;
        };
        matches!(
            tokio::time::timeout(Duration::from_secs(1), TcpStream::connect(addr)).await,
            Ok(Ok(_))
        )
    }

    /// Attach to a running server or spawn `ollama serve` and wait for it.
    pub async fn ensure_server(&self) -> anyhow::Result<()> {
        if self.is_running().await {
            tracing::info!("Ollama already running at {}; attaching", self.base_url);
            return Ok(());
        }

        tracing::info!("Starting `ollama serve` for {}", self.base_url);
        let mut child = Command::new("ollama")
            .arg("serve")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false)
            .spawn()
            .map_err(|e| anyhow::anyhow!("Failed to spawn ollama: {}", e))?;

        for _ in 0..50 {
            if self.is_running().await {
                tracing::info!("Ollama is accepting connections");
                return Ok(());
            }
            if let Some(status) = child.try_wait()? {
                anyhow::bail!("ollama serve exited early with {}", status);
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }

        anyhow::bail!("ollama serve did not open {} within 10s", self.base_url)
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<ChatResponse, LlmError> {
        let request = OllamaChatRequest {
            model,
            messages,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(LlmError::from_reqwest)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(LlmError::from_status(status.as_u16(), &body));
        }

        let parsed: OllamaChatResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::parse_error(format!("Failed to parse Ollama response: {}, body: {}", e, body))
        })?;

        let usage = match (parsed.prompt_eval_count, parsed.eval_count) {
            (Some(prompt), Some(completion)) => Some(TokenUsage::new(prompt, completion)),
            _ => None,
        };

        Ok(ChatResponse {
            content: parsed.message.map(|m| m.content),
            finish_reason: parsed.done_reason,
            usage,
        })
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    content: String,
}
