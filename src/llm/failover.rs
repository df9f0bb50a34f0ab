//! Ordered model failover on top of the gateway.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{ChatMessage, LlmError, ModelGateway, ModelRequest};

/// A single entry in a failover chain: provider + model + per-call timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelAttempt {
    /// Provider id as registered on the gateway (e.g. "ollama", "openrouter").
    pub provider_id: String,
    /// Model id understood by that provider (e.g. "Avon:latest").
    pub model_id: String,
    pub timeout_ms: u64,
}

impl ModelAttempt {
    pub fn new(provider_id: impl Into<String>, model_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            provider_id: provider_id.into(),
            model_id: model_id.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Parse `provider/model[@timeout_ms]`.
    ///
    /// Only the first `/` separates the provider, so OpenRouter style model ids
    /// such as `openrouter/anthropic/claude-sonnet-4.5` keep their slash.
    pub fn parse(entry: &str, default_timeout: Duration) -> Option<Self> {
        let entry = entry.trim();
        let (target, timeout) = match entry.rsplit_once('@') {
            Some((target, ms)) => (target, Duration::from_millis(ms.trim().parse().ok()?)),
            None => (entry, default_timeout),
        };
        let (provider, model) = target.split_once('/')?;
        let (provider, model) = (provider.trim(), model.trim());
        if provider.is_empty() || model.is_empty() {
            return None;
        }
        Some(Self::new(provider, model, timeout))
    }

    pub fn label(&self) -> String {
        format!("{}/{}", self.provider_id, self.model_id)
    }
}

/// Failure of a whole failover chain.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FailoverError {
    #[error("All {attempts} model attempts failed; last error: {last}")]
    AllAttemptsExhausted { attempts: usize, last: LlmError },

    #[error("No model attempts configured")]
    NoAttempts,

    #[error("Model call cancelled")]
    Cancelled,
}

impl FailoverError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Tries each [`ModelAttempt`] strictly in order until one succeeds.
///
/// # Invariants
/// - Earlier attempts are always tried before later ones
/// - Cancellation ends the walk; remaining attempts are not tried
#[derive(Clone)]
pub struct FailoverInvoker {
    gateway: Arc<ModelGateway>,
}

impl FailoverInvoker {
    pub fn new(gateway: Arc<ModelGateway>) -> Self {
        Self { gateway }
    }

    pub async fn invoke_with_failover(
        &self,
        attempts: &[ModelAttempt],
        system_instruction: &str,
        conversation: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<String, FailoverError> {
        let mut last_error: Option<LlmError> = None;

        for (index, attempt) in attempts.iter().enumerate() {
            tracing::debug!("Trying model {} ({}/{})", attempt.label(), index + 1, attempts.len());

            let request = ModelRequest {
                provider_id: &attempt.provider_id,
                model_id: &attempt.model_id,
                system_instruction,
                conversation,
            };

            match self.gateway.invoke(&request, attempt.timeout(), cancel).await {
                Ok(text) => {
                    if index > 0 {
                        tracing::info!(
                            "Model {} succeeded after {} failed attempt(s)",
                            attempt.label(),
                            index
                        );
                    }
                    return Ok(text);
                }
                Err(e) if e.is_cancelled() => return Err(FailoverError::Cancelled),
                Err(e) => {
                    tracing::warn!("Model {} failed: {}. Trying next...", attempt.label(), e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(last) => {
                tracing::error!("All {} model attempts failed", attempts.len());
                Err(FailoverError::AllAttemptsExhausted {
                    attempts: attempts.len(),
                    last,
                })
            }
            None => Err(FailoverError::NoAttempts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmErrorKind;
    use crate::testing::ScriptedClient;

    fn attempt(provider: &str, timeout_ms: u64) -> ModelAttempt {
        ModelAttempt::new(provider, "m", Duration::from_millis(timeout_ms))
    }

    #[test]
    fn test_parse_attempt_entry() {
        let default = Duration::from_secs(60);
        let a = ModelAttempt::parse("ollama/deepseek-r1:latest", default).unwrap();
        assert_eq!(a.provider_id, "ollama");
        assert_eq!(a.model_id, "deepseek-r1:latest");
        assert_eq!(a.timeout(), default);

        let b = ModelAttempt::parse(" openrouter/anthropic/claude-sonnet-4.5@9000 ", default).unwrap();
        assert_eq!(b.provider_id, "openrouter");
        assert_eq!(b.model_id, "anthropic/claude-sonnet-4.5");
        assert_eq!(b.timeout_ms, 9000);

        assert!(ModelAttempt::parse("no-slash", default).is_none());
        assert!(ModelAttempt::parse("ollama/", default).is_none());
        assert!(ModelAttempt::parse("ollama/x@soon", default).is_none());
    }

    #[tokio::test]
    async fn test_falls_through_in_order() {
        let primary = Arc::new(ScriptedClient::new(vec![Err(LlmError::server_error(
            503,
            "overloaded".into(),
        ))]));
        let secondary = Arc::new(ScriptedClient::new(vec![Ok("from secondary".into())]));
        let tertiary = Arc::new(ScriptedClient::new(vec![Ok("from tertiary".into())]));
        let gateway = ModelGateway::new()
            .with_provider("primary", primary.clone())
            .with_provider("secondary", secondary.clone())
            .with_provider("tertiary", tertiary.clone());
        let invoker = FailoverInvoker::new(Arc::new(gateway));

        let text = invoker
            .invoke_with_failover(
                &[attempt("primary", 1000), attempt("secondary", 1000), attempt("tertiary", 1000)],
                "",
                &[ChatMessage::user("hi")],
                &CancellationToken::new(),
            )
            .await
            .expect("failover");

        assert_eq!(text, "from secondary");
        assert_eq!(primary.calls().len(), 1);
        assert_eq!(secondary.calls().len(), 1);
        assert!(tertiary.calls().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_moves_to_next_attempt() {
        let slow = Arc::new(
            ScriptedClient::new(vec![Ok("too late".into())]).with_delay(Duration::from_secs(5)),
        );
        let fast = Arc::new(ScriptedClient::new(vec![Ok("fallback".into())]));
        let gateway = ModelGateway::new()
            .with_provider("slow", slow)
            .with_provider("fast", fast);
        let invoker = FailoverInvoker::new(Arc::new(gateway));

        let text = invoker
            .invoke_with_failover(
                &[attempt("slow", 20), attempt("fast", 1000)],
                "",
                &[],
                &CancellationToken::new(),
            )
            .await
            .expect("failover");
        assert_eq!(text, "fallback");
    }

    #[tokio::test]
    async fn test_exhausted_carries_last_error() {
        let a = Arc::new(ScriptedClient::new(vec![Err(LlmError::rate_limited("slow down".into()))]));
        let b = Arc::new(ScriptedClient::new(vec![Err(LlmError::client_error(401, "bad key".into()))]));
        let gateway = ModelGateway::new().with_provider("a", a).with_provider("b", b);
        let invoker = FailoverInvoker::new(Arc::new(gateway));

        let err = invoker
            .invoke_with_failover(&[attempt("a", 1000), attempt("b", 1000)], "", &[], &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            FailoverError::AllAttemptsExhausted { attempts, last } => {
                assert_eq!(attempts, 2);
                assert_eq!(last.kind, LlmErrorKind::ClientError);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_attempts() {
        let invoker = FailoverInvoker::new(Arc::new(ModelGateway::new()));
        let err = invoker
            .invoke_with_failover(&[], "", &[], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FailoverError::NoAttempts));
    }

    #[tokio::test]
    async fn test_cancellation_stops_the_chain() {
        let first = Arc::new(ScriptedClient::new(vec![Ok("never".into())]));
        let second = Arc::new(ScriptedClient::new(vec![Ok("never".into())]));
        let gateway = ModelGateway::new()
            .with_provider("first", first.clone())
            .with_provider("second", second.clone());
        let invoker = FailoverInvoker::new(Arc::new(gateway));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = invoker
            .invoke_with_failover(&[attempt("first", 1000), attempt("second", 1000)], "", &[], &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(first.calls().is_empty());
        assert!(second.calls().is_empty());
    }
}
