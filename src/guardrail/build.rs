//! Guardrailed build: one feature, one model call, validated before anything
//! is handed back. Output is never partially applied.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::{mega_prompt, validate, BoilerplateRegistry, RepoContext, Violation};
use crate::agents::{AgentRole, RoleAgent};
use crate::config::Config;
use crate::llm::{FailoverInvoker, ModelGateway};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailStatus {
    Safe,
    Blocked,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct GuardrailedBuildOutcome {
    pub status: GuardrailStatus,
    /// Display name of the resolved boilerplate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boilerplate: Option<String>,
    pub feature: String,
    /// Raw model output; present for `safe` and `blocked`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GuardrailedBuildOutcome {
    fn new(status: GuardrailStatus, feature: &str) -> Self {
        Self {
            status,
            boilerplate: None,
            feature: feature.to_string(),
            output: None,
            violations: Vec::new(),
            error: None,
        }
    }

    fn failed(feature: &str, error: impl ToString) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(GuardrailStatus::Failed, feature)
        }
    }
}

pub struct GuardrailedBuilder {
    registry: Arc<BoilerplateRegistry>,
    agent: RoleAgent,
    invoker: FailoverInvoker,
}

impl GuardrailedBuilder {
    pub fn new(registry: Arc<BoilerplateRegistry>, agent: RoleAgent, invoker: FailoverInvoker) -> Self {
        Self {
            registry,
            agent,
            invoker,
        }
    }

    pub fn from_config(config: &Config, registry: Arc<BoilerplateRegistry>, gateway: Arc<ModelGateway>) -> Self {
        let agent = RoleAgent::new(
            AgentRole::GuardedBuilder,
            config.agents.for_role(AgentRole::GuardedBuilder).attempts(),
        );
        Self::new(registry, agent, FailoverInvoker::new(gateway))
    }

    pub async fn run(
        &self,
        template_key: &str,
        feature: &str,
        target_dir: Option<&Path>,
        cancel: &CancellationToken,
    ) -> GuardrailedBuildOutcome {
        let policy = match self.registry.resolve(template_key) {
            Ok(policy) => policy.clone(),
            Err(e) => {
                tracing::error!("{}", e);
                return GuardrailedBuildOutcome::failed(feature, e);
            }
        };
        tracing::info!("Boilerplate: {} ({})", policy.name, policy.stack.join(", "));

        let ctx = {
            let policy = policy.clone();
            let target: Option<PathBuf> = target_dir.map(Path::to_path_buf);
            match tokio::task::spawn_blocking(move || RepoContext::read(target.as_deref(), &policy)).await {
                Ok(ctx) => ctx,
                Err(e) => {
                    tracing::warn!("Could not read repository context: {}", e);
                    RepoContext {
                        tree: "(Could not read tree)".to_string(),
                        readme: None,
                    }
                }
            }
        };

        let prompt = mega_prompt(&policy, feature, &ctx);
        tracing::info!("Sending guardrailed build prompt ({} chars)", prompt.len());

        let output = match self.agent.ask(&self.invoker, prompt, cancel).await {
            Ok(output) => output,
            Err(e) if e.is_cancelled() => {
                tracing::info!("Guardrailed build cancelled");
                return GuardrailedBuildOutcome {
                    boilerplate: Some(policy.name),
                    ..GuardrailedBuildOutcome::new(GuardrailStatus::Cancelled, feature)
                };
            }
            Err(e) => {
                tracing::error!("Guardrailed build failed: {}", e);
                return GuardrailedBuildOutcome {
                    boilerplate: Some(policy.name),
                    ..GuardrailedBuildOutcome::failed(feature, e)
                };
            }
        };

        let violations = validate(&output, &policy);
        let status = if violations.is_empty() {
            tracing::info!("All guardrails passed");
            GuardrailStatus::Safe
        } else {
            for v in &violations {
                tracing::warn!("Guardrail violation: {}", v);
            }
            GuardrailStatus::Blocked
        };

        GuardrailedBuildOutcome {
            boilerplate: Some(policy.name),
            output: Some(output),
            violations,
            ..GuardrailedBuildOutcome::new(status, feature)
        }
    }
}
