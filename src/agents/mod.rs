//! Agents module - role-specialized model callers.
//!
//! # Roles
//! - **Planner**: decomposes a goal into steps
//! - **Builder**: produces a code artifact from plan, wisdom and previous attempt
//! - **Reviewer**: accepts or rejects an artifact
//! - **Reflector**: decides whether a rejection warrants research
//! - **Distiller**: turns research findings into a reusable lesson
//! - **GuardedBuilder**: builds a single feature inside a boilerplate's guardrails
//!
//! A role agent holds no state between calls. Everything it needs is in the
//! conversation it is handed.

mod parse;
pub mod prompts;
mod types;

pub use parse::{parse_plan, parse_reflection, parse_verdict};
pub use types::{AgentError, Plan, Reflection, Verdict, PARSE_ERROR_REASON};

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::llm::{ChatMessage, FailoverError, FailoverInvoker, ModelAttempt};

/// The fixed set of roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Planner,
    Builder,
    Reviewer,
    Reflector,
    Distiller,
    GuardedBuilder,
}

impl AgentRole {
    pub const ALL: [AgentRole; 6] = [
        Self::Planner,
        Self::Builder,
        Self::Reviewer,
        Self::Reflector,
        Self::Distiller,
        Self::GuardedBuilder,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Planner => "Planner",
            Self::Builder => "Builder",
            Self::Reviewer => "Reviewer",
            Self::Reflector => "Reflector",
            Self::Distiller => "Distiller",
            Self::GuardedBuilder => "GuardedBuilder",
        }
    }

    /// Prefix of the role's `AVON_<ROLE>_*` environment overrides.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Self::Planner => "PLANNER",
            Self::Builder => "BUILDER",
            Self::Reviewer => "REVIEWER",
            Self::Reflector => "REFLECTOR",
            Self::Distiller => "DISTILLER",
            Self::GuardedBuilder => "GUARD",
        }
    }

    pub fn default_instruction(&self) -> &'static str {
        match self {
            Self::Planner => prompts::PLANNER_INSTRUCTION,
            Self::Builder => prompts::BUILDER_INSTRUCTION,
            Self::Reviewer => prompts::REVIEWER_INSTRUCTION,
            Self::Reflector => prompts::REFLECTOR_INSTRUCTION,
            Self::Distiller => prompts::DISTILLER_INSTRUCTION,
            Self::GuardedBuilder => prompts::GUARDED_BUILDER_INSTRUCTION,
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A named role bound to a system instruction and an ordered model list.
#[derive(Debug, Clone)]
pub struct RoleAgent {
    role: AgentRole,
    attempts: Vec<ModelAttempt>,
    system_instruction: String,
}

impl RoleAgent {
    pub fn new(role: AgentRole, attempts: Vec<ModelAttempt>) -> Self {
        Self {
            role,
            attempts,
            system_instruction: role.default_instruction().to_string(),
        }
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    pub fn name(&self) -> &'static str {
        self.role.name()
    }

    pub fn attempts(&self) -> &[ModelAttempt] {
        &self.attempts
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    /// Produce this role's response to `conversation`, walking the model list.
    pub async fn think(
        &self,
        invoker: &FailoverInvoker,
        conversation: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<String, FailoverError> {
        tracing::debug!("{} thinking over {} message(s)", self.name(), conversation.len());
        invoker
            .invoke_with_failover(&self.attempts, &self.system_instruction, conversation, cancel)
            .await
    }

    /// Single user-message convenience over [`RoleAgent::think`].
    pub async fn ask(
        &self,
        invoker: &FailoverInvoker,
        prompt: impl Into<String>,
        cancel: &CancellationToken,
    ) -> Result<String, FailoverError> {
        self.think(invoker, &[ChatMessage::user(prompt)], cancel).await
    }
}

/// One agent per role.
#[derive(Debug, Clone)]
pub struct AgentRoster {
    pub planner: RoleAgent,
    pub builder: RoleAgent,
    pub reviewer: RoleAgent,
    pub reflector: RoleAgent,
    pub distiller: RoleAgent,
    pub guarded_builder: RoleAgent,
}

impl AgentRoster {
    pub fn from_config(config: &Config) -> Self {
        let agent = |role: AgentRole| RoleAgent::new(role, config.agents.for_role(role).attempts());
        Self {
            planner: agent(AgentRole::Planner),
            builder: agent(AgentRole::Builder),
            reviewer: agent(AgentRole::Reviewer),
            reflector: agent(AgentRole::Reflector),
            distiller: agent(AgentRole::Distiller),
            guarded_builder: agent(AgentRole::GuardedBuilder),
        }
    }

    pub fn get(&self, role: AgentRole) -> &RoleAgent {
        match role {
            AgentRole::Planner => &self.planner,
            AgentRole::Builder => &self.builder,
            AgentRole::Reviewer => &self.reviewer,
            AgentRole::Reflector => &self.reflector,
            AgentRole::Distiller => &self.distiller,
            AgentRole::GuardedBuilder => &self.guarded_builder,
        }
    }
}
