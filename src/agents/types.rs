//! Core types for the role agents.

use serde::{Deserialize, Serialize};

use crate::llm::FailoverError;

/// Reason recorded on a reflection whose output could not be parsed.
pub const PARSE_ERROR_REASON: &str = "parse error";

/// The plan produced once per run.
///
/// `text` is the Planner's raw output and is what the Builder sees. `steps` is
/// filled only when the Planner emitted the requested `{"steps": [...]}` JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<String>,
}

/// Reviewer decision for one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Accepted,
    Rejected { issues: String },
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    pub fn issues(&self) -> Option<&str> {
        match self {
            Self::Accepted => None,
            Self::Rejected { issues } => Some(issues),
        }
    }
}

/// Structured decision about whether a rejection warrants research.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reflection {
    pub should_research: bool,
    pub reason: String,
    #[serde(default)]
    pub search_queries: Vec<String>,
}

impl Reflection {
    /// Safe default used whenever the Reflector's output is unusable.
    pub fn fallback(reason: impl Into<String>) -> Self {
        Self {
            should_research: false,
            reason: reason.into(),
            search_queries: Vec::new(),
        }
    }

    pub fn parse_error() -> Self {
        Self::fallback(PARSE_ERROR_REASON)
    }

    /// Queries to actually run: none unless research was requested, and at most `max`.
    pub fn queries_to_run(&self, max: usize) -> &[String] {
        if !self.should_research {
            return &[];
        }
        let n = self.search_queries.len().min(max);
        &self.search_queries[..n]
    }
}

/// Errors that can occur in agent operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AgentError {
    #[error("Planning failed: {0}")]
    PlanningFailure(FailoverError),

    #[error("Build failed: {0}")]
    BuildFailure(FailoverError),

    #[error("Review failed: {0}")]
    ReviewFailure(FailoverError),

    #[error("Reflection failed: {0}")]
    ReflectionFailure(FailoverError),

    #[error("Distillation failed: {0}")]
    DistillationFailure(FailoverError),

    #[error("Run cancelled")]
    Cancelled,
}
