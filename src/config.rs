//! Configuration management for Avon.
//!
//! Configuration can be set via environment variables:
//! - `AVON_MAX_RETRIES` - Optional. Build/review attempts per run (>= 1). Defaults to `3`.
//! - `AVON_MAX_WEB_SEARCHES` - Optional. Search queries run per reflection. Defaults to `3`.
//! - `AVON_PRIOR_LESSONS` - Optional. Stored lessons fed to every build. Defaults to `0`.
//! - `AVON_HEURISTICS_PATH` - Optional. Lesson log. Defaults to `memory/heuristics.md`.
//! - `AVON_BOILERPLATES_PATH` - Optional. JSON file with extra boilerplate policies.
//! - `AVON_DEFAULT_PROVIDER` / `AVON_DEFAULT_MODEL` / `AVON_DEFAULT_TIMEOUT_MS` - Optional.
//!   Model used by every role unless overridden. Defaults to `ollama`, `Avon:latest`, `60000`.
//! - `AVON_<ROLE>_PROVIDER` / `AVON_<ROLE>_MODEL` / `AVON_<ROLE>_TIMEOUT_MS` - Optional per-role
//!   overrides, `<ROLE>` one of `PLANNER`, `BUILDER`, `REVIEWER`, `REFLECTOR`, `DISTILLER`, `GUARD`.
//! - `AVON_<ROLE>_FALLBACKS` - Optional. Comma list of `provider/model[@timeout_ms]`.
//! - `AVON_QUEUE_WORKERS` / `AVON_QUEUE_CAPACITY` - Optional. Run queue sizing. Defaults `2` / `32`.
//! - `OLLAMA_HOST` - Optional. Defaults to `http://127.0.0.1:11434`.
//! - `OLLAMA_AUTOSTART` - Optional. Spawn `ollama serve` if nothing listens. Defaults to `false`.
//! - `OPENROUTER_API_KEY` - Optional. Registers the `openrouter` provider.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::agents::AgentRole;
use crate::llm::ModelAttempt;

pub const DEFAULT_PROVIDER: &str = "ollama";
pub const DEFAULT_MODEL: &str = "Avon:latest";
const DEFAULT_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_GUARD_TIMEOUT_MS: u64 = 120_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Provider/model selection for one role, plus ordered fallbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentModelConfig {
    pub provider_id: String,
    pub model_id: String,
    pub timeout_ms: u64,
    pub fallbacks: Vec<ModelAttempt>,
}

impl AgentModelConfig {
    pub fn new(provider_id: impl Into<String>, model_id: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            provider_id: provider_id.into(),
            model_id: model_id.into(),
            timeout_ms,
            fallbacks: Vec::new(),
        }
    }

    /// Primary attempt first, then the fallbacks in configured order.
    pub fn attempts(&self) -> Vec<ModelAttempt> {
        let primary = ModelAttempt::new(
            self.provider_id.clone(),
            self.model_id.clone(),
            Duration::from_millis(self.timeout_ms),
        );
        std::iter::once(primary)
            .chain(self.fallbacks.iter().cloned())
            .collect()
    }
}

/// Per-role model configuration.
#[derive(Debug, Clone)]
pub struct RoleModels {
    pub planner: AgentModelConfig,
    pub builder: AgentModelConfig,
    pub reviewer: AgentModelConfig,
    pub reflector: AgentModelConfig,
    pub distiller: AgentModelConfig,
    pub guarded_builder: AgentModelConfig,
}

impl RoleModels {
    /// Every role on the same provider/model.
    pub fn uniform(model: AgentModelConfig) -> Self {
        Self {
            planner: model.clone(),
            builder: model.clone(),
            reviewer: model.clone(),
            reflector: model.clone(),
            distiller: model.clone(),
            guarded_builder: model,
        }
    }

    pub fn for_role(&self, role: AgentRole) -> &AgentModelConfig {
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

/// Bounds on one supervisor run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum build/review attempts per run (>= 1)
    pub max_retries_per_task: usize,
    /// Maximum search queries issued per reflection
    pub max_web_searches: usize,
    /// Most recent stored lessons included in every build prompt (0 = none)
    pub prior_lessons: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_retries_per_task: 3,
            max_web_searches: 3,
            prior_lessons: 0,
        }
    }
}

/// Run queue sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    pub workers: usize,
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            capacity: 32,
        }
    }
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub limits: Limits,

    /// Model selection for each role
    pub agents: RoleModels,

    /// Markdown lesson log backing the heuristics memory
    pub heuristics_path: PathBuf,

    /// Optional JSON file with additional boilerplate policies
    pub boilerplates_path: Option<PathBuf>,

    pub ollama_host: String,

    /// Spawn `ollama serve` when nothing listens on the Ollama port
    pub ollama_autostart: bool,

    /// Registers the `openrouter` provider when set
    pub openrouter_api_key: Option<String>,

    pub queue: QueueConfig,
}

impl Default for Config {
    fn default() -> Self {
        let model = AgentModelConfig::new(DEFAULT_PROVIDER, DEFAULT_MODEL, DEFAULT_TIMEOUT_MS);
        let mut agents = RoleModels::uniform(model);
        agents.guarded_builder.timeout_ms = DEFAULT_GUARD_TIMEOUT_MS;
        Self {
            limits: Limits::default(),
            agents,
            heuristics_path: PathBuf::from("memory/heuristics.md"),
            boilerplates_path: None,
            ollama_host: crate::llm::DEFAULT_OLLAMA_HOST.to_string(),
            ollama_autostart: false,
            openrouter_api_key: None,
            queue: QueueConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for unparseable numbers, malformed
    /// fallback specs, or `AVON_MAX_RETRIES=0`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let max_retries_per_task: usize = parse_or(&get, "AVON_MAX_RETRIES", 3)?;
        if max_retries_per_task == 0 {
            return Err(ConfigError::InvalidValue(
                "AVON_MAX_RETRIES".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let limits = Limits {
            max_retries_per_task,
            max_web_searches: parse_or(&get, "AVON_MAX_WEB_SEARCHES", 3)?,
            prior_lessons: parse_or(&get, "AVON_PRIOR_LESSONS", 0)?,
        };

        let default_provider = get("AVON_DEFAULT_PROVIDER").unwrap_or_else(|| DEFAULT_PROVIDER.to_string());
        let default_model = get("AVON_DEFAULT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let default_timeout: u64 = parse_or(&get, "AVON_DEFAULT_TIMEOUT_MS", DEFAULT_TIMEOUT_MS)?;

        let role = |prefix: &str, timeout_default: u64| -> Result<AgentModelConfig, ConfigError> {
            let provider_id = get(&format!("AVON_{prefix}_PROVIDER")).unwrap_or_else(|| default_provider.clone());
            let model_id = get(&format!("AVON_{prefix}_MODEL")).unwrap_or_else(|| default_model.clone());
            let timeout_ms = parse_or(&get, &format!("AVON_{prefix}_TIMEOUT_MS"), timeout_default)?;
            let fallbacks_key = format!("AVON_{prefix}_FALLBACKS");
            let fallbacks = match get(&fallbacks_key) {
                Some(raw) => parse_fallbacks(&fallbacks_key, &raw, Duration::from_millis(timeout_ms))?,
                None => Vec::new(),
            };
            Ok(AgentModelConfig {
                provider_id,
                model_id,
                timeout_ms,
                fallbacks,
            })
        };

        let agents = RoleModels {
            planner: role("PLANNER", default_timeout)?,
            builder: role("BUILDER", default_timeout)?,
            reviewer: role("REVIEWER", default_timeout)?,
            reflector: role("REFLECTOR", default_timeout)?,
            distiller: role("DISTILLER", default_timeout)?,
            guarded_builder: role("GUARD", parse_or(&get, "AVON_GUARD_TIMEOUT_MS", DEFAULT_GUARD_TIMEOUT_MS)?)?,
        };

        let queue = QueueConfig {
            workers: parse_or(&get, "AVON_QUEUE_WORKERS", 2usize)?.max(1),
            capacity: parse_or(&get, "AVON_QUEUE_CAPACITY", 32usize)?.max(1),
        };

        Ok(Self {
            limits,
            agents,
            heuristics_path: get("AVON_HEURISTICS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("memory/heuristics.md")),
            boilerplates_path: get("AVON_BOILERPLATES_PATH").map(PathBuf::from),
            ollama_host: get("OLLAMA_HOST").unwrap_or_else(|| crate::llm::DEFAULT_OLLAMA_HOST.to_string()),
            ollama_autostart: parse_or(&get, "OLLAMA_AUTOSTART", false)?,
            openrouter_api_key: get("OPENROUTER_API_KEY"),
            queue,
        })
    }

    /// Create a config with every role on one provider/model (useful for testing).
    pub fn new(provider_id: &str, model_id: &str, limits: Limits) -> Self {
        Self {
            limits,
            agents: RoleModels::uniform(AgentModelConfig::new(provider_id, model_id, DEFAULT_TIMEOUT_MS)),
            ..Self::default()
        }
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(key.to_string(), format!("{}", e))),
        None => Ok(default),
    }
}

fn parse_fallbacks(key: &str, raw: &str, default_timeout: Duration) -> Result<Vec<ModelAttempt>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            ModelAttempt::parse(entry, default_timeout).ok_or_else(|| {
                ConfigError::InvalidValue(key.to_string(), format!("expected provider/model[@timeout_ms], got {entry}"))
            })
        })
        .collect()
}
