//! # Avon Core
//!
//! Control core for an AI code-generation agent: takes a goal, plans it, and
//! drives a bounded build/review loop that reflects on rejections, researches
//! what it was missing, and remembers what it learned.
//!
//! ## Architecture
//!
//! ```text
//!            ┌──────────────────────────────────────────┐
//!   goal ──▶ │               Supervisor                 │ ──▶ RunOutcome
//!            │ plan ▸ build ▸ review ▸ reflect ▸ distill│
//!            └───────┬───────────────┬──────────────┬───┘
//!                    │               │              │
//!                    ▼               ▼              ▼
//!             ┌────────────┐  ┌────────────┐  ┌────────────┐
//!             │ RoleAgents │  │  Search    │  │ Heuristics │
//!             │ (failover) │  │ (Tavily)   │  │  Memory    │
//!             └─────┬──────┘  └────────────┘  └────────────┘
//!                   ▼
//!             ┌────────────┐
//!             │ModelGateway│ ──▶ Ollama / OpenRouter
//!             └────────────┘
//! ```
//!
//! A second path, the guardrailed build, asks for a single feature inside a
//! pre-approved boilerplate and rejects any output that touches protected
//! files or leaves the allowed directories.
//!
//! ## Modules
//! - `llm`: provider clients, timeout/cancel gateway, ordered failover
//! - `agents`: role agents, their instructions and output parsers
//! - `supervisor`: the run loop and the multi-goal run queue
//! - `guardrail`: boilerplate policies, output validation, guardrailed build
//! - `memory`: append-only lesson store
//! - `search`: research providers
//! - `config`: environment configuration

pub mod agents;
pub mod config;
pub mod guardrail;
pub mod llm;
pub mod memory;
pub mod search;
pub mod supervisor;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use guardrail::{GuardrailedBuildOutcome, GuardrailedBuilder};
pub use supervisor::{RunOutcome, RunQueue, RunStatus, Supervisor};
