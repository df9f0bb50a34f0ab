//! Supervisor: drives one goal through plan, build/review retries, reflection,
//! research and distillation.
//!
//! ```text
//!   Planning ─▶ Building ─▶ Reviewing ─┬─▶ Accepted
//!                  ▲                   └─▶ Reflecting ─┬─▶ Researching ─▶ Distilling ─┐
//!                  │                                   └──────────────────────────────┤
//!                  └──────────────────────── (attempts < max) ◀───────────────────────┘
//! ```
//!
//! # Invariants
//! - Exactly one Plan per run; at most `max_retries_per_task` attempts
//! - Reflection and distillation failures never end a run
//! - `run` always returns a [`RunOutcome`]; nothing escapes as an error

mod queue;

pub use queue::{QueueError, RunHandle, RunQueue};

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::agents::prompts::{build_prompt, distill_prompt, reflection_prompt, review_prompt, BuildContext};
use crate::agents::{
    parse_plan, parse_reflection, parse_verdict, AgentError, AgentRoster, Plan, Reflection, Verdict,
};
use crate::config::{Config, Limits};
use crate::llm::{FailoverError, FailoverInvoker, ModelGateway};
use crate::memory::HeuristicsMemory;
use crate::search::{SearchProvider, SearchResult};

/// Error recorded when every attempt was rejected.
pub const MAX_RETRIES_EXCEEDED: &str = "max retries exceeded";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failed,
    Cancelled,
}

/// One build/review iteration.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    /// 0-based
    pub index: usize,
    pub artifact: String,
    #[serde(flatten)]
    pub verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reflection: Option<Reflection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lesson: Option<String>,
}

/// Result of a supervisor run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    /// Accepted artifact on success, otherwise the last one built.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Builds that produced an artifact. Can exceed `attempts.len()` by one
    /// when the last artifact's review call failed, since only reviewed
    /// attempts get a record.
    pub attempts_used: usize,
    pub attempts: Vec<AttemptRecord>,
}

impl RunOutcome {
    fn started(run_id: Uuid) -> Self {
        Self {
            run_id,
            status: RunStatus::Failed,
            plan: None,
            artifact: None,
            error: None,
            attempts_used: 0,
            attempts: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

enum Termination {
    Accepted,
    Exhausted,
}

/// Map a role failure to the run-level error, keeping cancellation distinct.
fn role_failure(err: FailoverError, wrap: fn(FailoverError) -> AgentError) -> AgentError {
    if err.is_cancelled() {
        AgentError::Cancelled
    } else {
        wrap(err)
    }
}

pub struct Supervisor {
    roster: AgentRoster,
    invoker: FailoverInvoker,
    search: Arc<dyn SearchProvider>,
    memory: Arc<dyn HeuristicsMemory>,
    limits: Limits,
}

impl Supervisor {
    pub fn new(
        roster: AgentRoster,
        invoker: FailoverInvoker,
        search: Arc<dyn SearchProvider>,
        memory: Arc<dyn HeuristicsMemory>,
        limits: Limits,
    ) -> Self {
        Self {
            roster,
            invoker,
            search,
            memory,
            limits,
        }
    }

    pub fn from_config(
        config: &Config,
        gateway: Arc<ModelGateway>,
        search: Arc<dyn SearchProvider>,
        memory: Arc<dyn HeuristicsMemory>,
    ) -> Self {
        Self::new(
            AgentRoster::from_config(config),
            FailoverInvoker::new(gateway),
            search,
            memory,
            config.limits,
        )
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Run one goal to completion.
    pub async fn run(&self, goal: &str, cancel: &CancellationToken) -> RunOutcome {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("supervisor_run", %run_id, goal);
        let mut outcome = RunOutcome::started(run_id);

        let result = self.drive(goal, cancel, &mut outcome).instrument(span.clone()).await;
        let _enter = span.enter();
        match result {
            Ok(Termination::Accepted) => {
                outcome.status = RunStatus::Success;
                tracing::info!("Run succeeded after {} attempt(s)", outcome.attempts_used);
            }
            Ok(Termination::Exhausted) => {
                outcome.error = Some(MAX_RETRIES_EXCEEDED.to_string());
                tracing::warn!("Run failed: {} ({})", MAX_RETRIES_EXCEEDED, outcome.attempts_used);
            }
            Err(AgentError::Cancelled) => {
                outcome.status = RunStatus::Cancelled;
                outcome.error = Some(AgentError::Cancelled.to_string());
                tracing::info!("Run cancelled");
            }
            Err(e) => {
                tracing::error!("Run failed: {}", e);
                outcome.error = Some(e.to_string());
            }
        }
        outcome
    }

    async fn drive(
        &self,
        goal: &str,
        cancel: &CancellationToken,
        outcome: &mut RunOutcome,
    ) -> Result<Termination, AgentError> {
        tracing::info!("Planning");
        let plan_text = self
            .roster
            .planner
            .ask(&self.invoker, goal, cancel)
            .await
            .map_err(|e| role_failure(e, AgentError::PlanningFailure))?;
        let plan = parse_plan(&plan_text);
        tracing::debug!("Plan has {} parsed step(s)", plan.steps.len());
        outcome.plan = Some(plan.clone());

        let prior_lessons = self.prior_lessons().await;
        let mut distilled_wisdom = String::new();
        let mut previous_artifact: Option<String> = None;

        for index in 0..self.limits.max_retries_per_task {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            tracing::info!(
                "Building attempt {}/{}",
                index + 1,
                self.limits.max_retries_per_task
            );
            let prompt = build_prompt(&BuildContext {
                goal,
                plan: &plan,
                distilled_wisdom: &distilled_wisdom,
                prior_lessons: &prior_lessons,
                previous_artifact: previous_artifact.as_deref(),
            });
            let artifact = self
                .roster
                .builder
                .ask(&self.invoker, prompt, cancel)
                .await
                .map_err(|e| role_failure(e, AgentError::BuildFailure))?;
            outcome.artifact = Some(artifact.clone());
            outcome.attempts_used = index + 1;

            tracing::info!("Reviewing attempt {}", index + 1);
            let review = self
                .roster
                .reviewer
                .ask(&self.invoker, review_prompt(&artifact), cancel)
                .await
                .map_err(|e| role_failure(e, AgentError::ReviewFailure))?;
            let verdict = parse_verdict(&review);

            let mut record = AttemptRecord {
                index,
                artifact: artifact.clone(),
                verdict: verdict.clone(),
                reflection: None,
                lesson: None,
            };

            let issues = match &verdict {
                Verdict::Accepted => {
                    outcome.attempts.push(record);
                    return Ok(Termination::Accepted);
                }
                Verdict::Rejected { issues } => issues,
            };
            tracing::info!("Attempt {} rejected", index + 1);
            tracing::debug!("Review issues: {}", issues);

            let reflection = self.reflect(&artifact, issues, cancel).await?;
            let lesson = self.research(issues, &reflection, cancel).await?;
            if let Some(lesson) = &lesson {
                self.remember(lesson).await;
                distilled_wisdom.push('\n');
                distilled_wisdom.push_str(lesson);
            }

            record.reflection = Some(reflection);
            record.lesson = lesson;
            outcome.attempts.push(record);
            previous_artifact = Some(artifact);
        }

        Ok(Termination::Exhausted)
    }

    async fn prior_lessons(&self) -> Vec<String> {
        if self.limits.prior_lessons == 0 {
            return Vec::new();
        }
        match self.memory.recent(self.limits.prior_lessons).await {
            Ok(lessons) => {
                tracing::debug!("Loaded {} prior lesson(s)", lessons.len());
                lessons
            }
            Err(e) => {
                tracing::warn!("Could not read prior lessons: {}", e);
                Vec::new()
            }
        }
    }

    /// Ask the Reflector. Only cancellation escapes; anything else becomes the
    /// parse-error reflection.
    async fn reflect(
        &self,
        artifact: &str,
        issues: &str,
        cancel: &CancellationToken,
    ) -> Result<Reflection, AgentError> {
        tracing::info!("Reflecting");
        match self
            .roster
            .reflector
            .ask(&self.invoker, reflection_prompt(artifact, issues), cancel)
            .await
        {
            Ok(text) => Ok(parse_reflection(&text).unwrap_or_else(|| {
                tracing::warn!("Reflector output was not valid JSON, skipping research");
                Reflection::parse_error()
            })),
            Err(e) if e.is_cancelled() => Err(AgentError::Cancelled),
            Err(e) => {
                tracing::warn!("{}, skipping research", AgentError::ReflectionFailure(e));
                Ok(Reflection::parse_error())
            }
        }
    }

    /// Search and distill. Returns the new lesson, if one was produced.
    async fn research(
        &self,
        issues: &str,
        reflection: &Reflection,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, AgentError> {
        let queries = reflection.queries_to_run(self.limits.max_web_searches);
        if queries.is_empty() {
            tracing::info!("No research needed: {}", reflection.reason);
            return Ok(None);
        }

        tracing::info!("Researching {} query(ies) via {}", queries.len(), self.search.name());
        let mut findings = Vec::new();
        for query in queries {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                result = self.search.search(query) => result,
            };
            match result {
                Ok(results) => findings.extend(results.iter().map(SearchResult::as_finding)),
                Err(e) => tracing::warn!("Search for {:?} failed: {}", query, e),
            }
        }
        let findings = if findings.is_empty() {
            "No results found.".to_string()
        } else {
            findings.join("\n\n")
        };

        tracing::info!("Distilling");
        match self
            .roster
            .distiller
            .ask(&self.invoker, distill_prompt(issues, &findings), cancel)
            .await
        {
            Ok(lesson) => {
                let lesson = lesson.trim();
                Ok((!lesson.is_empty()).then(|| lesson.to_string()))
            }
            Err(e) if e.is_cancelled() => Err(AgentError::Cancelled),
            Err(e) => {
                tracing::warn!("{}, no lesson this attempt", AgentError::DistillationFailure(e));
                Ok(None)
            }
        }
    }

    async fn remember(&self, lesson: &str) {
        if let Err(e) = self.memory.append(lesson).await {
            tracing::warn!("Failed to store lesson: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::memory::InMemoryHeuristicsStore;
    use crate::testing::{ScriptedClient, ScriptedSearch};
    use std::time::{Duration, Instant};

    const PLAN: &str = r#"{"steps": ["Create the form", "Validate input"]}"#;
    const ARTIFACT: &str = "```html:login.html\n<form></form>\n```";
    const NO_RESEARCH: &str = r#"{"shouldResearch": false, "reason": "typo", "searchQueries": []}"#;

    fn ok(text: &str) -> Result<String, LlmError> {
        Ok(text.to_string())
    }

    struct Harness {
        client: Arc<ScriptedClient>,
        search: Arc<ScriptedSearch>,
        memory: Arc<InMemoryHeuristicsStore>,
        supervisor: Supervisor,
    }

    fn harness(client: ScriptedClient, search: ScriptedSearch, limits: Limits) -> Harness {
        let client = Arc::new(client);
        let search = Arc::new(search);
        let memory = Arc::new(InMemoryHeuristicsStore::new());
        let gateway = ModelGateway::new().with_provider("mock", client.clone());

        let mut config = Config::new("mock", "unused", limits);
        config.agents.planner.model_id = "planner".into();
        config.agents.builder.model_id = "builder".into();
        config.agents.reviewer.model_id = "reviewer".into();
        config.agents.reflector.model_id = "reflector".into();
        config.agents.distiller.model_id = "distiller".into();

        let supervisor = Supervisor::from_config(&config, Arc::new(gateway), search.clone(), memory.clone());
        Harness {
            client,
            search,
            memory,
            supervisor,
        }
    }

    fn limits(max_retries: usize, max_web_searches: usize) -> Limits {
        Limits {
            max_retries_per_task: max_retries,
            max_web_searches,
            prior_lessons: 0,
        }
    }

    fn rejecting_client(reflection: &str) -> ScriptedClient {
        ScriptedClient::new(vec![])
            .for_model("planner", vec![ok(PLAN)])
            .for_model("builder", vec![ok(ARTIFACT)])
            .for_model("reviewer", vec![ok("FAIL: missing CSRF token")])
            .for_model("reflector", vec![ok(reflection)])
            .for_model("distiller", vec![ok("Always include a CSRF token in forms")])
    }

    #[tokio::test]
    async fn test_accepted_on_first_attempt() {
        let client = ScriptedClient::new(vec![])
            .for_model("planner", vec![ok(PLAN)])
            .for_model("builder", vec![ok(ARTIFACT)])
            .for_model("reviewer", vec![ok("PASS")]);
        let h = harness(client, ScriptedSearch::new(), limits(3, 3));

        let outcome = h.supervisor.run("build a login page", &CancellationToken::new()).await;

        assert_eq!(outcome.status, RunStatus::Success);
        assert_eq!(outcome.attempts_used, 1);
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(outcome.artifact.as_deref(), Some(ARTIFACT));
        assert_eq!(outcome.plan.unwrap().steps, vec!["Create the form", "Validate input"]);
        assert!(outcome.error.is_none());
        assert!(h.client.calls_for("reflector").is_empty());

        let planner_calls = h.client.calls_for("planner");
        assert_eq!(planner_calls.len(), 1);
        assert_eq!(planner_calls[0].messages[1].content, "build a login page");
    }

    #[tokio::test]
    async fn test_always_rejected_exhausts_retries() {
        let h = harness(rejecting_client(NO_RESEARCH), ScriptedSearch::new(), limits(3, 3));

        let outcome = h.supervisor.run("build a login page", &CancellationToken::new()).await;

        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(outcome.error.as_deref(), Some(MAX_RETRIES_EXCEEDED));
        assert_eq!(outcome.attempts.len(), 3);
        assert_eq!(outcome.attempts_used, 3);
        assert_eq!(outcome.artifact.as_deref(), Some(ARTIFACT));
        assert_eq!(h.client.calls_for("planner").len(), 1);
        assert_eq!(h.client.calls_for("builder").len(), 3);
        for (i, attempt) in outcome.attempts.iter().enumerate() {
            assert_eq!(attempt.index, i);
            assert_eq!(attempt.verdict.issues(), Some("missing CSRF token"));
            assert!(attempt.lesson.is_none());
        }

        let builds = h.client.calls_for("builder");
        assert!(builds[0].messages[1].content.contains("Previous Artifact (if any):\nNone"));
        assert!(builds[1].messages[1].content.contains(ARTIFACT));
        assert!(h.search.queries().is_empty());
    }

    #[tokio::test]
    async fn test_search_calls_capped_by_limit() {
        let reflection = r#"{"shouldResearch": true, "reason": "unknown API",
            "searchQueries": ["csrf next.js", "csrf express", "csrf django", "csrf rails", "csrf go"]}"#;
        let h = harness(rejecting_client(reflection), ScriptedSearch::new(), limits(1, 2));

        let outcome = h.supervisor.run("build a login page", &CancellationToken::new()).await;

        assert_eq!(h.search.queries(), vec!["csrf next.js", "csrf express"]);
        assert_eq!(h.client.calls_for("distiller").len(), 1);
        let distill = &h.client.calls_for("distiller")[0].messages[1].content;
        assert!(distill.contains("Original Error:\nmissing CSRF token"));
        assert!(distill.contains("Source: Docs for csrf express"));

        assert_eq!(outcome.attempts[0].lesson.as_deref(), Some("Always include a CSRF token in forms"));
        assert_eq!(
            h.memory.read_all().await.unwrap(),
            vec!["Always include a CSRF token in forms"]
        );
    }

    #[tokio::test]
    async fn test_zero_search_limit_skips_research() {
        let reflection = r#"{"shouldResearch": true, "reason": "r", "searchQueries": ["a"]}"#;
        let h = harness(rejecting_client(reflection), ScriptedSearch::new(), limits(1, 0));

        h.supervisor.run("goal", &CancellationToken::new()).await;

        assert!(h.search.queries().is_empty());
        assert!(h.client.calls_for("distiller").is_empty());
    }

    #[tokio::test]
    async fn test_malformed_reflection_is_recovered() {
        let h = harness(
            rejecting_client("I think we should look up CSRF"),
            ScriptedSearch::new(),
            limits(2, 3),
        );

        let outcome = h.supervisor.run("build a login page", &CancellationToken::new()).await;

        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(outcome.attempts.len(), 2);
        assert_eq!(outcome.attempts[0].reflection, Some(Reflection::parse_error()));
        assert!(h.search.queries().is_empty());
    }

    #[tokio::test]
    async fn test_reflector_failure_is_recovered() {
        let client = rejecting_client(NO_RESEARCH)
            .for_model("reflector", vec![Err(LlmError::server_error(503, "overloaded".into()))]);
        let h = harness(client, ScriptedSearch::new(), limits(2, 3));

        let outcome = h.supervisor.run("goal", &CancellationToken::new()).await;

        assert_eq!(outcome.error.as_deref(), Some(MAX_RETRIES_EXCEEDED));
        assert_eq!(outcome.attempts.len(), 2);
        assert_eq!(outcome.attempts[1].reflection, Some(Reflection::parse_error()));
    }

    #[tokio::test]
    async fn test_should_research_with_empty_queries_skips() {
        let reflection = r#"{"shouldResearch": true, "reason": "vague", "searchQueries": []}"#;
        let h = harness(rejecting_client(reflection), ScriptedSearch::new(), limits(1, 3));

        h.supervisor.run("goal", &CancellationToken::new()).await;

        assert!(h.search.queries().is_empty());
        assert!(h.client.calls_for("distiller").is_empty());
    }

    #[tokio::test]
    async fn test_wisdom_accumulates_across_attempts() {
        let reflection = r#"{"shouldResearch": true, "reason": "r", "searchQueries": ["csrf"]}"#;
        let client = rejecting_client(reflection)
            .for_model("distiller", vec![ok("lesson one"), ok("lesson two")]);
        let h = harness(client, ScriptedSearch::new(), limits(3, 3));

        h.supervisor.run("goal", &CancellationToken::new()).await;

        let builds = h.client.calls_for("builder");
        assert_eq!(builds.len(), 3);
        assert!(!builds[0].messages[1].content.contains("[LEARNED DISTILLED KNOWLEDGE]"));
        assert!(builds[1].messages[1].content.contains("lesson one"));
        assert!(!builds[1].messages[1].content.contains("lesson two"));
        assert!(builds[2].messages[1].content.contains("lesson one\nlesson two"));
        assert_eq!(h.memory.read_all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_search_is_skipped() {
        let reflection = r#"{"shouldResearch": true, "reason": "r", "searchQueries": ["a", "b"]}"#;
        let h = harness(rejecting_client(reflection), ScriptedSearch::failing_on("a"), limits(1, 3));

        let outcome = h.supervisor.run("goal", &CancellationToken::new()).await;

        assert_eq!(h.search.queries(), vec!["a", "b"]);
        let distill = &h.client.calls_for("distiller")[0].messages[1].content;
        assert!(distill.contains("Docs for b"));
        assert!(!distill.contains("Docs for a"));
        assert!(outcome.attempts[0].lesson.is_some());
    }

    #[tokio::test]
    async fn test_distiller_failure_yields_no_lesson() {
        let reflection = r#"{"shouldResearch": true, "reason": "r", "searchQueries": ["a"]}"#;
        let client = rejecting_client(reflection)
            .for_model("distiller", vec![Err(LlmError::network_error("reset".into()))]);
        let h = harness(client, ScriptedSearch::new(), limits(1, 3));

        let outcome = h.supervisor.run("goal", &CancellationToken::new()).await;

        assert_eq!(outcome.error.as_deref(), Some(MAX_RETRIES_EXCEEDED));
        assert!(outcome.attempts[0].lesson.is_none());
        assert!(h.memory.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_planner_failure_fails_run() {
        let client = ScriptedClient::new(vec![])
            .for_model("planner", vec![Err(LlmError::server_error(500, "boom".into()))]);
        let h = harness(client, ScriptedSearch::new(), limits(3, 3));

        let outcome = h.supervisor.run("goal", &CancellationToken::new()).await;

        assert_eq!(outcome.status, RunStatus::Failed);
        assert!(outcome.plan.is_none());
        assert!(outcome.error.unwrap().starts_with("Planning failed"));
        assert!(h.client.calls_for("builder").is_empty());
    }

    #[tokio::test]
    async fn test_builder_failure_fails_run() {
        let client = ScriptedClient::new(vec![])
            .for_model("planner", vec![ok(PLAN)])
            .for_model("builder", vec![Err(LlmError::parse_error("empty".into()))]);
        let h = harness(client, ScriptedSearch::new(), limits(3, 3));

        let outcome = h.supervisor.run("goal", &CancellationToken::new()).await;

        assert_eq!(outcome.status, RunStatus::Failed);
        assert!(outcome.plan.is_some());
        assert!(outcome.error.unwrap().starts_with("Build failed"));
        assert_eq!(outcome.attempts_used, 0);
    }

    #[tokio::test]
    async fn test_reviewer_failure_fails_run() {
        let client = ScriptedClient::new(vec![])
            .for_model("planner", vec![ok(PLAN)])
            .for_model("builder", vec![ok(ARTIFACT)])
            .for_model("reviewer", vec![Err(LlmError::server_error(502, "bad gateway".into()))]);
        let h = harness(client, ScriptedSearch::new(), limits(3, 3));

        let outcome = h.supervisor.run("goal", &CancellationToken::new()).await;

        assert_eq!(outcome.status, RunStatus::Failed);
        assert!(outcome.error.unwrap().starts_with("Review failed"));
        assert_eq!(outcome.artifact.as_deref(), Some(ARTIFACT));
        assert_eq!(outcome.attempts_used, 1);
        assert!(outcome.attempts.is_empty());
        assert_eq!(h.client.calls_for("builder").len(), 1);
        assert!(h.client.calls_for("reflector").is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_research() {
        let reflection = r#"{"shouldResearch": true, "reason": "r", "searchQueries": ["a", "b"]}"#;
        let cancel = CancellationToken::new();
        let search = ScriptedSearch::cancelling(cancel.clone(), Duration::from_secs(30));
        let h = harness(rejecting_client(reflection), search, limits(3, 3));

        let started = Instant::now();
        let outcome = h.supervisor.run("goal", &cancel).await;

        assert_eq!(outcome.status, RunStatus::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(h.search.queries(), vec!["a"]);
        assert!(h.client.calls_for("distiller").is_empty());
        assert_eq!(h.client.calls_for("builder").len(), 1);
        assert!(h.memory.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let h = harness(rejecting_client(NO_RESEARCH), ScriptedSearch::new(), limits(3, 3));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = h.supervisor.run("goal", &cancel).await;

        assert_eq!(outcome.status, RunStatus::Cancelled);
        assert!(h.client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_call() {
        let client = rejecting_client(NO_RESEARCH).with_delay(Duration::from_secs(30));
        let h = harness(client, ScriptedSearch::new(), limits(3, 3));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let outcome = h.supervisor.run("goal", &cancel).await;

        assert_eq!(outcome.status, RunStatus::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(h.client.calls_for("planner").len(), 1);
        assert!(h.client.calls_for("builder").is_empty());
    }

    #[tokio::test]
    async fn test_prior_lessons_reach_builder() {
        let client = ScriptedClient::new(vec![])
            .for_model("planner", vec![ok(PLAN)])
            .for_model("builder", vec![ok(ARTIFACT)])
            .for_model("reviewer", vec![ok("PASS")]);
        let mut l = limits(1, 3);
        l.prior_lessons = 2;
        let h = harness(client, ScriptedSearch::new(), l);
        for lesson in ["old lesson", "newer lesson", "newest lesson"] {
            h.memory.append(lesson).await.unwrap();
        }

        h.supervisor.run("goal", &CancellationToken::new()).await;

        let prompt = &h.client.calls_for("builder")[0].messages[1].content;
        assert!(prompt.contains("[PRIOR HEURISTICS]:\nnewer lesson\nnewest lesson"));
        assert!(!prompt.contains("old lesson\n"));
    }

    #[tokio::test]
    async fn test_outcome_serializes() {
        let h = harness(rejecting_client(NO_RESEARCH), ScriptedSearch::new(), limits(1, 3));

        let outcome = h.supervisor.run("goal", &CancellationToken::new()).await;
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], MAX_RETRIES_EXCEEDED);
        assert_eq!(json["attempts"][0]["verdict"], "rejected");
        assert_eq!(json["attempts"][0]["reflection"]["shouldResearch"], false);
    }
}
