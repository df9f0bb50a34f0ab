//! Bounded multi-goal run queue.
//!
//! Goals are queued FIFO on a bounded channel and picked up by a fixed pool
//! of workers, each running independent supervisor runs. Submitters get the
//! outcome back over a oneshot channel.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{RunOutcome, Supervisor};
use crate::config::QueueConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Run queue is closed")]
    Closed,

    #[error("Run queue is full")]
    Full,

    #[error("Run was dropped before it finished")]
    Dropped,
}

struct QueuedRun {
    goal: String,
    cancel: CancellationToken,
    respond: oneshot::Sender<RunOutcome>,
}

/// Handle to one submitted goal.
pub struct RunHandle {
    cancel: CancellationToken,
    outcome: oneshot::Receiver<RunOutcome>,
}

impl RunHandle {
    /// Cancel this run only. A run still waiting in the queue finishes as cancelled.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn outcome(self) -> Result<RunOutcome, QueueError> {
        self.outcome.await.map_err(|_| QueueError::Dropped)
    }
}

pub struct RunQueue {
    sender: mpsc::Sender<QueuedRun>,
    workers: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl RunQueue {
    /// Spawn the worker pool.
    pub fn start(supervisor: Arc<Supervisor>, config: QueueConfig) -> Self {
        Self::start_with_token(supervisor, config, CancellationToken::new())
    }

    /// Spawn the worker pool under `cancel`; cancelling it cancels every run.
    pub fn start_with_token(supervisor: Arc<Supervisor>, config: QueueConfig, cancel: CancellationToken) -> Self {
        let (sender, receiver) = mpsc::channel(config.capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..config.workers.max(1))
            .map(|worker_id| {
                let supervisor = Arc::clone(&supervisor);
                let receiver = Arc::clone(&receiver);
                tokio::spawn(worker_loop(worker_id, supervisor, receiver))
            })
            .collect();

        tracing::info!(
            "Run queue started with {} worker(s), capacity {}",
            config.workers.max(1),
            config.capacity.max(1)
        );
        Self {
            sender,
            workers,
            cancel,
        }
    }

    /// Queue a goal, waiting for capacity.
    pub async fn submit(&self, goal: impl Into<String>) -> Result<RunHandle, QueueError> {
        let (run, handle) = self.prepare(goal.into());
        self.sender.send(run).await.map_err(|_| QueueError::Closed)?;
        Ok(handle)
    }

    /// Queue a goal without waiting. Fails with `Full` when the queue is at capacity.
    pub fn try_submit(&self, goal: impl Into<String>) -> Result<RunHandle, QueueError> {
        let (run, handle) = self.prepare(goal.into());
        self.sender.try_send(run).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })?;
        Ok(handle)
    }

    fn prepare(&self, goal: String) -> (QueuedRun, RunHandle) {
        let cancel = self.cancel.child_token();
        let (respond, outcome) = oneshot::channel();
        let run = QueuedRun {
            goal,
            cancel: cancel.clone(),
            respond,
        };
        (run, RunHandle { cancel, outcome })
    }

    /// Cancel every queued and running goal.
    pub fn cancel_all(&self) {
        self.cancel.cancel();
    }

    /// Stop accepting goals, drain what is queued, and wait for the workers.
    pub async fn shutdown(self) {
        let Self {
            sender, workers, ..
        } = self;
        drop(sender);
        for result in futures::future::join_all(workers).await {
            if let Err(e) = result {
                tracing::error!("Run queue worker panicked: {}", e);
            }
        }
        tracing::info!("Run queue stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    supervisor: Arc<Supervisor>,
    receiver: Arc<Mutex<mpsc::Receiver<QueuedRun>>>,
) {
    loop {
        let next = receiver.lock().await.recv().await;
        let Some(run) = next else {
            break;
        };
        tracing::debug!("Worker {} picked up goal: {}", worker_id, run.goal);
        let outcome = supervisor.run(&run.goal, &run.cancel).await;
        if run.respond.send(outcome).is_err() {
            tracing::debug!("Worker {}: submitter went away before the outcome", worker_id);
        }
    }
    tracing::debug!("Worker {} exiting", worker_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Limits};
    use crate::llm::{LlmError, ModelGateway};
    use crate::memory::InMemoryHeuristicsStore;
    use crate::supervisor::RunStatus;
    use crate::testing::{ScriptedClient, ScriptedSearch};
    use std::time::Duration;

    fn ok(text: &str) -> Result<String, LlmError> {
        Ok(text.to_string())
    }

    fn supervisor(client: ScriptedClient) -> Arc<Supervisor> {
        let gateway = ModelGateway::new().with_provider("mock", Arc::new(client));
        let mut config = Config::new("mock", "unused", Limits::default());
        config.agents.planner.model_id = "planner".into();
        config.agents.builder.model_id = "builder".into();
        config.agents.reviewer.model_id = "reviewer".into();
        Arc::new(Supervisor::from_config(
            &config,
            Arc::new(gateway),
            Arc::new(ScriptedSearch::new()),
            Arc::new(InMemoryHeuristicsStore::new()),
        ))
    }

    fn accepting_client() -> ScriptedClient {
        ScriptedClient::new(vec![])
            .for_model("planner", vec![ok(r#"{"steps": ["one"]}"#)])
            .for_model("builder", vec![ok("artifact")])
            .for_model("reviewer", vec![ok("PASS")])
    }

    #[tokio::test]
    async fn test_every_submitted_goal_gets_an_outcome() {
        let queue = RunQueue::start(
            supervisor(accepting_client()),
            QueueConfig {
                workers: 3,
                capacity: 4,
            },
        );

        let mut handles = Vec::new();
        for i in 0..8 {
            handles.push(queue.submit(format!("goal {i}")).await.unwrap());
        }
        let mut run_ids = Vec::new();
        for handle in handles {
            let outcome = handle.outcome().await.unwrap();
            assert_eq!(outcome.status, RunStatus::Success);
            run_ids.push(outcome.run_id);
        }
        run_ids.sort();
        run_ids.dedup();
        assert_eq!(run_ids.len(), 8);

        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancel_one_run() {
        let client = accepting_client().with_delay(Duration::from_secs(30));
        let queue = RunQueue::start(supervisor(client), QueueConfig::default());

        let handle = queue.try_submit("slow goal").unwrap();
        handle.cancel();
        let outcome = tokio::time::timeout(Duration::from_secs(5), handle.outcome())
            .await
            .expect("cancelled run should finish promptly")
            .unwrap();
        assert_eq!(outcome.status, RunStatus::Cancelled);

        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancel_all_reaches_queued_runs() {
        let client = accepting_client().with_delay(Duration::from_secs(30));
        let queue = RunQueue::start(
            supervisor(client),
            QueueConfig {
                workers: 1,
                capacity: 4,
            },
        );

        let first = queue.submit("first").await.unwrap();
        let second = queue.submit("second").await.unwrap();
        queue.cancel_all();

        for handle in [first, second] {
            let outcome = tokio::time::timeout(Duration::from_secs(5), handle.outcome())
                .await
                .expect("run should finish promptly")
                .unwrap();
            assert_eq!(outcome.status, RunStatus::Cancelled);
        }

        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_parent_token_cancels_runs() {
        let client = accepting_client().with_delay(Duration::from_secs(30));
        let parent = CancellationToken::new();
        let queue = RunQueue::start_with_token(supervisor(client), QueueConfig::default(), parent.clone());

        let handle = queue.submit("goal").await.unwrap();
        parent.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(5), handle.outcome())
            .await
            .expect("run should finish promptly")
            .unwrap();
        assert_eq!(outcome.status, RunStatus::Cancelled);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_goals() {
        let queue = RunQueue::start(
            supervisor(accepting_client()),
            QueueConfig {
                workers: 1,
                capacity: 8,
            },
        );
        let handles: Vec<_> = (0..3)
            .map(|i| queue.try_submit(format!("goal {i}")).unwrap())
            .collect();

        queue.shutdown().await;

        for handle in handles {
            assert!(handle.outcome().await.unwrap().is_success());
        }
    }
}
