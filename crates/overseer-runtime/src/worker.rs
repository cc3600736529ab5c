//! Worker loop - pulls task IDs from the queue and dispatches each to
//! the orchestrator with bounded concurrency and job-level retry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio_util::sync::CancellationToken;

use overseer_core::types::{TaskId, TaskStatus};
use overseer_core::TaskStore;

use crate::orchestrator::Orchestrator;

/// Queue errors
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue closed")]
    Closed,

    #[error("queue connection error: {0}")]
    Connection(String),
}

/// Job queue seam - the production queue is an external collaborator.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue a task ID for execution
    async fn push(&self, task_id: TaskId) -> Result<(), QueueError>;

    /// Block for the next task ID; `None` means the queue closed and the
    /// worker should drain out.
    async fn pop(&self) -> Result<Option<TaskId>, QueueError>;
}

/// In-process queue for tests and single-process deployments.
pub struct InMemoryTaskQueue {
    tx: std::sync::Mutex<Option<mpsc::UnboundedSender<TaskId>>>,
    rx: Mutex<mpsc::UnboundedReceiver<TaskId>>,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: std::sync::Mutex::new(Some(tx)),
            rx: Mutex::new(rx),
        }
    }

    /// Close the queue; `pop` returns `None` once drained.
    pub fn close(&self) {
        self.tx.lock().expect("queue sender poisoned").take();
    }
}

impl Default for InMemoryTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn push(&self, task_id: TaskId) -> Result<(), QueueError> {
        let guard = self.tx.lock().expect("queue sender poisoned");
        match guard.as_ref() {
            Some(tx) => tx.send(task_id).map_err(|_| QueueError::Closed),
            None => Err(QueueError::Closed),
        }
    }

    async fn pop(&self) -> Result<Option<TaskId>, QueueError> {
        let mut rx = self.rx.lock().await;
        Ok(rx.recv().await)
    }
}

/// Worker errors
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("worker pool error: {0}")]
    Pool(String),
}

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Concurrent task executions
    pub concurrency: usize,
    /// Attempts per job, counting the first
    pub max_attempts: u32,
    /// Base delay for exponential backoff between attempts
    pub backoff_base: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            max_attempts: 3,
            backoff_base: Duration::from_millis(250),
        }
    }
}

/// Worker - the queue-to-orchestrator dispatch loop.
pub struct Worker {
    queue: Arc<dyn TaskQueue>,
    orchestrator: Arc<Orchestrator>,
    task_store: Arc<dyn TaskStore>,
    config: WorkerConfig,
    shutdown: CancellationToken,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        orchestrator: Arc<Orchestrator>,
        task_store: Arc<dyn TaskStore>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            orchestrator,
            task_store,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the pull loop and cancels in-flight tasks.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Pull jobs until the queue closes or shutdown fires. In-flight
    /// jobs finish (or observe cancellation) before this returns.
    pub async fn run(&self) -> Result<(), WorkerError> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut handles = Vec::new();

        loop {
            let task_id = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                popped = self.queue.pop() => match popped? {
                    Some(task_id) => task_id,
                    None => break,
                },
            };

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| WorkerError::Pool(e.to_string()))?;
            let orchestrator = self.orchestrator.clone();
            let task_store = self.task_store.clone();
            let config = self.config.clone();
            let cancel = self.shutdown.child_token();

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                process_job(orchestrator, task_store, task_id, config, cancel).await;
            }));
            handles.retain(|h| !h.is_finished());
        }

        for handle in handles {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "worker job panicked");
            }
        }
        Ok(())
    }
}

/// Run one job with retry and backoff. A cancelled task status
/// short-circuits future attempts.
async fn process_job(
    orchestrator: Arc<Orchestrator>,
    task_store: Arc<dyn TaskStore>,
    task_id: TaskId,
    config: WorkerConfig,
    cancel: CancellationToken,
) {
    for attempt in 1..=config.max_attempts.max(1) {
        match task_store.load(&task_id).await {
            Ok(Some(task)) if task.status == TaskStatus::Cancelled => {
                tracing::info!(task_id = %task_id, "task cancelled, skipping attempt");
                return;
            }
            Ok(Some(task)) if task.status.is_terminal() => {
                tracing::debug!(task_id = %task_id, status = task.status.as_str(), "task already terminal");
                return;
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(task_id = %task_id, error = %err, "task load failed before attempt");
            }
        }

        match orchestrator.run(&task_id, cancel.clone()).await {
            Ok(outcome) => {
                tracing::info!(task_id = %task_id, attempt, outcome = ?outcome, "task finished");
                return;
            }
            Err(err) if err.is_retryable() && attempt < config.max_attempts => {
                let delay = config.backoff_base * 2u32.saturating_pow(attempt - 1);
                tracing::warn!(
                    task_id = %task_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "attempt failed, backing off"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(err) => {
                tracing::error!(task_id = %task_id, attempt, error = %err, "task failed permanently");
                // The orchestrator marks the task failed where it can;
                // cover the infrastructure paths where it could not.
                if let Ok(Some(task)) = task_store.load(&task_id).await {
                    if !task.status.is_terminal() {
                        if let Err(store_err) = task_store
                            .update_status(&task_id, TaskStatus::Failed)
                            .await
                        {
                            tracing::warn!(task_id = %task_id, error = %store_err, "failed to mark task failed");
                        }
                    }
                }
                return;
            }
        }
    }
}
