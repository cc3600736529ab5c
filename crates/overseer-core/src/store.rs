//! Store abstractions
//!
//! The durable task store and event log are external collaborators; core
//! only defines the interfaces it drives. In-memory implementations for
//! development and tests live in `overseer-stores`.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Task, TaskEvent, TaskStatus};

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("illegal status transition: {0} -> {1}")]
    IllegalTransition(&'static str, &'static str),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Durable task records with compare-and-set style status updates
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist the full task record
    async fn save(&self, task: &Task) -> Result<(), StoreError>;

    /// Load a task by ID
    async fn load(&self, task_id: &str) -> Result<Option<Task>, StoreError>;

    /// Update only the status, enforcing transition legality
    async fn update_status(&self, task_id: &str, status: TaskStatus) -> Result<(), StoreError>;

    /// List tasks in a given status
    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, StoreError>;
}

/// Append-only per-task event log
///
/// The store must preserve per-task append order; the orchestrator
/// serializes appends for its own task, so no cross-task ordering is
/// required.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append one event to a task's log
    async fn append(&self, task_id: &str, event: TaskEvent) -> Result<(), StoreError>;

    /// The full log for a task, in append order
    async fn list(&self, task_id: &str) -> Result<Vec<TaskEvent>, StoreError>;
}
