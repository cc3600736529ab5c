//! ExecutionContext type definition

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::types::TaskId;

/// Bounded context handed to a tool invocation
///
/// Carries identification plus the defaults a tool applies when its
/// arguments leave them out. The cancellation token is the worker's,
/// threaded through the orchestrator; tools should observe it at their
/// suspension points.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// The sandbox this invocation is bound to
    pub sandbox_id: String,
    /// Owning task
    pub task_id: TaskId,
    /// Caller identity, when known
    pub user_id: Option<String>,
    /// Default per-operation timeout
    pub default_timeout: Duration,
    /// Default working directory inside the sandbox
    pub default_cwd: String,
    /// Cooperative cancellation, threaded from the worker
    pub cancellation: CancellationToken,
}

impl ExecutionContext {
    /// Create a context with the standard defaults (30 s timeout, /work cwd)
    pub fn new(sandbox_id: impl Into<String>, task_id: impl Into<TaskId>) -> Self {
        Self {
            sandbox_id: sandbox_id.into(),
            task_id: task_id.into(),
            user_id: None,
            default_timeout: Duration::from_secs(30),
            default_cwd: "/work".to_string(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Set the caller identity
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the default per-operation timeout
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Thread an existing cancellation token through this context
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Check whether the task was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}
