//! Task type definitions
//!
//! Task is the durable record of an autonomously executed goal.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Artifact, Plan};

/// Type alias for Task ID
pub type TaskId = String;

/// Task status - the terminal states close the record for good
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Accepted, waiting for a worker
    Queued,
    /// Owned by a worker, moving through the plan loop
    Running,
    /// Every required step completed
    Succeeded,
    /// Planning, sandbox creation, or a required step failed
    Failed,
    /// Externally cancelled while queued or running
    Cancelled,
}

impl TaskStatus {
    /// Check whether the status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Check whether a transition to `next` is legal
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        match self {
            TaskStatus::Queued => matches!(
                next,
                TaskStatus::Running | TaskStatus::Cancelled | TaskStatus::Failed
            ),
            TaskStatus::Running => matches!(
                next,
                TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Cancelled
            ),
            _ => false,
        }
    }

    /// Stable label used in logs and event payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

/// Task - the durable execution record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier for this task
    pub id: TaskId,
    /// The natural-language goal to accomplish
    pub goal: String,
    /// Initial key/value context supplied by the caller
    #[serde(default)]
    pub context: HashMap<String, Value>,
    /// Current status
    pub status: TaskStatus,
    /// The execution plan (absent until planning completes)
    #[serde(default)]
    pub plan: Option<Plan>,
    /// Artifacts produced by successful steps
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    /// Terminal error text (set when status is Failed)
    #[serde(default)]
    pub error: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Set when a worker takes ownership
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// Set on entering a terminal status
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new queued task
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            goal: goal.into(),
            context: HashMap::new(),
            status: TaskStatus::Queued,
            plan: None,
            artifacts: Vec::new(),
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Attach initial context
    pub fn with_context(mut self, context: HashMap<String, Value>) -> Self {
        self.context = context;
        self
    }

    /// Mark the task running and stamp the start time
    pub fn start(&mut self) {
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Move into a terminal status and stamp the completion time
    pub fn finish(&mut self, status: TaskStatus, error: Option<String>) {
        self.status = status;
        self.error = error;
        self.completed_at = Some(Utc::now());
    }

    /// Store the generated plan
    pub fn set_plan(&mut self, plan: Plan) {
        self.plan = Some(plan);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions_form_the_expected_dag() {
        assert!(TaskStatus::Queued.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::Queued.can_transition_to(TaskStatus::Cancelled));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Succeeded));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Failed));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Cancelled));

        assert!(!TaskStatus::Succeeded.can_transition_to(TaskStatus::Running));
        assert!(!TaskStatus::Failed.can_transition_to(TaskStatus::Queued));
        assert!(!TaskStatus::Cancelled.can_transition_to(TaskStatus::Running));
        assert!(!TaskStatus::Queued.can_transition_to(TaskStatus::Succeeded));
    }

    #[test]
    fn test_finish_stamps_completion() {
        let mut task = Task::new("list the files");
        task.start();
        assert_eq!(task.status, TaskStatus::Running);
        assert!(task.started_at.is_some());

        task.finish(TaskStatus::Failed, Some("planning failed".to_string()));
        assert!(task.status.is_terminal());
        assert!(task.completed_at.is_some());
        assert_eq!(task.error.as_deref(), Some("planning failed"));
    }
}
