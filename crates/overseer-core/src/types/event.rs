//! Task event definitions
//!
//! The event log is the ground truth for what happened to a task; the
//! per-step result field is a convenience for clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of event tags appended by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventKind {
    TaskStarted,
    SandboxCreated,
    PlanningStarted,
    PlanGenerated,
    ExecutionStarted,
    StepStarted,
    StepCompleted,
    CriticEvaluation,
    CorrectionApplied,
    ExecutionStopped,
    TaskSucceeded,
    TaskCompletedWithFailures,
    TaskFailed,
    OrchestrationFailed,
    SandboxDestroyed,
}

impl TaskEventKind {
    /// Stable label matching the serde tag
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskEventKind::TaskStarted => "task_started",
            TaskEventKind::SandboxCreated => "sandbox_created",
            TaskEventKind::PlanningStarted => "planning_started",
            TaskEventKind::PlanGenerated => "plan_generated",
            TaskEventKind::ExecutionStarted => "execution_started",
            TaskEventKind::StepStarted => "step_started",
            TaskEventKind::StepCompleted => "step_completed",
            TaskEventKind::CriticEvaluation => "critic_evaluation",
            TaskEventKind::CorrectionApplied => "correction_applied",
            TaskEventKind::ExecutionStopped => "execution_stopped",
            TaskEventKind::TaskSucceeded => "task_succeeded",
            TaskEventKind::TaskCompletedWithFailures => "task_completed_with_failures",
            TaskEventKind::TaskFailed => "task_failed",
            TaskEventKind::OrchestrationFailed => "orchestration_failed",
            TaskEventKind::SandboxDestroyed => "sandbox_destroyed",
        }
    }
}

/// One entry in a task's append-only history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    /// Wall-clock time observed by the owning orchestrator
    pub timestamp: DateTime<Utc>,
    /// Typed tag
    pub kind: TaskEventKind,
    /// Free-form payload
    #[serde(default)]
    pub data: Value,
}

impl TaskEvent {
    /// Create an event stamped now
    pub fn new(kind: TaskEventKind, data: Value) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            data,
        }
    }

    /// Create an event with an empty payload
    pub fn tag(kind: TaskEventKind) -> Self {
        Self::new(kind, Value::Null)
    }
}
