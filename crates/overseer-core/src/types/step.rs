//! Step and Plan type definitions
//!
//! A Step is one tool invocation with typed arguments; a Plan is the
//! ordered sequence the orchestrator drives.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tool::ToolOutcome;

/// Type alias for Step ID (unique within one task)
pub type StepId = String;

/// Step status - mutated exactly once per transition by the executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not yet dispatched
    Pending,
    /// Currently executing
    Running,
    /// Tool reported success
    Completed,
    /// Tool reported failure or the tool could not be resolved
    Failed,
}

/// A single step in the execution plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Unique identifier within the task
    pub id: StepId,
    /// Human description of what the step accomplishes
    pub description: String,
    /// Name of the tool to invoke (must resolve in the registry)
    pub tool: String,
    /// Argument object conforming to the tool's schema
    #[serde(default)]
    pub arguments: Value,
    /// Advisory free-text criterion for the critic
    #[serde(default)]
    pub success_criterion: Option<String>,
    /// When false, failure of this step does not abort the plan
    #[serde(default = "default_true")]
    pub required: bool,
    /// Current status
    pub status: StepStatus,
    /// Outcome attached by the executor after the step ran
    #[serde(default)]
    pub result: Option<ToolOutcome>,
}

fn default_true() -> bool {
    true
}

impl Step {
    /// Create a new pending step
    pub fn new(id: impl Into<StepId>, tool: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            tool: tool.into(),
            arguments: Value::Object(serde_json::Map::new()),
            success_criterion: None,
            required: true,
            status: StepStatus::Pending,
            result: None,
        }
    }

    /// Set the argument object
    pub fn with_arguments(mut self, arguments: Value) -> Self {
        self.arguments = arguments;
        self
    }

    /// Set the advisory success criterion
    pub fn with_success_criterion(mut self, criterion: impl Into<String>) -> Self {
        self.success_criterion = Some(criterion.into());
        self
    }

    /// Mark the step optional (failure does not abort the plan)
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Check whether the step already ran
    pub fn is_settled(&self) -> bool {
        matches!(self.status, StepStatus::Completed | StepStatus::Failed)
    }
}

/// Plan - the ordered step sequence generated by the planner and
/// possibly spliced by the critic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// The goal this plan serves
    pub goal: String,
    /// Ordered steps
    pub steps: Vec<Step>,
}

impl Plan {
    /// Create a new plan
    pub fn new(goal: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            goal: goal.into(),
            steps,
        }
    }

    /// Get a step by ID
    pub fn get_step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Check whether a step ID is already taken
    pub fn contains_step(&self, id: &str) -> bool {
        self.steps.iter().any(|s| s.id == id)
    }

    /// Check whether every step completed
    pub fn all_completed(&self) -> bool {
        self.steps.iter().all(|s| s.status == StepStatus::Completed)
    }

    /// Splice corrective steps in after `index`, renaming on ID collision
    /// so step IDs stay unique within the task.
    pub fn splice_after(&mut self, index: usize, corrections: Vec<Step>) -> Vec<StepId> {
        let mut inserted = Vec::with_capacity(corrections.len());
        let mut at = (index + 1).min(self.steps.len());
        for mut step in corrections {
            let mut candidate = step.id.clone();
            let mut suffix = 2;
            while self.contains_step(&candidate) {
                candidate = format!("{}-{}", step.id, suffix);
                suffix += 1;
            }
            step.id = candidate.clone();
            self.steps.insert(at, step);
            inserted.push(candidate);
            at += 1;
        }
        inserted
    }
}
