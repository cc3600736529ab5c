//! Executor module
//!
//! Runs exactly one step: resolves the tool, invokes it with a bounded
//! context, records the outcome. The executor always returns a settled
//! step record; nothing raised by a tool reaches the orchestrator.

use std::sync::Arc;

use crate::tool::{ExecutionContext, ToolOutcome, ToolRegistry};
use crate::types::{Step, StepStatus};

/// The single-step executor
pub struct Executor {
    registry: Arc<ToolRegistry>,
}

impl Executor {
    /// Create an executor over a shared registry
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// Execute one step and return it settled (Completed or Failed).
    ///
    /// An unknown tool name marks the step failed rather than raising;
    /// the plan was validated against the registry, so hitting this
    /// means the registry changed under a running task.
    pub async fn execute_step(&self, mut step: Step, ctx: &ExecutionContext) -> Step {
        step.status = StepStatus::Running;
        tracing::info!(
            task_id = %ctx.task_id,
            step_id = %step.id,
            tool = %step.tool,
            "step execution started"
        );

        let outcome = match self.registry.get(&step.tool) {
            Some(tool) => tool.invoke(&step.arguments, ctx).await,
            None => ToolOutcome::fail(format!("tool not found: {}", step.tool)),
        };

        step.status = if outcome.success {
            StepStatus::Completed
        } else {
            StepStatus::Failed
        };
        tracing::info!(
            task_id = %ctx.task_id,
            step_id = %step.id,
            tool = %step.tool,
            success = outcome.success,
            "step execution finished"
        );
        step.result = Some(outcome);
        step
    }
}
