//! Planner abstraction
//!
//! The planner turns a goal plus the registry's advertised contracts into
//! an ordered step sequence. Implementations live outside core; the LLM
//! one is in `overseer-planners`.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::tool::ToolDescriptor;
use crate::types::Step;

/// Planner errors - all fatal to the task
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("llm error: {0}")]
    Llm(String),

    #[error("planner output was not valid JSON: {0}")]
    Parse(String),

    #[error("invalid plan: {0}")]
    Validation(String),

    #[error("plan contains no steps")]
    EmptyPlan,

    #[error("plan references unknown tool: {0}")]
    UnknownTool(String),
}

/// Planner trait - generates an ordered step sequence for a goal
#[async_trait]
pub trait Planner: Send + Sync {
    /// Produce a non-empty, registry-valid list of pending steps.
    async fn plan(
        &self,
        goal: &str,
        context: &HashMap<String, Value>,
        tools: &[ToolDescriptor],
    ) -> Result<Vec<Step>, PlanError>;
}
