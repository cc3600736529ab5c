//! Critic abstraction
//!
//! After each step the critic judges progress toward the goal and may
//! emit corrective steps for the orchestrator to splice into the
//! remaining plan. Critic failures are never fatal to the task.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tool::ToolDescriptor;
use crate::types::{Plan, Step};

/// Critic errors - the orchestrator logs these and continues
#[derive(Debug, Error)]
pub enum CriticError {
    #[error("llm error: {0}")]
    Llm(String),
}

/// Progress judgement for one executed step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    /// Whether execution is still on track toward the goal
    pub on_track: bool,
    /// Observed problems
    #[serde(default)]
    pub issues: Vec<String>,
    /// Non-binding suggestions
    #[serde(default)]
    pub suggestions: Vec<String>,
    /// Confidence in this judgement, clamped to [0, 1]
    pub confidence: f32,
}

impl Evaluation {
    /// The optimistic default used when the critic's output is garbage.
    /// An unreliable critic must not destabilize healthy execution.
    pub fn fallback() -> Self {
        Self {
            on_track: true,
            issues: Vec::new(),
            suggestions: Vec::new(),
            confidence: 0.5,
        }
    }
}

/// Evaluation plus any corrective steps the critic produced
#[derive(Debug, Clone)]
pub struct CriticVerdict {
    /// The judgement
    pub evaluation: Evaluation,
    /// Corrective steps to splice after the current index (often empty)
    pub corrections: Vec<Step>,
}

/// What the critic sees: goal, full plan, executed history, and the step
/// that just ran (last entry of `executed`).
#[derive(Debug)]
pub struct CriticReview<'a> {
    pub goal: &'a str,
    pub plan: &'a Plan,
    pub executed: Vec<&'a Step>,
    pub tools: &'a [ToolDescriptor],
}

/// Critic trait - post-step progress evaluator
#[async_trait]
pub trait Critic: Send + Sync {
    /// Judge the latest step. `Err` means the critic itself failed
    /// (e.g. the LLM was unreachable); the orchestrator degrades.
    async fn evaluate(&self, review: CriticReview<'_>) -> Result<CriticVerdict, CriticError>;
}
