//! # Overseer Planners
//!
//! LLM-backed implementations of the core `Planner` and `Critic` traits,
//! plus the `LlmClient` abstraction over the model endpoint. The model's
//! output is treated as untrusted bytes everywhere: normalize first
//! (fence stripping, object-to-array wrapping), then validate against
//! the tool registry, then execute.

mod critic;
mod llm;
mod planner;

pub use critic::{LlmCritic, LlmCriticConfig};
pub use llm::{
    FailingLlmClient, HttpLlmClient, HttpLlmClientConfig, LlmClient, LlmError, LlmRequest,
    MockLlmClient,
};
pub use planner::{parse_plan_response, strip_code_fences, LlmPlanner, LlmPlannerConfig};
