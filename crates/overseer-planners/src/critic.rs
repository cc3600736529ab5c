//! LLM-backed critic.
//!
//! After each step the critic judges whether execution is still on track
//! and may emit corrective steps. The critic must never destabilize a
//! healthy run: an unreachable LLM surfaces as an error the orchestrator
//! logs and ignores, and unparseable output degrades to an optimistic
//! fallback evaluation with no corrections.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use overseer_core::critic::{Critic, CriticError, CriticReview, CriticVerdict, Evaluation};
use overseer_core::types::{Step, StepStatus};

use crate::llm::{LlmClient, LlmRequest};
use crate::planner::{strip_code_fences, validate_steps};

const STEP_RESULT_PREVIEW_CHARS: usize = 1_000;

/// Critic config
#[derive(Debug, Clone)]
pub struct LlmCriticConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Corrections below this confidence are ignored
    pub confidence_threshold: f32,
}

impl Default for LlmCriticConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.1,
            max_tokens: 2_048,
            confidence_threshold: 0.7,
        }
    }
}

/// LLM-based critic
pub struct LlmCritic<C: LlmClient> {
    client: C,
    config: LlmCriticConfig,
}

impl<C: LlmClient> LlmCritic<C> {
    pub fn new(client: C, config: LlmCriticConfig) -> Self {
        Self { client, config }
    }

    fn build_prompt(&self, review: &CriticReview<'_>) -> (String, String) {
        let mut system = String::new();
        system.push_str(
            "You are the critic component of an autonomous task execution platform. \
             After each step you judge whether execution is still on track toward the goal \
             and, when it is not, propose corrective steps.\n\n",
        );
        system.push_str("Available tools:\n");
        for tool in review.tools {
            system.push_str(&format!("- {}: {}\n", tool.name, tool.description));
        }
        system.push_str("\nReturn ONLY one JSON object, no prose, no Markdown:\n");
        system.push_str(
            r#"{"on_track":true,"issues":[],"suggestions":[],"confidence":0.9,"corrective_steps":[]}"#,
        );
        system.push('\n');
        system.push_str(
            "corrective_steps entries use the planner step shape \
             {\"id\",\"tool\",\"description\",\"arguments\",\"required\"} and only tools listed above.\n",
        );

        let mut user = String::new();
        user.push_str(&format!("Goal:\n{}\n\n", review.goal));
        user.push_str("Plan:\n");
        for step in &review.plan.steps {
            user.push_str(&format!(
                "- [{}] {} ({}): {}\n",
                status_label(step.status),
                step.id,
                step.tool,
                step.description
            ));
        }
        user.push_str("\nExecuted so far:\n");
        for step in &review.executed {
            user.push_str(&render_executed_step(step));
        }
        if let Some(last) = review.executed.last() {
            user.push_str(&format!("\nJust executed: {}\n", last.id));
            if let Some(criterion) = &last.success_criterion {
                user.push_str(&format!("Its success criterion: {}\n", criterion));
            }
        }

        (system, user)
    }
}

fn status_label(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Pending => "pending",
        StepStatus::Running => "running",
        StepStatus::Completed => "completed",
        StepStatus::Failed => "failed",
    }
}

fn render_executed_step(step: &Step) -> String {
    let mut out = format!("- {} [{}]", step.id, status_label(step.status));
    if let Some(result) = &step.result {
        let preview: String = result.output.chars().take(STEP_RESULT_PREVIEW_CHARS).collect();
        out.push_str(&format!(" output: {}", preview));
        if let Some(error) = &result.error {
            out.push_str(&format!(" error: {}", error));
        }
    }
    out.push('\n');
    out
}

#[derive(Debug, Deserialize)]
struct RawEvaluation {
    on_track: Option<bool>,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    suggestions: Vec<String>,
    confidence: Option<f32>,
    #[serde(default)]
    corrective_steps: Value,
}

fn parse_verdict(
    text: &str,
    review: &CriticReview<'_>,
    threshold: f32,
) -> CriticVerdict {
    let json = strip_code_fences(text);
    let raw: RawEvaluation = match serde_json::from_str(json) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!(error = %err, "critic output unparseable, using fallback evaluation");
            return CriticVerdict {
                evaluation: Evaluation::fallback(),
                corrections: Vec::new(),
            };
        }
    };

    let evaluation = Evaluation {
        on_track: raw.on_track.unwrap_or(true),
        issues: raw.issues,
        suggestions: raw.suggestions,
        confidence: raw.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
    };

    let corrections = if !evaluation.on_track && evaluation.confidence >= threshold {
        parse_corrections(raw.corrective_steps, review)
    } else {
        Vec::new()
    };

    CriticVerdict {
        evaluation,
        corrections,
    }
}

/// Validate corrective steps like planner output; a correction set that
/// fails validation is dropped whole rather than half-applied.
fn parse_corrections(value: Value, review: &CriticReview<'_>) -> Vec<Step> {
    if value.is_null() {
        return Vec::new();
    }
    let rendered = value.to_string();
    let raw = match crate::planner::parse_step_array(&rendered) {
        Ok(raw) if !raw.is_empty() => raw,
        Ok(_) => return Vec::new(),
        Err(err) => {
            tracing::warn!(error = %err, "corrective steps malformed, dropping correction");
            return Vec::new();
        }
    };
    match validate_steps(raw, review.tools) {
        Ok(steps) => steps
            .into_iter()
            .map(|mut step| {
                if !step.id.starts_with("fix-") {
                    step.id = format!("fix-{}", step.id);
                }
                step
            })
            .collect(),
        Err(err) => {
            tracing::warn!(error = %err, "corrective steps failed validation, dropping correction");
            Vec::new()
        }
    }
}

#[async_trait]
impl<C: LlmClient> Critic for LlmCritic<C> {
    async fn evaluate(&self, review: CriticReview<'_>) -> Result<CriticVerdict, CriticError> {
        let (system, user) = self.build_prompt(&review);
        let request = LlmRequest {
            system,
            user,
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        let output = self
            .client
            .complete(request)
            .await
            .map_err(|e| CriticError::Llm(e.to_string()))?;

        let verdict = parse_verdict(&output, &review, self.config.confidence_threshold);
        tracing::info!(
            on_track = verdict.evaluation.on_track,
            confidence = verdict.evaluation.confidence,
            corrections = verdict.corrections.len(),
            "critic evaluation"
        );
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{FailingLlmClient, MockLlmClient};
    use overseer_core::tool::ToolDescriptor;
    use overseer_core::types::Plan;
    use serde_json::json;

    fn catalog() -> Vec<ToolDescriptor> {
        vec![ToolDescriptor {
            name: "shell".to_string(),
            description: "shell tool".to_string(),
            schema: json!({"type": "object"}),
        }]
    }

    fn plan() -> Plan {
        Plan::new("goal", vec![Step::new("s1", "shell", "first")])
    }

    fn review<'a>(plan: &'a Plan, tools: &'a [ToolDescriptor]) -> CriticReview<'a> {
        CriticReview {
            goal: "goal",
            plan,
            executed: plan.steps.iter().collect(),
            tools,
        }
    }

    #[test]
    fn test_off_track_with_confidence_yields_corrections() {
        tokio_test::block_on(async {
            let response = r#"{
                "on_track": false,
                "issues": ["wrong directory"],
                "suggestions": [],
                "confidence": 0.9,
                "corrective_steps": [
                    {"id":"c1","tool":"shell","description":"cd to /work first","arguments":{"command":"ls /work"}}
                ]
            }"#;
            let critic = LlmCritic::new(MockLlmClient::new(response), LlmCriticConfig::default());
            let plan = plan();
            let tools = catalog();
            let verdict = critic.evaluate(review(&plan, &tools)).await.unwrap();

            assert!(!verdict.evaluation.on_track);
            assert_eq!(verdict.corrections.len(), 1);
            assert_eq!(verdict.corrections[0].id, "fix-c1");
        });
    }

    #[test]
    fn test_low_confidence_suppresses_corrections() {
        tokio_test::block_on(async {
            let response = r#"{
                "on_track": false,
                "issues": ["maybe wrong"],
                "confidence": 0.4,
                "corrective_steps": [
                    {"id":"c1","tool":"shell","description":"retry","arguments":{}}
                ]
            }"#;
            let critic = LlmCritic::new(MockLlmClient::new(response), LlmCriticConfig::default());
            let plan = plan();
            let tools = catalog();
            let verdict = critic.evaluate(review(&plan, &tools)).await.unwrap();
            assert!(verdict.corrections.is_empty());
        });
    }

    #[test]
    fn test_garbage_output_degrades_to_optimistic_fallback() {
        tokio_test::block_on(async {
            let critic = LlmCritic::new(
                MockLlmClient::new("the step looked fine to me"),
                LlmCriticConfig::default(),
            );
            let plan = plan();
            let tools = catalog();
            let verdict = critic.evaluate(review(&plan, &tools)).await.unwrap();

            assert!(verdict.evaluation.on_track);
            assert_eq!(verdict.evaluation.confidence, 0.5);
            assert!(verdict.corrections.is_empty());
        });
    }

    #[test]
    fn test_unreachable_llm_is_an_error_not_a_panic() {
        tokio_test::block_on(async {
            let critic = LlmCritic::new(FailingLlmClient, LlmCriticConfig::default());
            let plan = plan();
            let tools = catalog();
            let err = critic.evaluate(review(&plan, &tools)).await.unwrap_err();
            assert!(matches!(err, CriticError::Llm(_)));
        });
    }

    #[test]
    fn test_corrections_with_unknown_tool_are_dropped_whole() {
        tokio_test::block_on(async {
            let response = r#"{
                "on_track": false,
                "confidence": 0.95,
                "corrective_steps": [
                    {"id":"c1","tool":"shell","description":"ok","arguments":{}},
                    {"id":"c2","tool":"teleport","description":"bad","arguments":{}}
                ]
            }"#;
            let critic = LlmCritic::new(MockLlmClient::new(response), LlmCriticConfig::default());
            let plan = plan();
            let tools = catalog();
            let verdict = critic.evaluate(review(&plan, &tools)).await.unwrap();
            assert!(verdict.corrections.is_empty());
        });
    }

    #[test]
    fn test_confidence_is_clamped() {
        tokio_test::block_on(async {
            let response = r#"{"on_track": true, "confidence": 3.2}"#;
            let critic = LlmCritic::new(MockLlmClient::new(response), LlmCriticConfig::default());
            let plan = plan();
            let tools = catalog();
            let verdict = critic.evaluate(review(&plan, &tools)).await.unwrap();
            assert_eq!(verdict.evaluation.confidence, 1.0);
        });
    }
}
