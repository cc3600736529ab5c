//! LLM-backed planner.
//!
//! One prompt, one call, one JSON array out. The model's output is
//! treated as untrusted bytes: code fences are stripped, a bare object is
//! wrapped into a singleton array, and every step is validated against
//! the registry before anything executes. Malformed-in-substance plans
//! still fail loudly.

use std::collections::HashMap;
use std::fmt::Write;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use overseer_core::planner::{PlanError, Planner};
use overseer_core::tool::ToolDescriptor;
use overseer_core::types::{Step, StepStatus};

use crate::llm::{LlmClient, LlmRequest};

const MAX_PROMPT_LOG_CHARS: usize = 4_000;

/// Planner config
#[derive(Debug, Clone)]
pub struct LlmPlannerConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmPlannerConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            max_tokens: 4_096,
        }
    }
}

/// LLM-based planner
pub struct LlmPlanner<C: LlmClient> {
    client: C,
    config: LlmPlannerConfig,
}

impl<C: LlmClient> LlmPlanner<C> {
    pub fn new(client: C, config: LlmPlannerConfig) -> Self {
        Self { client, config }
    }

    fn build_prompt(
        &self,
        goal: &str,
        context: &HashMap<String, Value>,
        tools: &[ToolDescriptor],
    ) -> (String, String) {
        let mut system = String::new();
        system.push_str(
            "You are the planning component of an autonomous task execution platform. \
             Given a goal, produce an ordered plan of tool invocations that accomplishes it \
             inside an isolated sandbox.\n\n",
        );
        system.push_str("Tool Catalog:\n");
        for tool in tools {
            append_tool_catalog_entry(&mut system, tool);
        }
        system.push_str("\nOutput format:\n");
        system.push_str(
            "Return ONLY a JSON array of step objects, no prose, no Markdown. Each step:\n",
        );
        system.push_str(
            r#"{"id":"s1","tool":"tool_name","description":"what this step does","arguments":{},"success_criterion":"optional","required":true}"#,
        );
        system.push('\n');
        system.push_str("Rules:\n");
        system.push_str("1) Step ids must be unique.\n");
        system.push_str("2) Use only tool names from the Tool Catalog.\n");
        system.push_str("3) arguments must satisfy the tool's schema.\n");
        system.push_str("4) Prefer the fewest steps that accomplish the goal.\n");
        system.push_str("5) Set required=false only for genuinely optional steps.\n");

        let mut user = String::new();
        user.push_str(&format!("Goal:\n{}\n", goal));
        if !context.is_empty() {
            user.push_str("\nContext:\n");
            let mut keys: Vec<_> = context.keys().collect();
            keys.sort();
            for key in keys {
                user.push_str(&format!("- {}: {}\n", key, context[key]));
            }
        }

        (system, user)
    }
}

fn append_tool_catalog_entry(buf: &mut String, tool: &ToolDescriptor) {
    let _ = writeln!(buf, "- name: {}", tool.name);
    let _ = writeln!(buf, "  description: {}", tool.description);
    let _ = writeln!(buf, "  schema: {}", tool.schema);
}

fn truncate_for_log(input: &str, max_chars: usize) -> String {
    let char_count = input.chars().count();
    if char_count <= max_chars {
        return input.to_string();
    }
    let mut preview: String = input.chars().take(max_chars).collect();
    preview.push_str(&format!("... [truncated, total_chars={}]", char_count));
    preview
}

/// Strip a surrounding Markdown code fence (```json ... ```), a known
/// model quirk. Anything else passes through untouched.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(rest) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the language tag on the opening fence line, if any.
    match rest.split_once('\n') {
        Some((_, body)) => body.trim(),
        None => rest.trim(),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawStep {
    id: Option<String>,
    tool: Option<String>,
    description: Option<String>,
    #[serde(default)]
    arguments: Option<Value>,
    #[serde(default)]
    success_criterion: Option<String>,
    #[serde(default)]
    required: Option<bool>,
}

/// Parse the model output into raw steps, tolerating a single object in
/// place of an array.
pub(crate) fn parse_step_array(text: &str) -> Result<Vec<RawStep>, PlanError> {
    let json = strip_code_fences(text);
    let value: Value =
        serde_json::from_str(json).map_err(|e| PlanError::Parse(e.to_string()))?;
    let array = match value {
        Value::Array(items) => items,
        Value::Object(_) => vec![value],
        other => {
            return Err(PlanError::Parse(format!(
                "expected a JSON array of steps, got {}",
                type_label(&other)
            )))
        }
    };
    array
        .into_iter()
        .map(|item| serde_json::from_value(item).map_err(|e| PlanError::Parse(e.to_string())))
        .collect()
}

fn type_label(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Validate raw steps against the registry and settle them into pending
/// `Step`s. Shared by the planner and the critic's corrective output.
pub(crate) fn validate_steps(
    raw: Vec<RawStep>,
    tools: &[ToolDescriptor],
) -> Result<Vec<Step>, PlanError> {
    if raw.is_empty() {
        return Err(PlanError::EmptyPlan);
    }

    let known: std::collections::HashSet<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    let mut seen = std::collections::HashSet::new();
    let mut steps = Vec::with_capacity(raw.len());

    for (index, raw_step) in raw.into_iter().enumerate() {
        let id = raw_step
            .id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| PlanError::Validation(format!("step {} is missing an id", index)))?;
        let tool = raw_step
            .tool
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| PlanError::Validation(format!("step '{}' is missing a tool", id)))?;
        let description = raw_step.description.unwrap_or_default();
        if description.trim().is_empty() {
            return Err(PlanError::Validation(format!(
                "step '{}' is missing a description",
                id
            )));
        }
        if !known.contains(tool.as_str()) {
            return Err(PlanError::UnknownTool(tool));
        }
        if !seen.insert(id.clone()) {
            return Err(PlanError::Validation(format!("duplicate step id '{}'", id)));
        }

        let arguments = match raw_step.arguments {
            Some(Value::Object(map)) => Value::Object(map),
            Some(Value::Null) | None => Value::Object(serde_json::Map::new()),
            Some(other) => {
                return Err(PlanError::Validation(format!(
                    "step '{}' arguments must be an object, got {}",
                    id,
                    type_label(&other)
                )))
            }
        };

        let mut step = Step::new(id, tool, description).with_arguments(arguments);
        if let Some(criterion) = raw_step.success_criterion {
            step = step.with_success_criterion(criterion);
        }
        step.required = raw_step.required.unwrap_or(true);
        step.status = StepStatus::Pending;
        steps.push(step);
    }

    Ok(steps)
}

/// Parse and validate a complete planner response.
pub fn parse_plan_response(
    text: &str,
    tools: &[ToolDescriptor],
) -> Result<Vec<Step>, PlanError> {
    validate_steps(parse_step_array(text)?, tools)
}

#[async_trait]
impl<C: LlmClient> Planner for LlmPlanner<C> {
    async fn plan(
        &self,
        goal: &str,
        context: &HashMap<String, Value>,
        tools: &[ToolDescriptor],
    ) -> Result<Vec<Step>, PlanError> {
        let (system, user) = self.build_prompt(goal, context, tools);
        tracing::info!(
            model = %self.config.model,
            goal_len = goal.len(),
            tool_count = tools.len(),
            "planner request prepared"
        );
        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(
                system_prompt = %truncate_for_log(&system, MAX_PROMPT_LOG_CHARS),
                user_prompt = %truncate_for_log(&user, MAX_PROMPT_LOG_CHARS),
                "planner prompts"
            );
        }

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
            .map_err(|e| PlanError::Llm(e.to_string()))?;

        let steps = parse_plan_response(&output, tools)?;
        tracing::info!(step_count = steps.len(), "planner produced a plan");
        Ok(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use serde_json::json;

    fn tool(name: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: format!("{} tool", name),
            schema: json!({"type": "object"}),
        }
    }

    fn catalog() -> Vec<ToolDescriptor> {
        vec![tool("shell"), tool("file_write")]
    }

    #[test]
    fn test_plan_parses_clean_array() {
        tokio_test::block_on(async {
            let response = r#"[
                {"id":"s1","tool":"file_write","description":"create hello.txt",
                 "arguments":{"path":"hello.txt","content":"Hello"}}
            ]"#;
            let planner = LlmPlanner::new(MockLlmClient::new(response), LlmPlannerConfig::default());
            let steps = planner
                .plan("Create a file named hello.txt containing \"Hello\"", &HashMap::new(), &catalog())
                .await
                .expect("plan");

            assert_eq!(steps.len(), 1);
            assert_eq!(steps[0].tool, "file_write");
            assert_eq!(steps[0].arguments["path"], "hello.txt");
            assert_eq!(steps[0].status, StepStatus::Pending);
            assert!(steps[0].required);
        });
    }

    #[test]
    fn test_plan_strips_markdown_fences() {
        tokio_test::block_on(async {
            let response = "```json\n[{\"id\":\"s1\",\"tool\":\"shell\",\"description\":\"list\",\"arguments\":{\"command\":\"ls\"}}]\n```";
            let planner = LlmPlanner::new(MockLlmClient::new(response), LlmPlannerConfig::default());
            let steps = planner
                .plan("list files", &HashMap::new(), &catalog())
                .await
                .expect("plan");
            assert_eq!(steps.len(), 1);
            assert_eq!(steps[0].tool, "shell");
        });
    }

    #[test]
    fn test_plan_wraps_single_object_into_array() {
        tokio_test::block_on(async {
            let response = r#"{"id":"s1","tool":"shell","description":"list","arguments":{"command":"ls"}}"#;
            let planner = LlmPlanner::new(MockLlmClient::new(response), LlmPlannerConfig::default());
            let steps = planner
                .plan("list files", &HashMap::new(), &catalog())
                .await
                .expect("plan");
            assert_eq!(steps.len(), 1);
        });
    }

    #[test]
    fn test_unknown_tool_is_a_planning_error() {
        tokio_test::block_on(async {
            let response = r#"[{"id":"s1","tool":"teleport","description":"zap","arguments":{}}]"#;
            let planner = LlmPlanner::new(MockLlmClient::new(response), LlmPlannerConfig::default());
            let err = planner
                .plan("zap", &HashMap::new(), &catalog())
                .await
                .unwrap_err();
            assert!(matches!(err, PlanError::UnknownTool(name) if name == "teleport"));
        });
    }

    #[test]
    fn test_empty_array_is_a_planning_error() {
        tokio_test::block_on(async {
            let planner = LlmPlanner::new(MockLlmClient::new("[]"), LlmPlannerConfig::default());
            let err = planner
                .plan("do nothing", &HashMap::new(), &catalog())
                .await
                .unwrap_err();
            assert!(matches!(err, PlanError::EmptyPlan));
        });
    }

    #[test]
    fn test_duplicate_ids_are_a_planning_error() {
        tokio_test::block_on(async {
            let response = r#"[
                {"id":"s1","tool":"shell","description":"a","arguments":{}},
                {"id":"s1","tool":"shell","description":"b","arguments":{}}
            ]"#;
            let planner = LlmPlanner::new(MockLlmClient::new(response), LlmPlannerConfig::default());
            let err = planner
                .plan("twice", &HashMap::new(), &catalog())
                .await
                .unwrap_err();
            assert!(matches!(err, PlanError::Validation(_)));
        });
    }

    #[test]
    fn test_non_json_output_is_a_parse_error() {
        tokio_test::block_on(async {
            let planner = LlmPlanner::new(
                MockLlmClient::new("I would suggest running ls first."),
                LlmPlannerConfig::default(),
            );
            let err = planner
                .plan("list", &HashMap::new(), &catalog())
                .await
                .unwrap_err();
            assert!(matches!(err, PlanError::Parse(_)));
        });
    }

    #[test]
    fn test_prompt_carries_tool_catalog_and_goal() {
        let planner = LlmPlanner::new(MockLlmClient::new("[]"), LlmPlannerConfig::default());
        let mut context = HashMap::new();
        context.insert("repo".to_string(), json!("github.com/acme/site"));
        let (system, user) = planner.build_prompt("deploy the site", &context, &catalog());

        assert!(system.contains("Tool Catalog"));
        assert!(system.contains("name: shell"));
        assert!(system.contains("name: file_write"));
        assert!(system.contains("JSON array"));
        assert!(user.contains("deploy the site"));
        assert!(user.contains("repo"));
    }

    #[test]
    fn test_strip_code_fences_variants() {
        assert_eq!(strip_code_fences("[1]"), "[1]");
        assert_eq!(strip_code_fences("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fences("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fences("  ```json\n[1]\n```  "), "[1]");
    }

    #[test]
    fn test_required_false_survives_parsing() {
        let raw = parse_step_array(
            r#"[{"id":"s1","tool":"shell","description":"optional probe","arguments":{},"required":false}]"#,
        )
        .unwrap();
        let steps = validate_steps(raw, &catalog()).unwrap();
        assert!(!steps[0].required);
    }
}
