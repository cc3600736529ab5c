//! Shell tool: runs a command inside the task's sandbox.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use overseer_core::tool::{ExecutionContext, Tool, ToolOutcome};
use overseer_sandbox::{SandboxManager, ShellOptions};

use crate::truncate::{truncate_output, OUTPUT_CEILING_CHARS};

fn params_get_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

fn params_get_u64(params: &Value, key: &str) -> Option<u64> {
    params.get(key).and_then(|v| v.as_u64())
}

/// Runs a shell command inside the sandbox. stdout becomes the result
/// output; stderr and the exit code land in metadata. The in-sandbox
/// service enforces the command blocklist as well; rejection here is the
/// host-side layer of the same policy.
pub struct ShellTool {
    sandboxes: Arc<SandboxManager>,
}

impl ShellTool {
    pub fn new(sandboxes: Arc<SandboxManager>) -> Self {
        Self { sandboxes }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command inside the task sandbox and return its stdout"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to run"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Operation timeout in milliseconds"
                },
                "cwd": {
                    "type": "string",
                    "description": "Working directory inside the sandbox (defaults to /work)"
                }
            },
            "required": ["command"]
        })
    }

    async fn invoke(&self, arguments: &Value, ctx: &ExecutionContext) -> ToolOutcome {
        let Some(command) = params_get_str(arguments, "command") else {
            return ToolOutcome::fail("shell requires a 'command' argument");
        };

        let options = ShellOptions {
            timeout: Some(
                params_get_u64(arguments, "timeout")
                    .map(Duration::from_millis)
                    .unwrap_or(ctx.default_timeout),
            ),
            cwd: Some(
                params_get_str(arguments, "cwd")
                    .unwrap_or(&ctx.default_cwd)
                    .to_string(),
            ),
        };

        let result = self
            .sandboxes
            .execute_shell(&ctx.sandbox_id, command, options)
            .await;

        let (stdout, stdout_truncated) = truncate_output(&result.stdout, OUTPUT_CEILING_CHARS);
        let (stderr, _) = truncate_output(&result.stderr, OUTPUT_CEILING_CHARS);
        let metadata = json!({
            "exit_code": result.exit_code,
            "stderr": stderr,
            "truncated": stdout_truncated,
        });

        if result.success {
            ToolOutcome::ok(stdout).with_metadata(metadata)
        } else {
            let error = result
                .error
                .unwrap_or_else(|| format!("command exited with {}", result.exit_code));
            ToolOutcome {
                success: false,
                output: stdout,
                artifacts: Vec::new(),
                error: Some(error),
                metadata,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overseer_sandbox::SandboxManagerConfig;

    fn shell_tool() -> ShellTool {
        ShellTool::new(Arc::new(SandboxManager::new(SandboxManagerConfig::default())))
    }

    #[test]
    fn test_missing_command_fails() {
        tokio_test::block_on(async {
            let tool = shell_tool();
            let ctx = ExecutionContext::new("sb-1", "task-1");
            let outcome = tool.invoke(&json!({}), &ctx).await;
            assert!(!outcome.success);
            assert!(outcome.error.unwrap().contains("command"));
        });
    }

    #[test]
    fn test_blocked_command_reports_policy_rejection() {
        tokio_test::block_on(async {
            let tool = shell_tool();
            let ctx = ExecutionContext::new("sb-1", "task-1");
            let outcome = tool
                .invoke(&json!({"command": "sudo rm -rf /"}), &ctx)
                .await;
            assert!(!outcome.success);
            assert!(outcome.error.unwrap().contains("blocked by policy"));
        });
    }

    #[test]
    fn test_schema_names_required_command() {
        let tool = shell_tool();
        let schema = tool.schema();
        assert_eq!(schema["required"][0], "command");
        assert!(schema["properties"]["timeout"].is_object());
    }
}
