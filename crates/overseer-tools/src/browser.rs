//! Browser tool: drives the in-sandbox browser service.
//!
//! The result shape depends on the action: page title and text for read,
//! a base64 PNG artifact for screenshot, a table matrix for
//! extract_table, a URL confirmation for the rest. Navigation timeouts
//! and missing selectors surface as failed outcomes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use overseer_core::tool::{ExecutionContext, Tool, ToolOutcome};
use overseer_core::types::Artifact;
use overseer_sandbox::{BrowserOptions, SandboxManager};

const BROWSER_ACTIONS: [&str; 6] = [
    "open",
    "read",
    "screenshot",
    "extract_table",
    "click",
    "fill_form",
];

fn params_get_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

fn params_get_u64(params: &Value, key: &str) -> Option<u64> {
    params.get(key).and_then(|v| v.as_u64())
}

/// Drives the sandbox browser service.
pub struct BrowserTool {
    sandboxes: Arc<SandboxManager>,
}

impl BrowserTool {
    pub fn new(sandboxes: Arc<SandboxManager>) -> Self {
        Self { sandboxes }
    }
}

#[async_trait]
impl Tool for BrowserTool {
    fn name(&self) -> &str {
        "browser"
    }

    fn description(&self) -> &str {
        "Open, read, screenshot, or interact with a web page from inside the sandbox"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": BROWSER_ACTIONS,
                    "description": "Browser action to perform"
                },
                "url": {
                    "type": "string",
                    "description": "Page URL"
                },
                "selector": {
                    "type": "string",
                    "description": "CSS selector (click, fill_form, extract_table)"
                },
                "instructions": {
                    "type": "string",
                    "description": "Form values or extra directions (fill_form)"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Navigation timeout in milliseconds"
                }
            },
            "required": ["action", "url"]
        })
    }

    async fn invoke(&self, arguments: &Value, ctx: &ExecutionContext) -> ToolOutcome {
        let Some(action) = params_get_str(arguments, "action") else {
            return ToolOutcome::fail("browser requires an 'action' argument");
        };
        if !BROWSER_ACTIONS.contains(&action) {
            return ToolOutcome::fail(format!("unknown browser action: {}", action));
        }
        let Some(url) = params_get_str(arguments, "url") else {
            return ToolOutcome::fail("browser requires a 'url' argument");
        };

        let options = BrowserOptions {
            url: Some(url.to_string()),
            selector: params_get_str(arguments, "selector").map(ToString::to_string),
            instructions: params_get_str(arguments, "instructions").map(ToString::to_string),
            timeout: Some(
                params_get_u64(arguments, "timeout")
                    .map(Duration::from_millis)
                    .unwrap_or(ctx.default_timeout),
            ),
        };

        let result = self
            .sandboxes
            .execute_browser(&ctx.sandbox_id, action, options)
            .await;
        if !result.success {
            return ToolOutcome::fail(
                result
                    .error
                    .unwrap_or_else(|| format!("browser {} failed", action)),
            );
        }

        match action {
            "read" => {
                let title = result.data["title"].as_str().unwrap_or_default();
                let text = result.data["text"].as_str().unwrap_or_default();
                ToolOutcome::ok(format!("{}\n\n{}", title, text))
                    .with_metadata(json!({"url": url, "title": title}))
            }
            "screenshot" => {
                let image = result.data["screenshot"].as_str().unwrap_or_default();
                let artifact = Artifact::data(image)
                    .with_metadata(json!({"url": url, "format": "image/png", "encoding": "base64"}));
                ToolOutcome::ok(format!("captured screenshot of {}", url))
                    .with_artifacts(vec![artifact])
            }
            "extract_table" => {
                let table = result.data.get("table").cloned().unwrap_or(Value::Null);
                let rows = table.as_array().map(Vec::len).unwrap_or(0);
                ToolOutcome::ok(format!("extracted table with {} rows from {}", rows, url))
                    .with_metadata(json!({"url": url, "table": table}))
            }
            _ => ToolOutcome::ok(format!("{} completed on {}", action, url))
                .with_metadata(json!({"url": url})),
        }
    }
}
