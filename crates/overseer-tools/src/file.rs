//! File tools: read, write, and list inside the sandbox's /work tree.
//!
//! The file service enforces a 5 MiB ceiling on reads and writes and
//! creates parent directories on write; path policy is applied both
//! host-side and in the service.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use overseer_core::tool::{ExecutionContext, Tool, ToolOutcome};
use overseer_core::types::Artifact;
use overseer_sandbox::SandboxManager;

fn params_get_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

/// Reads a file and returns its content as the result output.
pub struct FileReadTool {
    sandboxes: Arc<SandboxManager>,
}

impl FileReadTool {
    pub fn new(sandboxes: Arc<SandboxManager>) -> Self {
        Self { sandboxes }
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read a file from the sandbox workspace and return its content"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path, absolute under /work or relative to it"
                }
            },
            "required": ["path"]
        })
    }

    async fn invoke(&self, arguments: &Value, ctx: &ExecutionContext) -> ToolOutcome {
        let Some(path) = params_get_str(arguments, "path") else {
            return ToolOutcome::fail("file_read requires a 'path' argument");
        };

        let result = self.sandboxes.read_file(&ctx.sandbox_id, path).await;
        if result.success {
            ToolOutcome::ok(result.content)
                .with_metadata(json!({"path": result.path, "size": result.size}))
        } else {
            ToolOutcome::fail(result.error.unwrap_or_else(|| "read failed".to_string()))
        }
    }
}

/// Writes a file, creating parent directories, and emits a file artifact.
pub struct FileWriteTool {
    sandboxes: Arc<SandboxManager>,
}

impl FileWriteTool {
    pub fn new(sandboxes: Arc<SandboxManager>) -> Self {
        Self { sandboxes }
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Write content to a file in the sandbox workspace, creating parent directories"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Target path, absolute under /work or relative to it"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn invoke(&self, arguments: &Value, ctx: &ExecutionContext) -> ToolOutcome {
        let Some(path) = params_get_str(arguments, "path") else {
            return ToolOutcome::fail("file_write requires a 'path' argument");
        };
        let Some(content) = params_get_str(arguments, "content") else {
            return ToolOutcome::fail("file_write requires a 'content' argument");
        };

        let result = self
            .sandboxes
            .write_file(&ctx.sandbox_id, path, content)
            .await;
        if result.success {
            let artifact = Artifact::file(result.path.clone())
                .with_metadata(json!({"size": result.size}));
            ToolOutcome::ok(format!("wrote {} bytes to {}", result.size, result.path))
                .with_artifacts(vec![artifact])
        } else {
            ToolOutcome::fail(result.error.unwrap_or_else(|| "write failed".to_string()))
        }
    }
}

/// Lists a directory in human-readable form; structured entries go to
/// metadata.
pub struct FileListTool {
    sandboxes: Arc<SandboxManager>,
}

impl FileListTool {
    pub fn new(sandboxes: Arc<SandboxManager>) -> Self {
        Self { sandboxes }
    }
}

#[async_trait]
impl Tool for FileListTool {
    fn name(&self) -> &str {
        "file_list"
    }

    fn description(&self) -> &str {
        "List a directory in the sandbox workspace"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list (defaults to /work)"
                }
            }
        })
    }

    async fn invoke(&self, arguments: &Value, ctx: &ExecutionContext) -> ToolOutcome {
        let path = params_get_str(arguments, "path");
        let result = self.sandboxes.list_directory(&ctx.sandbox_id, path).await;
        if !result.success {
            return ToolOutcome::fail(result.error.unwrap_or_else(|| "list failed".to_string()));
        }

        let mut listing = format!("{}:\n", result.path);
        for entry in &result.files {
            listing.push_str(&format!(
                "  {:<9} {:>10}  {}\n",
                entry.kind, entry.size, entry.name
            ));
        }
        let entries = serde_json::to_value(&result.files).unwrap_or(Value::Null);
        ToolOutcome::ok(listing).with_metadata(json!({"path": result.path, "entries": entries}))
    }
}
