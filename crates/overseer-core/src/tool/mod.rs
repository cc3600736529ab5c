//! Tool abstraction module
//!
//! This module defines the Tool trait and related types:
//! - Tool: a named handler with a JSON-schema input contract
//! - ToolRegistry: the flat process-wide name → handler map
//! - ToolOutcome: the uniform invocation result
//! - ExecutionContext: bounded per-invocation context

mod context;
mod outcome;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

pub use context::ExecutionContext;
pub use outcome::ToolOutcome;

// Re-export CancellationToken for convenience
pub use tokio_util::sync::CancellationToken;

/// Tool trait - a named handler behind a common call signature
///
/// Tools are black boxes to the executor. Every failure mode must be
/// returned as a `ToolOutcome` with `success = false`; tools do not
/// raise.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name
    fn name(&self) -> &str;

    /// Human description (rendered into the planner prompt)
    fn description(&self) -> &str;

    /// JSON schema for the argument object
    fn schema(&self) -> Value;

    /// Invoke the tool
    async fn invoke(&self, arguments: &Value, ctx: &ExecutionContext) -> ToolOutcome;
}

/// Advertised tool contract, as rendered into the planner prompt
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    /// Tool name
    pub name: String,
    /// Human description
    pub description: String,
    /// JSON schema for the argument object
    pub schema: Value,
}

/// Process-wide mapping from tool name to handler
///
/// Deliberately flat: no hierarchies, no versioning. The planner depends
/// only on `describe()`, so registering a new tool requires no planner
/// change. Effectively read-only after startup; share as `Arc<ToolRegistry>`.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool; a second registration under the same name
    /// overwrites the first and emits a warning.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "tool re-registered, previous handler replaced");
        }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Check whether a tool name resolves
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All registered tools
    pub fn all(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.values().cloned().collect()
    }

    /// Advertised contracts for the planner prompt, sorted by name for
    /// stable prompt rendering.
    pub fn describe(&self) -> Vec<ToolDescriptor> {
        let mut out: Vec<ToolDescriptor> = self
            .tools
            .values()
            .map(|t| ToolDescriptor {
                name: t.name().to_string(),
                description: t.description().to_string(),
                schema: t.schema(),
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool {
        name: String,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            &self.name
        }

        fn description(&self) -> &str {
            "echoes its message argument"
        }

        fn schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {"message": {"type": "string"}},
                "required": ["message"]
            })
        }

        async fn invoke(&self, arguments: &Value, _ctx: &ExecutionContext) -> ToolOutcome {
            match arguments.get("message").and_then(|v| v.as_str()) {
                Some(message) => ToolOutcome::ok(message),
                None => ToolOutcome::fail("missing message"),
            }
        }
    }

    #[test]
    fn test_register_overwrites_on_same_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool {
            name: "echo".to_string(),
        }));
        registry.register(Arc::new(EchoTool {
            name: "echo".to_string(),
        }));

        assert!(registry.has("echo"));
        assert_eq!(registry.all().len(), 1);
    }

    #[test]
    fn test_describe_lists_contracts_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool {
            name: "zeta".to_string(),
        }));
        registry.register(Arc::new(EchoTool {
            name: "alpha".to_string(),
        }));

        let descriptors = registry.describe();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].name, "alpha");
        assert_eq!(descriptors[1].name, "zeta");
        assert!(descriptors[0].schema.get("properties").is_some());
    }

    #[test]
    fn test_lookup_miss_returns_none() {
        let registry = ToolRegistry::new();
        assert!(registry.get("shell").is_none());
        assert!(!registry.has("shell"));
    }
}
