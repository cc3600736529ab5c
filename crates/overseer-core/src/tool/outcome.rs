//! ToolOutcome type definition

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::Artifact;

/// Uniform result returned by every tool invocation
///
/// Tools never raise to the executor; every failure mode (policy
/// rejection, transport error, non-zero exit) lands here with
/// `success = false`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// Whether the invocation succeeded
    pub success: bool,
    /// Primary output text
    #[serde(default)]
    pub output: String,
    /// Artifacts produced by the invocation
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    /// Error text when `success` is false
    #[serde(default)]
    pub error: Option<String>,
    /// Structured extras (exit codes, stderr, listings)
    #[serde(default)]
    pub metadata: Value,
}

impl ToolOutcome {
    /// Successful outcome with output text
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            artifacts: Vec::new(),
            error: None,
            metadata: Value::Null,
        }
    }

    /// Failed outcome with error text
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            artifacts: Vec::new(),
            error: Some(error.into()),
            metadata: Value::Null,
        }
    }

    /// Attach artifacts
    pub fn with_artifacts(mut self, artifacts: Vec<Artifact>) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}
