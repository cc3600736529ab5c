//! Artifact type definitions

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Artifact kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    File,
    Url,
    Text,
    Data,
}

/// A durable output produced by a successful step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Artifact kind
    pub kind: ArtifactKind,
    /// Path inside the sandbox (File artifacts)
    #[serde(default)]
    pub path: Option<String>,
    /// URL (Url artifacts)
    #[serde(default)]
    pub url: Option<String>,
    /// Inline content (Text and Data artifacts)
    #[serde(default)]
    pub content: Option<String>,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: Value,
}

impl Artifact {
    /// A file artifact by sandbox path
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            kind: ArtifactKind::File,
            path: Some(path.into()),
            url: None,
            content: None,
            metadata: Value::Null,
        }
    }

    /// A URL artifact
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            kind: ArtifactKind::Url,
            path: None,
            url: Some(url.into()),
            content: None,
            metadata: Value::Null,
        }
    }

    /// An inline text artifact
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: ArtifactKind::Text,
            path: None,
            url: None,
            content: Some(content.into()),
            metadata: Value::Null,
        }
    }

    /// An inline data artifact (encoded payloads such as base64 images)
    pub fn data(content: impl Into<String>) -> Self {
        Self {
            kind: ArtifactKind::Data,
            path: None,
            url: None,
            content: Some(content.into()),
            metadata: Value::Null,
        }
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}
