//! # Overseer Config
//!
//! Worker configuration: YAML file loading, validation, and environment
//! overrides for the deployment knobs (LLM endpoint and models, critic
//! settings, queue connection, timeouts, concurrency). Config is read
//! once at worker startup.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Language model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// OpenAI-compatible chat completions endpoint
    pub endpoint: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    /// Model used by the planner
    pub planner_model: String,
    /// Model used by the critic
    pub critic_model: String,
    /// Provider-side request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key_env: "OVERSEER_LLM_API_KEY".to_string(),
            planner_model: "gpt-4o-mini".to_string(),
            critic_model: "gpt-4o-mini".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Critic settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CriticSection {
    /// Whether the critique loop runs at all
    pub enabled: bool,
    /// Corrections below this confidence are ignored
    pub confidence_threshold: f32,
    /// Correction rounds allowed per task
    pub max_correction_rounds: u32,
}

impl Default for CriticSection {
    fn default() -> Self {
        Self {
            enabled: true,
            confidence_threshold: 0.7,
            max_correction_rounds: 3,
        }
    }
}

/// Sandbox settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSection {
    /// Container image for sandboxes
    pub image: String,
    /// Optional docker build context for lazy image builds
    pub build_context: Option<String>,
    /// CPU cap per sandbox
    pub cpus: f64,
    /// Memory cap per sandbox
    pub memory: String,
    /// Size of the writable /work tmpfs
    pub work_size: String,
    /// Whether sandboxes expose the browser service
    pub include_browser: bool,
    /// Sandbox lifetime before the deferred destroy fires, in seconds
    pub lifetime_secs: u64,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            image: "overseer-sandbox:latest".to_string(),
            build_context: None,
            cpus: 1.0,
            memory: "512m".to_string(),
            work_size: "256m".to_string(),
            include_browser: true,
            lifetime_secs: 3_600,
        }
    }
}

/// Worker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSection {
    /// Concurrent task executions
    pub concurrency: usize,
    /// Attempts per job, counting the first
    pub max_attempts: u32,
    /// Default per-step timeout in seconds
    pub step_timeout_secs: u64,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            concurrency: 5,
            max_attempts: 3,
            step_timeout_secs: 30,
        }
    }
}

/// Queue settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct QueueSection {
    /// Connection string of the external job queue; empty selects the
    /// in-process queue.
    pub url: String,
}

/// Full worker configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OverseerConfig {
    pub llm: LlmSection,
    pub critic: CriticSection,
    pub sandbox: SandboxSection,
    pub worker: WorkerSection,
    pub queue: QueueSection,
}

impl OverseerConfig {
    /// Load configuration from a YAML file, apply environment overrides,
    /// and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let mut config: OverseerConfig = serde_yaml::from_str(&content)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for deployments without a
    /// config file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = OverseerConfig::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply the documented environment knobs over whatever the file
    /// provided.
    pub fn apply_env(&mut self) {
        if let Ok(endpoint) = std::env::var("OVERSEER_LLM_ENDPOINT") {
            self.llm.endpoint = endpoint;
        }
        if let Ok(model) = std::env::var("OVERSEER_PLANNER_MODEL") {
            self.llm.planner_model = model;
        }
        if let Ok(model) = std::env::var("OVERSEER_CRITIC_MODEL") {
            self.llm.critic_model = model;
        }
        if let Ok(enabled) = std::env::var("OVERSEER_CRITIC_ENABLED") {
            self.critic.enabled = matches!(enabled.trim(), "1" | "true" | "yes" | "on");
        }
        if let Ok(threshold) = std::env::var("OVERSEER_CRITIC_CONFIDENCE_THRESHOLD") {
            if let Ok(value) = threshold.trim().parse::<f32>() {
                self.critic.confidence_threshold = value;
            }
        }
        if let Ok(url) = std::env::var("OVERSEER_QUEUE_URL") {
            self.queue.url = url;
        }
        if let Ok(timeout) = std::env::var("OVERSEER_TASK_TIMEOUT_SECS") {
            if let Ok(value) = timeout.trim().parse::<u64>() {
                self.sandbox.lifetime_secs = value;
            }
        }
        if let Ok(concurrency) = std::env::var("OVERSEER_WORKER_CONCURRENCY") {
            if let Ok(value) = concurrency.trim().parse::<usize>() {
                self.worker.concurrency = value;
            }
        }
    }

    /// Reject configurations that cannot run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "llm.endpoint must not be empty".to_string(),
            ));
        }
        if self.llm.planner_model.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "llm.planner_model must not be empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.critic.confidence_threshold) {
            return Err(ConfigError::Invalid(
                "critic.confidence_threshold must be within [0, 1]".to_string(),
            ));
        }
        if self.sandbox.image.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "sandbox.image must not be empty".to_string(),
            ));
        }
        if self.sandbox.cpus <= 0.0 {
            return Err(ConfigError::Invalid(
                "sandbox.cpus must be > 0".to_string(),
            ));
        }
        if self.sandbox.lifetime_secs == 0 {
            return Err(ConfigError::Invalid(
                "sandbox.lifetime_secs must be > 0".to_string(),
            ));
        }
        if self.worker.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "worker.concurrency must be > 0".to_string(),
            ));
        }
        if self.worker.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "worker.max_attempts must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(OverseerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
llm:
  planner_model: gpt-4o
critic:
  enabled: false
"#;
        let config: OverseerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.llm.planner_model, "gpt-4o");
        assert!(!config.critic.enabled);
        // untouched sections keep their defaults
        assert_eq!(config.worker.concurrency, 5);
        assert_eq!(config.sandbox.lifetime_secs, 3_600);
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = OverseerConfig::default();
        config.worker.concurrency = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_validate_rejects_out_of_range_threshold() {
        let mut config = OverseerConfig::default();
        config.critic.confidence_threshold = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid(_))
        ));
    }
}
