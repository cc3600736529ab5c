//! RPC-style facades over the in-sandbox HTTP services.
//!
//! Each call builds a request against the sandbox's recorded host port,
//! enforces a transport timeout slightly larger than the requested
//! operation timeout, and parses the JSON response. Network errors, JSON
//! parse errors, and non-2xx responses all funnel into a `success: false`
//! payload; the executor is the retry authority, so nothing here retries.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::manager::SandboxManager;
use crate::policy;

/// Headroom added on top of the operation timeout for the HTTP transport.
const TRANSPORT_HEADROOM: Duration = Duration::from_secs(5);

/// Options for a shell execution
#[derive(Debug, Clone, Default)]
pub struct ShellOptions {
    /// Operation timeout; the service kills the command past this.
    pub timeout: Option<Duration>,
    /// Working directory inside the sandbox
    pub cwd: Option<String>,
}

/// Result of a shell execution
#[derive(Debug, Clone, Deserialize)]
pub struct ShellOutput {
    pub success: bool,
    #[serde(rename = "exitCode", default)]
    pub exit_code: i32,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub error: Option<String>,
}

impl ShellOutput {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: -1,
            stdout: String::new(),
            stderr: String::new(),
            error: Some(error.into()),
        }
    }
}

/// Result of a file read
#[derive(Debug, Clone, Deserialize)]
pub struct FileContent {
    pub success: bool,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub error: Option<String>,
}

impl FileContent {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            path: String::new(),
            content: String::new(),
            size: 0,
            error: Some(error.into()),
        }
    }
}

/// Result of a file write
#[derive(Debug, Clone, Deserialize)]
pub struct FileWritten {
    pub success: bool,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub error: Option<String>,
}

impl FileWritten {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            path: String::new(),
            size: 0,
            error: Some(error.into()),
        }
    }
}

/// One entry in a directory listing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DirEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified: Option<String>,
}

/// Result of a directory listing
#[derive(Debug, Clone, Deserialize)]
pub struct DirListing {
    pub success: bool,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub files: Vec<DirEntry>,
    #[serde(default)]
    pub error: Option<String>,
}

impl DirListing {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            path: String::new(),
            files: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Options for a browser action
#[derive(Debug, Clone, Default)]
pub struct BrowserOptions {
    pub url: Option<String>,
    pub selector: Option<String>,
    pub instructions: Option<String>,
    pub timeout: Option<Duration>,
}

/// Result of a browser action; the payload shape depends on the action.
#[derive(Debug, Clone)]
pub struct BrowserOutput {
    pub success: bool,
    pub data: Value,
    pub error: Option<String>,
}

impl BrowserOutput {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Value::Null,
            error: Some(error.into()),
        }
    }
}

impl SandboxManager {
    fn service_url(&self, sandbox_id: &str, service: &str, endpoint: &str) -> Result<String, String> {
        let sandbox = self
            .get(sandbox_id)
            .ok_or_else(|| format!("sandbox not found: {}", sandbox_id))?;
        let port = sandbox
            .port(service)
            .ok_or_else(|| format!("sandbox {} has no {} service", sandbox_id, service))?;
        Ok(format!("http://127.0.0.1:{}{}", port, endpoint))
    }

    /// Execute a command through the sandbox shell service.
    pub async fn execute_shell(
        &self,
        sandbox_id: &str,
        command: &str,
        options: ShellOptions,
    ) -> ShellOutput {
        if let Some(reason) = policy::command_violation(command) {
            tracing::warn!(sandbox_id = %sandbox_id, reason, "shell command blocked by policy");
            return ShellOutput::failure(format!("blocked by policy: {}", reason));
        }

        let url = match self.service_url(sandbox_id, "shell", "/execute") {
            Ok(url) => url,
            Err(err) => return ShellOutput::failure(err),
        };

        let op_timeout = options.timeout.unwrap_or(Duration::from_secs(30));
        let mut body = serde_json::json!({
            "command": command,
            "timeout": op_timeout.as_millis() as u64,
        });
        if let Some(cwd) = &options.cwd {
            body["cwd"] = Value::String(cwd.clone());
        }

        let response = self
            .http
            .post(&url)
            .timeout(op_timeout + TRANSPORT_HEADROOM)
            .json(&body)
            .send()
            .await;

        parse_service_response(response, ShellOutput::failure).await
    }

    /// Read a file through the sandbox file service.
    pub async fn read_file(&self, sandbox_id: &str, path: &str) -> FileContent {
        let resolved = match policy::resolve_work_path(path) {
            Ok(resolved) => resolved,
            Err(reason) => {
                tracing::warn!(sandbox_id = %sandbox_id, path, "file read blocked by policy");
                return FileContent::failure(reason);
            }
        };
        let url = match self.service_url(sandbox_id, "file", "/read") {
            Ok(url) => url,
            Err(err) => return FileContent::failure(err),
        };

        let response = self
            .http
            .get(&url)
            .query(&[("path", resolved.as_str())])
            .timeout(Duration::from_secs(30))
            .send()
            .await;

        parse_service_response(response, FileContent::failure).await
    }

    /// Write a file through the sandbox file service. Parent directories
    /// are created by the service.
    pub async fn write_file(&self, sandbox_id: &str, path: &str, content: &str) -> FileWritten {
        let resolved = match policy::resolve_work_path(path) {
            Ok(resolved) => resolved,
            Err(reason) => {
                tracing::warn!(sandbox_id = %sandbox_id, path, "file write blocked by policy");
                return FileWritten::failure(reason);
            }
        };
        let url = match self.service_url(sandbox_id, "file", "/write") {
            Ok(url) => url,
            Err(err) => return FileWritten::failure(err),
        };

        let body = serde_json::json!({ "path": resolved, "content": content });
        let response = self
            .http
            .post(&url)
            .timeout(Duration::from_secs(30))
            .json(&body)
            .send()
            .await;

        parse_service_response(response, FileWritten::failure).await
    }

    /// List a directory through the sandbox file service.
    pub async fn list_directory(&self, sandbox_id: &str, path: Option<&str>) -> DirListing {
        let resolved = match policy::resolve_work_path(path.unwrap_or(policy::WORK_ROOT)) {
            Ok(resolved) => resolved,
            Err(reason) => {
                tracing::warn!(sandbox_id = %sandbox_id, "directory listing blocked by policy");
                return DirListing::failure(reason);
            }
        };
        let url = match self.service_url(sandbox_id, "file", "/list") {
            Ok(url) => url,
            Err(err) => return DirListing::failure(err),
        };

        let response = self
            .http
            .get(&url)
            .query(&[("path", resolved.as_str())])
            .timeout(Duration::from_secs(30))
            .send()
            .await;

        parse_service_response(response, DirListing::failure).await
    }

    /// Run a browser action through the sandbox browser service.
    pub async fn execute_browser(
        &self,
        sandbox_id: &str,
        action: &str,
        options: BrowserOptions,
    ) -> BrowserOutput {
        let url = match self.service_url(sandbox_id, "browser", "/execute") {
            Ok(url) => url,
            Err(err) => return BrowserOutput::failure(err),
        };

        let op_timeout = options.timeout.unwrap_or(Duration::from_secs(30));
        let mut body = serde_json::json!({
            "action": action,
            "timeout": op_timeout.as_millis() as u64,
        });
        if let Some(target) = &options.url {
            body["url"] = Value::String(target.clone());
        }
        if let Some(selector) = &options.selector {
            body["selector"] = Value::String(selector.clone());
        }
        if let Some(instructions) = &options.instructions {
            body["instructions"] = Value::String(instructions.clone());
        }

        let response = self
            .http
            .post(&url)
            .timeout(op_timeout + TRANSPORT_HEADROOM)
            .json(&body)
            .send()
            .await;

        match check_response(response).await {
            Ok(value) => {
                let success = value
                    .get("success")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                let error = value
                    .get("error")
                    .and_then(|v| v.as_str())
                    .map(ToString::to_string);
                BrowserOutput {
                    success,
                    data: value,
                    error,
                }
            }
            Err(err) => BrowserOutput::failure(err),
        }
    }
}

async fn check_response(
    response: Result<reqwest::Response, reqwest::Error>,
) -> Result<Value, String> {
    let response = response.map_err(|e| format!("sandbox service unreachable: {}", e))?;
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| format!("sandbox service read failed: {}", e))?;
    if !status.is_success() {
        return Err(format!("sandbox service returned {}: {}", status, text));
    }
    serde_json::from_str(&text).map_err(|e| format!("sandbox service returned invalid JSON: {}", e))
}

async fn parse_service_response<T: serde::de::DeserializeOwned>(
    response: Result<reqwest::Response, reqwest::Error>,
    failure: impl FnOnce(String) -> T,
) -> T {
    match check_response(response).await {
        Ok(value) => match serde_json::from_value(value) {
            Ok(parsed) => parsed,
            Err(err) => failure(format!("sandbox service returned unexpected shape: {}", err)),
        },
        Err(err) => failure(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::SandboxManagerConfig;

    #[test]
    fn test_blocked_command_short_circuits_before_any_lookup() {
        tokio_test::block_on(async {
            let manager = SandboxManager::new(SandboxManagerConfig::default());
            let output = manager
                .execute_shell("sb-none", "sudo rm -rf /", ShellOptions::default())
                .await;
            assert!(!output.success);
            assert!(output.error.as_deref().unwrap().contains("blocked by policy"));
        });
    }

    #[test]
    fn test_path_policy_short_circuits_file_read() {
        tokio_test::block_on(async {
            let manager = SandboxManager::new(SandboxManagerConfig::default());
            let content = manager.read_file("sb-none", "../../etc/passwd").await;
            assert!(!content.success);
            assert!(content.error.as_deref().unwrap().contains("access denied"));
        });
    }

    #[test]
    fn test_unknown_sandbox_funnels_into_failure() {
        tokio_test::block_on(async {
            let manager = SandboxManager::new(SandboxManagerConfig::default());
            let output = manager
                .execute_shell("sb-none", "ls -la", ShellOptions::default())
                .await;
            assert!(!output.success);
            assert!(output.error.as_deref().unwrap().contains("sandbox not found"));
        });
    }

    #[test]
    fn test_shell_output_parses_service_json() {
        let parsed: ShellOutput = serde_json::from_str(
            r#"{"success":true,"exitCode":0,"stdout":"hello\n","stderr":""}"#,
        )
        .unwrap();
        assert!(parsed.success);
        assert_eq!(parsed.exit_code, 0);
        assert_eq!(parsed.stdout, "hello\n");
    }

    #[test]
    fn test_dir_entry_maps_type_field() {
        let entry: DirEntry = serde_json::from_str(
            r#"{"name":"notes.txt","type":"file","size":12,"modified":"2026-08-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(entry.kind, "file");
        assert_eq!(entry.size, 12);
    }
}
