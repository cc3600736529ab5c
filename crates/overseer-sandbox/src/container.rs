//! Container runtime plumbing.
//!
//! The container runtime is an external collaborator driven through the
//! `docker` CLI. Argument construction and output parsing are kept as
//! pure functions so they stay testable without a daemon.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

/// Container-internal ports of the in-sandbox services.
pub const SHELL_PORT: u16 = 3001;
pub const BROWSER_PORT: u16 = 3002;
pub const FILE_PORT: u16 = 3003;

/// Container runtime errors
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("failed to spawn docker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("docker {command} exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("docker {0} timed out after {1:?}")]
    Timeout(String, Duration),
}

/// Resource and image settings applied to every sandbox container.
#[derive(Debug, Clone)]
pub struct ContainerSettings {
    /// Image to run (and to build/pull lazily if absent)
    pub image: String,
    /// CPU cap, e.g. 1.0
    pub cpus: f64,
    /// Memory cap, e.g. "512m"
    pub memory: String,
    /// Size of the writable /work tmpfs, e.g. "256m"
    pub work_size: String,
    /// Whether the image carries the browser service
    pub include_browser: bool,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            image: "overseer-sandbox:latest".to_string(),
            cpus: 1.0,
            memory: "512m".to_string(),
            work_size: "256m".to_string(),
            include_browser: true,
        }
    }
}

/// Derive the container name from a sandbox ID.
pub fn container_name(sandbox_id: &str) -> String {
    format!("overseer-sandbox-{}", sandbox_id)
}

/// Build the `docker run` argument vector for a hardened sandbox
/// container: non-root, no capabilities, no privilege escalation,
/// read-only root, tmpfs-only writable space, dynamic host ports.
pub fn run_args(name: &str, settings: &ContainerSettings) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        name.to_string(),
        "--label".to_string(),
        "overseer.sandbox=true".to_string(),
        "--cpus".to_string(),
        format!("{}", settings.cpus),
        "--memory".to_string(),
        settings.memory.clone(),
        "--cap-drop".to_string(),
        "ALL".to_string(),
        "--security-opt".to_string(),
        "no-new-privileges".to_string(),
        "--read-only".to_string(),
        "--tmpfs".to_string(),
        "/tmp".to_string(),
        "--tmpfs".to_string(),
        format!("/work:rw,size={}", settings.work_size),
        "-p".to_string(),
        format!("0:{}", SHELL_PORT),
        "-p".to_string(),
        format!("0:{}", FILE_PORT),
    ];
    if settings.include_browser {
        args.push("-p".to_string());
        args.push(format!("0:{}", BROWSER_PORT));
    }
    args.push(settings.image.clone());
    args
}

/// Parse `docker port <name>` output into a container-port → host-port map.
///
/// Lines look like `3001/tcp -> 0.0.0.0:49153`; IPv6 duplicates are
/// collapsed onto the same container port.
pub fn parse_port_map(output: &str) -> HashMap<u16, u16> {
    let mut ports = HashMap::new();
    for line in output.lines() {
        let Some((container_part, host_part)) = line.split_once("->") else {
            continue;
        };
        let Some(container_port) = container_part
            .trim()
            .split('/')
            .next()
            .and_then(|p| p.parse::<u16>().ok())
        else {
            continue;
        };
        let Some(host_port) = host_part
            .trim()
            .rsplit(':')
            .next()
            .and_then(|p| p.parse::<u16>().ok())
        else {
            continue;
        };
        ports.entry(container_port).or_insert(host_port);
    }
    ports
}

/// Run a docker subcommand, capturing stdout. Non-zero exit becomes an
/// error carrying stderr.
pub async fn docker(args: &[String], budget: Duration) -> Result<String, ContainerError> {
    let label = args.first().cloned().unwrap_or_default();
    let run = Command::new("docker")
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output();

    let output = timeout(budget, run)
        .await
        .map_err(|_| ContainerError::Timeout(label.clone(), budget))??;

    if !output.status.success() {
        return Err(ContainerError::CommandFailed {
            command: label,
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Stop then remove a container, each under a 10 second budget.
/// Used by explicit destroy, the deadline reaper, and shutdown.
pub async fn remove_container(name: &str) -> Result<(), ContainerError> {
    let stop = vec!["stop".to_string(), "-t".to_string(), "10".to_string(), name.to_string()];
    let stop_result = docker(&stop, Duration::from_secs(10)).await;
    if let Err(err) = &stop_result {
        tracing::warn!(container = %name, error = %err, "container stop failed, removing anyway");
    }

    let rm = vec!["rm".to_string(), "-f".to_string(), name.to_string()];
    docker(&rm, Duration::from_secs(10)).await.map(|_| ())
}
