//! Sandbox lifecycle management.
//!
//! One sandbox per task. The orchestrator that created a sandbox owns it
//! exclusively; the manager's table is merely a lookup. Entry removal
//! always precedes the destructive container call, so a crashed destroy
//! cannot cause a double-free.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::container::{
    self, container_name, ContainerError, ContainerSettings, BROWSER_PORT, FILE_PORT, SHELL_PORT,
};

/// Sandbox lifecycle errors
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("container runtime error: {0}")]
    Container(#[from] ContainerError),

    #[error("sandbox not found: {0}")]
    NotFound(String),

    #[error("sandbox already exists: {0}")]
    AlreadyExists(String),

    #[error("sandbox services never became healthy: {0}")]
    Unhealthy(String),

    #[error("port discovery failed: {0}")]
    PortDiscovery(String),

    #[error("sandbox creation cancelled")]
    Cancelled,

    #[error("sandbox teardown failed: {0}")]
    Teardown(String),
}

/// Sandbox status
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxStatus {
    Creating,
    Running,
    Stopped,
    Error,
}

/// A live isolated execution environment
#[derive(Debug, Clone)]
pub struct Sandbox {
    /// Sandbox ID (derived from the task ID)
    pub id: String,
    /// Backing container name
    pub container_id: String,
    /// Current status
    pub status: SandboxStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Logical service name → host port
    pub ports: HashMap<String, u16>,
    /// Scheduled destruction deadline
    pub destroy_deadline: DateTime<Utc>,
}

impl Sandbox {
    /// Host port of a logical service
    pub fn port(&self, service: &str) -> Option<u16> {
        self.ports.get(service).copied()
    }
}

/// Manager configuration
#[derive(Debug, Clone)]
pub struct SandboxManagerConfig {
    /// Container image and resource settings
    pub container: ContainerSettings,
    /// Build context used to build the image lazily when it is absent;
    /// when unset, a missing image is pulled instead.
    pub build_context: Option<PathBuf>,
    /// Lifetime before the deferred destroy fires
    pub lifetime: Duration,
    /// Health probe attempts (one per interval)
    pub health_attempts: u32,
    /// Interval between health probe rounds
    pub health_interval: Duration,
}

impl Default for SandboxManagerConfig {
    fn default() -> Self {
        Self {
            container: ContainerSettings::default(),
            build_context: None,
            lifetime: Duration::from_secs(3_600),
            health_attempts: 30,
            health_interval: Duration::from_secs(1),
        }
    }
}

struct SandboxEntry {
    sandbox: Sandbox,
    reaper: CancellationToken,
}

type SandboxTable = Arc<Mutex<HashMap<String, SandboxEntry>>>;

/// Creates, tracks, and destroys sandboxes. Shared across all tasks of a
/// worker process; safe under concurrent mutation.
pub struct SandboxManager {
    config: SandboxManagerConfig,
    pub(crate) http: reqwest::Client,
    entries: SandboxTable,
    image_ready: tokio::sync::Mutex<bool>,
}

/// Lifecycle seam consumed by the orchestrator; mockable in tests.
#[async_trait]
pub trait SandboxLifecycle: Send + Sync {
    /// Create a sandbox for a task. Fatal on health-probe exhaustion.
    async fn create(
        &self,
        sandbox_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Sandbox, SandboxError>;

    /// Destroy a sandbox. Returns false when the ID was unknown
    /// (idempotent no-op). The lookup entry is removed even when the
    /// container teardown fails.
    async fn destroy(&self, sandbox_id: &str) -> Result<bool, SandboxError>;
}

impl SandboxManager {
    /// Create a manager with the given configuration
    pub fn new(config: SandboxManagerConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            entries: Arc::new(Mutex::new(HashMap::new())),
            image_ready: tokio::sync::Mutex::new(false),
        }
    }

    /// Look up a live sandbox
    pub fn get(&self, sandbox_id: &str) -> Option<Sandbox> {
        self.entries
            .lock()
            .expect("sandbox table poisoned")
            .get(sandbox_id)
            .map(|entry| entry.sandbox.clone())
    }

    /// Number of live sandboxes
    pub fn live_count(&self) -> usize {
        self.entries.lock().expect("sandbox table poisoned").len()
    }

    /// Destroy every live sandbox concurrently. Called on worker
    /// shutdown; failures are logged, not re-raised.
    pub async fn shutdown(&self) {
        let drained: Vec<SandboxEntry> = {
            let mut entries = self.entries.lock().expect("sandbox table poisoned");
            entries.drain().map(|(_, entry)| entry).collect()
        };
        if drained.is_empty() {
            return;
        }
        tracing::info!(count = drained.len(), "destroying all live sandboxes");

        let mut set = tokio::task::JoinSet::new();
        for entry in drained {
            entry.reaper.cancel();
            let name = entry.sandbox.container_id.clone();
            set.spawn(async move { (name.clone(), container::remove_container(&name).await) });
        }
        while let Some(joined) = set.join_next().await {
            if let Ok((name, Err(err))) = joined {
                tracing::warn!(container = %name, error = %err, "sandbox teardown failed during shutdown");
            }
        }
    }

    /// Ensure the sandbox image exists, building or pulling it at most
    /// once per process.
    async fn ensure_image(&self) -> Result<(), SandboxError> {
        let mut ready = self.image_ready.lock().await;
        if *ready {
            return Ok(());
        }

        let image = &self.config.container.image;
        let inspect = vec!["image".to_string(), "inspect".to_string(), image.clone()];
        if container::docker(&inspect, Duration::from_secs(30)).await.is_ok() {
            *ready = true;
            return Ok(());
        }

        match &self.config.build_context {
            Some(context) => {
                tracing::info!(image = %image, context = %context.display(), "building sandbox image");
                let build = vec![
                    "build".to_string(),
                    "-t".to_string(),
                    image.clone(),
                    context.display().to_string(),
                ];
                container::docker(&build, Duration::from_secs(600)).await?;
            }
            None => {
                tracing::info!(image = %image, "pulling sandbox image");
                let pull = vec!["pull".to_string(), image.clone()];
                container::docker(&pull, Duration::from_secs(600)).await?;
            }
        }
        *ready = true;
        Ok(())
    }

    /// Probe every service's /health endpoint until all respond or the
    /// retry budget is exhausted.
    async fn await_healthy(
        &self,
        sandbox: &Sandbox,
        cancel: &CancellationToken,
    ) -> Result<(), SandboxError> {
        for attempt in 0..self.config.health_attempts {
            if self.probe_all(sandbox).await {
                tracing::debug!(sandbox_id = %sandbox.id, attempt, "sandbox services healthy");
                return Ok(());
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(SandboxError::Cancelled),
                _ = tokio::time::sleep(self.config.health_interval) => {}
            }
        }
        Err(SandboxError::Unhealthy(format!(
            "{} probe rounds exhausted",
            self.config.health_attempts
        )))
    }

    async fn probe_all(&self, sandbox: &Sandbox) -> bool {
        for port in sandbox.ports.values() {
            let url = format!("http://127.0.0.1:{}/health", port);
            let healthy = self
                .http
                .get(&url)
                .timeout(Duration::from_secs(2))
                .send()
                .await
                .map(|resp| resp.status().is_success())
                .unwrap_or(false);
            if !healthy {
                return false;
            }
        }
        true
    }

    fn service_ports(
        &self,
        raw: &HashMap<u16, u16>,
    ) -> Result<HashMap<String, u16>, SandboxError> {
        let mut ports = HashMap::new();
        let shell = raw
            .get(&SHELL_PORT)
            .ok_or_else(|| SandboxError::PortDiscovery("shell port not bound".to_string()))?;
        let file = raw
            .get(&FILE_PORT)
            .ok_or_else(|| SandboxError::PortDiscovery("file port not bound".to_string()))?;
        ports.insert("shell".to_string(), *shell);
        ports.insert("file".to_string(), *file);
        if self.config.container.include_browser {
            let browser = raw
                .get(&BROWSER_PORT)
                .ok_or_else(|| SandboxError::PortDiscovery("browser port not bound".to_string()))?;
            ports.insert("browser".to_string(), *browser);
        }
        Ok(ports)
    }

    /// Arm the one-shot deferred destroy for a sandbox. The explicit
    /// destroy path cancels the token, disarming the reaper.
    fn arm_reaper(&self, sandbox_id: String, container: String, token: CancellationToken) {
        let entries = self.entries.clone();
        let lifetime = self.config.lifetime;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(lifetime) => {
                    let removed = entries
                        .lock()
                        .expect("sandbox table poisoned")
                        .remove(&sandbox_id)
                        .is_some();
                    if removed {
                        tracing::warn!(sandbox_id = %sandbox_id, "sandbox lifetime expired, destroying");
                        if let Err(err) = container::remove_container(&container).await {
                            tracing::warn!(sandbox_id = %sandbox_id, error = %err, "deadline teardown failed");
                        }
                    }
                }
            }
        });
    }

    /// Best-effort teardown of a partially created container.
    async fn teardown_partial(&self, name: &str) {
        if let Err(err) = container::remove_container(name).await {
            tracing::warn!(container = %name, error = %err, "partial container teardown failed");
        }
    }
}

#[async_trait]
impl SandboxLifecycle for SandboxManager {
    async fn create(
        &self,
        sandbox_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Sandbox, SandboxError> {
        {
            let entries = self.entries.lock().expect("sandbox table poisoned");
            if entries.contains_key(sandbox_id) {
                return Err(SandboxError::AlreadyExists(sandbox_id.to_string()));
            }
        }
        if cancel.is_cancelled() {
            return Err(SandboxError::Cancelled);
        }

        self.ensure_image().await?;

        let name = container_name(sandbox_id);
        // Reap any stale container left behind by a crashed worker.
        let reap = vec!["rm".to_string(), "-f".to_string(), name.clone()];
        let _ = container::docker(&reap, Duration::from_secs(10)).await;

        let args = container::run_args(&name, &self.config.container);
        container::docker(&args, Duration::from_secs(60)).await?;

        let port_args = vec!["port".to_string(), name.clone()];
        let port_output = container::docker(&port_args, Duration::from_secs(10)).await?;
        let ports = match self.service_ports(&container::parse_port_map(&port_output)) {
            Ok(ports) => ports,
            Err(err) => {
                self.teardown_partial(&name).await;
                return Err(err);
            }
        };

        let now = Utc::now();
        let sandbox = Sandbox {
            id: sandbox_id.to_string(),
            container_id: name.clone(),
            status: SandboxStatus::Creating,
            created_at: now,
            ports,
            destroy_deadline: now
                + chrono::Duration::from_std(self.config.lifetime)
                    .unwrap_or_else(|_| chrono::Duration::hours(1)),
        };

        if let Err(err) = self.await_healthy(&sandbox, cancel).await {
            self.teardown_partial(&name).await;
            return Err(err);
        }

        let sandbox = Sandbox {
            status: SandboxStatus::Running,
            ..sandbox
        };
        let reaper = CancellationToken::new();
        self.arm_reaper(sandbox_id.to_string(), name, reaper.clone());
        {
            let mut entries = self.entries.lock().expect("sandbox table poisoned");
            entries.insert(
                sandbox_id.to_string(),
                SandboxEntry {
                    sandbox: sandbox.clone(),
                    reaper,
                },
            );
        }
        tracing::info!(sandbox_id = %sandbox_id, ports = ?sandbox.ports, "sandbox created");
        Ok(sandbox)
    }

    async fn destroy(&self, sandbox_id: &str) -> Result<bool, SandboxError> {
        // Remove the lookup entry first: a failed container call must not
        // leave a destroyable entry behind.
        let entry = {
            let mut entries = self.entries.lock().expect("sandbox table poisoned");
            entries.remove(sandbox_id)
        };
        let Some(entry) = entry else {
            tracing::warn!(sandbox_id = %sandbox_id, "destroy of unknown sandbox ignored");
            return Ok(false);
        };
        entry.reaper.cancel();

        container::remove_container(&entry.sandbox.container_id)
            .await
            .map_err(|err| SandboxError::Teardown(err.to_string()))?;
        tracing::info!(sandbox_id = %sandbox_id, "sandbox destroyed");
        Ok(true)
    }
}
