//! Worker process wiring.
//!
//! Builds the component graph from configuration: registry + canonical
//! tools over a sandbox manager, LLM planner and critic over one shared
//! client, in-memory stores and queue unless external ones are wired in
//! by the embedding process.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use overseer_config::OverseerConfig;
use overseer_core::critic::Critic;
use overseer_core::tool::ToolRegistry;
use overseer_planners::{
    HttpLlmClient, HttpLlmClientConfig, LlmClient, LlmCritic, LlmCriticConfig, LlmError,
    LlmPlanner, LlmPlannerConfig,
};
use overseer_sandbox::{ContainerSettings, SandboxManager, SandboxManagerConfig};
use overseer_stores::{BroadcastEventBus, InMemoryEventStore, InMemoryTaskStore};
use overseer_tools::register_canonical_tools;

use crate::orchestrator::{Orchestrator, OrchestratorConfig};
use crate::worker::{InMemoryTaskQueue, Worker, WorkerConfig};

/// Bootstrap errors
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("llm client error: {0}")]
    Llm(#[from] LlmError),
}

/// The assembled worker process.
pub struct Runtime {
    pub worker: Worker,
    pub queue: Arc<InMemoryTaskQueue>,
    pub sandboxes: Arc<SandboxManager>,
    pub task_store: Arc<InMemoryTaskStore>,
    pub event_store: Arc<InMemoryEventStore>,
    pub event_bus: Arc<BroadcastEventBus>,
}

/// Wire a complete worker from configuration.
pub fn bootstrap(config: &OverseerConfig) -> Result<Runtime, BootstrapError> {
    let sandboxes = Arc::new(SandboxManager::new(SandboxManagerConfig {
        container: ContainerSettings {
            image: config.sandbox.image.clone(),
            cpus: config.sandbox.cpus,
            memory: config.sandbox.memory.clone(),
            work_size: config.sandbox.work_size.clone(),
            include_browser: config.sandbox.include_browser,
        },
        build_context: config.sandbox.build_context.clone().map(Into::into),
        lifetime: Duration::from_secs(config.sandbox.lifetime_secs),
        ..SandboxManagerConfig::default()
    }));

    let mut registry = ToolRegistry::new();
    register_canonical_tools(&mut registry, sandboxes.clone());
    let registry = Arc::new(registry);

    let client: Arc<dyn LlmClient> = Arc::new(HttpLlmClient::new(HttpLlmClientConfig {
        endpoint: config.llm.endpoint.clone(),
        api_key: std::env::var(&config.llm.api_key_env).ok(),
        timeout_secs: config.llm.timeout_secs,
        ..HttpLlmClientConfig::default()
    })?);

    let planner = Arc::new(LlmPlanner::new(
        client.clone(),
        LlmPlannerConfig {
            model: config.llm.planner_model.clone(),
            ..LlmPlannerConfig::default()
        },
    ));
    let critic: Option<Arc<dyn Critic>> = if config.critic.enabled {
        Some(Arc::new(LlmCritic::new(
            client,
            LlmCriticConfig {
                model: config.llm.critic_model.clone(),
                confidence_threshold: config.critic.confidence_threshold,
                ..LlmCriticConfig::default()
            },
        )))
    } else {
        None
    };

    let task_store = Arc::new(InMemoryTaskStore::new());
    let event_store = Arc::new(InMemoryEventStore::new());
    let event_bus = Arc::new(BroadcastEventBus::default());
    let queue = Arc::new(InMemoryTaskQueue::new());

    let orchestrator = Arc::new(Orchestrator::new(
        registry,
        sandboxes.clone(),
        planner,
        critic,
        task_store.clone(),
        event_store.clone(),
        event_bus.clone(),
        OrchestratorConfig {
            step_timeout: Duration::from_secs(config.worker.step_timeout_secs),
            max_correction_rounds: config.critic.max_correction_rounds,
        },
    ));

    let worker = Worker::new(
        queue.clone(),
        orchestrator,
        task_store.clone(),
        WorkerConfig {
            concurrency: config.worker.concurrency,
            max_attempts: config.worker.max_attempts,
            ..WorkerConfig::default()
        },
    );

    Ok(Runtime {
        worker,
        queue,
        sandboxes,
        task_store,
        event_store,
        event_bus,
    })
}
