//! # Overseer Runtime
//!
//! The per-task orchestrator (planning → execution → critique loop with
//! full event recording and sandbox ownership) and the worker loop that
//! feeds it from the job queue with bounded concurrency and retry.

pub mod bootstrap;
pub mod orchestrator;
pub mod worker;

pub use bootstrap::{bootstrap, BootstrapError, Runtime};
pub use orchestrator::{
    OrchestrateError, Orchestrator, OrchestratorConfig, TaskRunOutcome,
};
pub use worker::{
    InMemoryTaskQueue, QueueError, TaskQueue, Worker, WorkerConfig, WorkerError,
};
