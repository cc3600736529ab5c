//! EventBus - realtime event fan-out abstraction.
//!
//! EventBus complements EventStore:
//! - EventStore persists facts (journal).
//! - EventBus pushes the same facts to live subscribers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use overseer_core::store::StoreError;
use overseer_core::types::TaskEvent;

/// An event paired with its task for subscriber-side filtering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEventMessage {
    pub task_id: String,
    pub event: TaskEvent,
}

/// EventBus trait - async interface for realtime event publish/subscribe.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an event to all active subscribers.
    async fn publish(&self, message: TaskEventMessage) -> Result<(), StoreError>;

    /// Subscribe to realtime events.
    fn subscribe(&self) -> broadcast::Receiver<TaskEventMessage>;
}

/// In-process EventBus based on tokio broadcast channels.
pub struct BroadcastEventBus {
    tx: broadcast::Sender<TaskEventMessage>,
    capacity: usize,
}

impl BroadcastEventBus {
    /// Create a new broadcast bus with channel capacity.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Return the configured channel capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        // Default capacity for local realtime consumers.
        Self::new(1024)
    }
}

#[async_trait]
impl EventBus for BroadcastEventBus {
    async fn publish(&self, message: TaskEventMessage) -> Result<(), StoreError> {
        // Ignore "no receiver" as a non-error; journal remains source-of-truth.
        match self.tx.send(message) {
            Ok(_) => Ok(()),
            Err(broadcast::error::SendError(_)) => Ok(()),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<TaskEventMessage> {
        self.tx.subscribe()
    }
}
