//! EventStore in-memory implementation.
//!
//! Used for:
//! - Historical playback of a task's transitions
//! - Debug / audit
//! - Test assertions on orchestrator behavior

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use overseer_core::store::{EventStore, StoreError};
use overseer_core::types::TaskEvent;

const DEFAULT_IN_MEMORY_EVENT_LIMIT: usize = 20_000;

/// In-memory implementation for development and testing.
///
/// Appends preserve per-task order; the capacity bound applies to the
/// total event count across tasks, evicting whole oldest-task logs.
pub struct InMemoryEventStore {
    logs: RwLock<HashMap<String, Vec<TaskEvent>>>,
    arrival: RwLock<Vec<String>>,
    max_events: usize,
}

impl InMemoryEventStore {
    /// Create a new in-memory event store
    pub fn new() -> Self {
        Self::with_max_events(DEFAULT_IN_MEMORY_EVENT_LIMIT)
    }

    /// Create an in-memory event store with a hard capacity limit.
    pub fn with_max_events(max_events: usize) -> Self {
        Self {
            logs: RwLock::new(HashMap::new()),
            arrival: RwLock::new(Vec::new()),
            max_events: max_events.max(1),
        }
    }

    fn total(logs: &HashMap<String, Vec<TaskEvent>>) -> usize {
        logs.values().map(Vec::len).sum()
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, task_id: &str, event: TaskEvent) -> Result<(), StoreError> {
        let mut logs = self
            .logs
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        let mut arrival = self
            .arrival
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        while Self::total(&logs) >= self.max_events && !arrival.is_empty() {
            let victim = arrival.remove(0);
            logs.remove(&victim);
        }

        let log = logs.entry(task_id.to_string()).or_default();
        if log.is_empty() {
            arrival.push(task_id.to_string());
        }
        log.push(event);
        Ok(())
    }

    async fn list(&self, task_id: &str) -> Result<Vec<TaskEvent>, StoreError> {
        let logs = self
            .logs
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(logs.get(task_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overseer_core::types::TaskEventKind;
    use serde_json::json;

    #[test]
    fn test_append_preserves_per_task_order() {
        tokio_test::block_on(async {
            let store = InMemoryEventStore::new();
            store
                .append("t1", TaskEvent::new(TaskEventKind::TaskStarted, json!({})))
                .await
                .unwrap();
            store
                .append(
                    "t1",
                    TaskEvent::new(TaskEventKind::SandboxCreated, json!({"ports": {}})),
                )
                .await
                .unwrap();
            store
                .append("t1", TaskEvent::tag(TaskEventKind::PlanningStarted))
                .await
                .unwrap();

            let log = store.list("t1").await.unwrap();
            let kinds: Vec<_> = log.iter().map(|e| e.kind).collect();
            assert_eq!(
                kinds,
                vec![
                    TaskEventKind::TaskStarted,
                    TaskEventKind::SandboxCreated,
                    TaskEventKind::PlanningStarted
                ]
            );
        });
    }

    #[test]
    fn test_capacity_evicts_oldest_task_log() {
        tokio_test::block_on(async {
            let store = InMemoryEventStore::with_max_events(2);
            store
                .append("t1", TaskEvent::tag(TaskEventKind::TaskStarted))
                .await
                .unwrap();
            store
                .append("t1", TaskEvent::tag(TaskEventKind::PlanningStarted))
                .await
                .unwrap();
            store
                .append("t2", TaskEvent::tag(TaskEventKind::TaskStarted))
                .await
                .unwrap();

            assert!(store.list("t1").await.unwrap().is_empty());
            assert_eq!(store.list("t2").await.unwrap().len(), 1);
        });
    }
}
