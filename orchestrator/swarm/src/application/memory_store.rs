// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Memory Store
//!
//! Namespaced key/value memory shared by the agents of a swarm. Entries may
//! carry a TTL; an expired entry reads as not found and is evicted on the
//! spot, and [`MemoryStore::sweep`] evicts the rest in the background.

use std::sync::Arc;

use chrono::Utc;
use hive_core::domain::events::MemoryEvent;
use hive_core::infrastructure::event_bus::EventBus;
use hive_core::{Clock, OrchestratorError, OrchestratorResult, SwarmId};
use metrics::counter;
use tracing::{debug, info};

use crate::application::bounded;
use crate::domain::memory::{MemoryEntry, MemoryKey};
use crate::domain::repository::MemoryRepository;

pub struct MemoryStore {
    repository: Arc<dyn MemoryRepository>,
    clock: Arc<dyn Clock>,
    event_bus: Arc<EventBus>,
}

impl MemoryStore {
    pub fn new(
        repository: Arc<dyn MemoryRepository>,
        clock: Arc<dyn Clock>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            repository,
            clock,
            event_bus,
        }
    }

    /// Store `value`, replacing any previous value for the same key and
    /// restarting its TTL.
    pub async fn put(
        &self,
        key: MemoryKey,
        value: serde_json::Value,
        ttl_seconds: Option<u64>,
    ) -> OrchestratorResult<MemoryEntry> {
        if key.key.trim().is_empty() {
            return Err(OrchestratorError::InvalidConfiguration(
                "memory key cannot be empty".to_string(),
            ));
        }
        if ttl_seconds == Some(0) {
            return Err(OrchestratorError::InvalidConfiguration(format!(
                "ttl for {} must be greater than zero",
                key
            )));
        }

        let entry = MemoryEntry::new(key, value, ttl_seconds, self.clock.now());
        bounded("memory put", entry.memory_key(), self.repository.put(entry.clone())).await?;
        debug!(key = %entry.memory_key(), ttl_seconds = ?ttl_seconds, "Stored memory entry");
        Ok(entry)
    }

    pub async fn get(&self, key: &MemoryKey) -> OrchestratorResult<MemoryEntry> {
        let now = self.clock.now();
        let entry = bounded("memory get", key, self.repository.record_access(key, now))
            .await?
            .ok_or_else(|| OrchestratorError::not_found("Memory entry", key))?;

        if entry.is_expired(now) {
            if bounded("memory evict", key, self.repository.delete_if_expired(key, now)).await? {
                counter!("hive_memory_entries_evicted_total").increment(1);
                debug!(%key, "Evicted expired memory entry on read");
            }
            return Err(OrchestratorError::not_found("Memory entry", key));
        }

        Ok(entry)
    }

    /// Returns whether an entry was removed.
    pub async fn delete(&self, key: &MemoryKey) -> OrchestratorResult<bool> {
        bounded("memory delete", key, self.repository.delete(key)).await
    }

    /// Live entries of one namespace, ordered by key.
    pub async fn list_by_namespace(
        &self,
        swarm_id: SwarmId,
        namespace: &str,
    ) -> OrchestratorResult<Vec<MemoryEntry>> {
        let now = self.clock.now();
        let entries = bounded(
            "memory list",
            format!("memory {}/{}", swarm_id, namespace),
            self.repository.list_by_namespace(swarm_id, namespace),
        )
        .await?;
        Ok(entries.into_iter().filter(|e| !e.is_expired(now)).collect())
    }

    /// Evict every expired entry, one at a time. Returns the count.
    pub async fn sweep(&self) -> OrchestratorResult<usize> {
        let now = self.clock.now();
        let expired =
            bounded("memory sweep", "expired memory", self.repository.list_expired(now)).await?;

        let mut evicted = 0;
        for key in expired {
            if bounded("memory evict", &key, self.repository.delete_if_expired(&key, now)).await? {
                evicted += 1;
            }
        }

        if evicted > 0 {
            counter!("hive_memory_entries_evicted_total").increment(evicted as u64);
            self.event_bus.publish_memory_event(MemoryEvent::EntriesEvicted {
                count: evicted,
                evicted_at: Utc::now(),
            });
            info!(evicted, "Swept expired memory entries");
        }
        Ok(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::InMemoryMemoryRepository;
    use chrono::Duration;
    use hive_core::ManualClock;
    use serde_json::json;

    fn store() -> (MemoryStore, Arc<ManualClock>, Arc<InMemoryMemoryRepository>) {
        let clock = Arc::new(ManualClock::default());
        let repository = Arc::new(InMemoryMemoryRepository::new());
        let event_bus = Arc::new(EventBus::with_default_capacity());
        let store = MemoryStore::new(repository.clone(), clock.clone(), event_bus);
        (store, clock, repository)
    }

    #[tokio::test]
    async fn test_round_trip_then_expiry() {
        let (store, clock, repository) = store();
        let key = MemoryKey::new(SwarmId::new(), Some("research"), "findings");

        store.put(key.clone(), json!({"papers": 3}), Some(60)).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap().value, json!({"papers": 3}));

        clock.advance(Duration::seconds(60));
        assert!(store.get(&key).await.is_ok());

        clock.advance(Duration::seconds(1));
        let err = store.get(&key).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
        assert!(repository.is_empty());
    }

    #[tokio::test]
    async fn test_put_overwrites_and_restarts_ttl() {
        let (store, clock, _) = store();
        let key = MemoryKey::new(SwarmId::new(), None, "k");

        store.put(key.clone(), json!(1), Some(10)).await.unwrap();
        clock.advance(Duration::seconds(8));
        store.put(key.clone(), json!(2), Some(10)).await.unwrap();
        clock.advance(Duration::seconds(8));

        let entry = store.get(&key).await.unwrap();
        assert_eq!(entry.value, json!(2));
        assert_eq!(entry.access_count, 1);
    }

    #[tokio::test]
    async fn test_sweep_evicts_only_expired_entries() {
        let (store, clock, repository) = store();
        let swarm = SwarmId::new();
        store.put(MemoryKey::new(swarm, None, "short"), json!(1), Some(5)).await.unwrap();
        store.put(MemoryKey::new(swarm, None, "long"), json!(2), Some(500)).await.unwrap();
        store.put(MemoryKey::new(swarm, None, "forever"), json!(3), None).await.unwrap();

        clock.advance(Duration::seconds(6));
        assert_eq!(store.sweep().await.unwrap(), 1);
        assert_eq!(repository.len(), 2);
        assert_eq!(store.sweep().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_namespace_listing_hides_expired() {
        let (store, clock, _) = store();
        let swarm = SwarmId::new();
        store.put(MemoryKey::new(swarm, Some("ns"), "a"), json!(1), Some(1)).await.unwrap();
        store.put(MemoryKey::new(swarm, Some("ns"), "b"), json!(2), None).await.unwrap();
        store.put(MemoryKey::new(swarm, Some("other"), "c"), json!(3), None).await.unwrap();

        clock.advance(Duration::seconds(2));
        let keys: Vec<String> = store
            .list_by_namespace(swarm, "ns")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.key)
            .collect();
        assert_eq!(keys, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_zero_ttl_is_rejected() {
        let (store, _, _) = store();
        let err = store
            .put(MemoryKey::new(SwarmId::new(), None, "k"), json!(1), Some(0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_configuration");
    }
}
