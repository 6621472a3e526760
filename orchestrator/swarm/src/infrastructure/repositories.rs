// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0

//! In-memory implementations of the swarm store interfaces.
//!
//! Record stores are `RwLock<HashMap>`; the memory store is a `DashMap` so
//! that the TTL sweep only ever locks the shard of the entry it removes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hive_core::domain::repository::RepositoryError;
use hive_core::{AgentId, SwarmId, TaskId};
use parking_lot::RwLock;

use crate::domain::agent::Agent;
use crate::domain::memory::{MemoryEntry, MemoryKey};
use crate::domain::repository::{AgentRepository, MemoryRepository, SwarmRepository, TaskRepository};
use crate::domain::swarm::Swarm;
use crate::domain::task::Task;

#[derive(Clone, Default)]
pub struct InMemorySwarmRepository {
    swarms: Arc<RwLock<HashMap<SwarmId, Swarm>>>,
}

impl InMemorySwarmRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SwarmRepository for InMemorySwarmRepository {
    async fn save(&self, swarm: &Swarm) -> Result<(), RepositoryError> {
        self.swarms.write().insert(swarm.id, swarm.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: SwarmId) -> Result<Option<Swarm>, RepositoryError> {
        Ok(self.swarms.read().get(&id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Swarm>, RepositoryError> {
        Ok(self.swarms.read().values().cloned().collect())
    }

    async fn delete(&self, id: SwarmId) -> Result<(), RepositoryError> {
        self.swarms.write().remove(&id);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryAgentRepository {
    agents: Arc<RwLock<HashMap<AgentId, Agent>>>,
}

impl InMemoryAgentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentRepository for InMemoryAgentRepository {
    async fn save(&self, agent: &Agent) -> Result<(), RepositoryError> {
        self.agents.write().insert(agent.id, agent.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: AgentId) -> Result<Option<Agent>, RepositoryError> {
        Ok(self.agents.read().get(&id).cloned())
    }

    async fn find_by_swarm(&self, swarm_id: SwarmId) -> Result<Vec<Agent>, RepositoryError> {
        Ok(self
            .agents
            .read()
            .values()
            .filter(|a| a.swarm_id == swarm_id)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: AgentId) -> Result<(), RepositoryError> {
        self.agents.write().remove(&id);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryTaskRepository {
    tasks: Arc<RwLock<HashMap<TaskId, Task>>>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn save(&self, task: &Task) -> Result<(), RepositoryError> {
        self.tasks.write().insert(task.id, task.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: TaskId) -> Result<Option<Task>, RepositoryError> {
        Ok(self.tasks.read().get(&id).cloned())
    }

    async fn find_by_swarm(&self, swarm_id: SwarmId) -> Result<Vec<Task>, RepositoryError> {
        let mut tasks: Vec<Task> = self
            .tasks
            .read()
            .values()
            .filter(|t| t.swarm_id == swarm_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.sequence);
        Ok(tasks)
    }

    async fn delete(&self, id: TaskId) -> Result<(), RepositoryError> {
        self.tasks.write().remove(&id);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryMemoryRepository {
    entries: Arc<DashMap<MemoryKey, MemoryEntry>>,
}

impl InMemoryMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl MemoryRepository for InMemoryMemoryRepository {
    async fn put(&self, entry: MemoryEntry) -> Result<(), RepositoryError> {
        self.entries.insert(entry.memory_key(), entry);
        Ok(())
    }

    async fn get(&self, key: &MemoryKey) -> Result<Option<MemoryEntry>, RepositoryError> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    async fn record_access(
        &self,
        key: &MemoryKey,
        now: DateTime<Utc>,
    ) -> Result<Option<MemoryEntry>, RepositoryError> {
        Ok(self.entries.get_mut(key).map(|mut entry| {
            entry.access_count += 1;
            entry.updated_at = now;
            entry.value().clone()
        }))
    }

    async fn delete(&self, key: &MemoryKey) -> Result<bool, RepositoryError> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn delete_if_expired(
        &self,
        key: &MemoryKey,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        Ok(self.entries.remove_if(key, |_, entry| entry.is_expired(now)).is_some())
    }

    async fn list_by_namespace(
        &self,
        swarm_id: SwarmId,
        namespace: &str,
    ) -> Result<Vec<MemoryEntry>, RepositoryError> {
        let mut entries: Vec<MemoryEntry> = self
            .entries
            .iter()
            .filter(|e| e.swarm_id == swarm_id && e.namespace == namespace)
            .map(|e| e.value().clone())
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<MemoryKey>, RepositoryError> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.is_expired(now))
            .map(|e| e.key().clone())
            .collect())
    }
}
