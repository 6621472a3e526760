// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Durable Store Interfaces
//!
//! | Trait | Aggregate |
//! |-------|-----------|
//! | `SwarmRepository` | `Swarm` |
//! | `AgentRepository` | `Agent` |
//! | `TaskRepository` | `Task` |
//! | `MemoryRepository` | `MemoryEntry` (key/value with TTL) |
//!
//! All share [`RepositoryError`] with the sandbox store so that `?` lifts
//! every store failure into `OrchestratorError::StoreFailure`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hive_core::domain::repository::RepositoryError;
use hive_core::{AgentId, SwarmId, TaskId};

use crate::domain::agent::Agent;
use crate::domain::memory::{MemoryEntry, MemoryKey};
use crate::domain::swarm::Swarm;
use crate::domain::task::Task;

#[async_trait]
pub trait SwarmRepository: Send + Sync {
    async fn save(&self, swarm: &Swarm) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: SwarmId) -> Result<Option<Swarm>, RepositoryError>;
    async fn list_all(&self) -> Result<Vec<Swarm>, RepositoryError>;
    async fn delete(&self, id: SwarmId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait AgentRepository: Send + Sync {
    async fn save(&self, agent: &Agent) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: AgentId) -> Result<Option<Agent>, RepositoryError>;
    async fn find_by_swarm(&self, swarm_id: SwarmId) -> Result<Vec<Agent>, RepositoryError>;
    async fn delete(&self, id: AgentId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn save(&self, task: &Task) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: TaskId) -> Result<Option<Task>, RepositoryError>;
    async fn find_by_swarm(&self, swarm_id: SwarmId) -> Result<Vec<Task>, RepositoryError>;
    async fn delete(&self, id: TaskId) -> Result<(), RepositoryError>;
}

/// Key/value store for memory entries. Expiry policy lives in the memory
/// store service; the repository only offers the primitives it needs.
#[async_trait]
pub trait MemoryRepository: Send + Sync {
    /// Insert or overwrite the entry for its key.
    async fn put(&self, entry: MemoryEntry) -> Result<(), RepositoryError>;

    async fn get(&self, key: &MemoryKey) -> Result<Option<MemoryEntry>, RepositoryError>;

    /// Bump `access_count`/`updated_at` and return the updated entry.
    async fn record_access(
        &self,
        key: &MemoryKey,
        now: DateTime<Utc>,
    ) -> Result<Option<MemoryEntry>, RepositoryError>;

    /// Returns whether an entry was removed.
    async fn delete(&self, key: &MemoryKey) -> Result<bool, RepositoryError>;

    /// Remove the entry only if it is still expired at `now`, so that a
    /// concurrent overwrite is never lost.
    async fn delete_if_expired(
        &self,
        key: &MemoryKey,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    async fn list_by_namespace(
        &self,
        swarm_id: SwarmId,
        namespace: &str,
    ) -> Result<Vec<MemoryEntry>, RepositoryError>;

    /// Keys of every entry expired at `now`.
    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<MemoryKey>, RepositoryError>;
}
