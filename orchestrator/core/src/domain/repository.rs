// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Durable Store Interfaces
//!
//! Persistence contracts for the sandbox aggregate plus the error type shared
//! by every repository in the workspace. The swarm crate defines its own
//! repository traits against the same [`RepositoryError`].
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `SandboxRepository` | `Sandbox` | `InMemorySandboxRepository` |

use async_trait::async_trait;

use crate::domain::ids::{ProjectId, SandboxId};
use crate::domain::sandbox::Sandbox;

/// Repository interface for Sandbox aggregates
#[async_trait]
pub trait SandboxRepository: Send + Sync {
    /// Save sandbox (create or update)
    async fn save(&self, sandbox: &Sandbox) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: SandboxId) -> Result<Option<Sandbox>, RepositoryError>;

    async fn find_by_project(
        &self,
        project_id: &ProjectId,
    ) -> Result<Option<Sandbox>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<Sandbox>, RepositoryError>;

    async fn delete(&self, id: SandboxId) -> Result<(), RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
