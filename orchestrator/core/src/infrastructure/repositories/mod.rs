// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the store interfaces defined in the
//! domain layer. The engine only depends on the traits; the in-memory
//! variant backs the daemon and the tests.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve domain aggregates
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::ids::{ProjectId, SandboxId};
use crate::domain::repository::{RepositoryError, SandboxRepository};
use crate::domain::sandbox::Sandbox;

#[derive(Clone, Default)]
pub struct InMemorySandboxRepository {
    sandboxes: Arc<RwLock<HashMap<SandboxId, Sandbox>>>,
}

impl InMemorySandboxRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SandboxRepository for InMemorySandboxRepository {
    async fn save(&self, sandbox: &Sandbox) -> Result<(), RepositoryError> {
        self.sandboxes.write().insert(sandbox.id, sandbox.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: SandboxId) -> Result<Option<Sandbox>, RepositoryError> {
        Ok(self.sandboxes.read().get(&id).cloned())
    }

    async fn find_by_project(
        &self,
        project_id: &ProjectId,
    ) -> Result<Option<Sandbox>, RepositoryError> {
        let sandboxes = self.sandboxes.read();
        Ok(sandboxes.values().find(|s| &s.project_id == project_id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Sandbox>, RepositoryError> {
        Ok(self.sandboxes.read().values().cloned().collect())
    }

    async fn delete(&self, id: SandboxId) -> Result<(), RepositoryError> {
        self.sandboxes
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }
}
