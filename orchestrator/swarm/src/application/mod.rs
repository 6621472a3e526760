// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod coordinator;
pub mod memory_store;
pub mod memory_sweeper;
pub mod scheduler;

pub use coordinator::{
    CoordinatorConfig, CreateSwarmRequest, SpawnAgentRequest, StandardSwarmCoordinator,
    SwarmCoordinator, SwarmStatusReport,
};
pub use memory_store::MemoryStore;
pub use memory_sweeper::{MemorySweeper, MemorySweeperConfig};
pub use scheduler::{dispatch_cycle, Assignment, SwarmState};

use hive_core::domain::repository::RepositoryError;
use hive_core::{OrchestratorError, OrchestratorResult};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Upper bound on any single durable-store call.
pub const STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Await a store call on `target`, failing with `StoreFailure` once it
/// exceeds [`STORE_TIMEOUT`].
pub(crate) async fn bounded<T>(
    operation: &'static str,
    target: impl Display,
    call: impl Future<Output = Result<T, RepositoryError>>,
) -> OrchestratorResult<T> {
    let source = match tokio::time::timeout(STORE_TIMEOUT, call).await {
        Ok(Ok(value)) => return Ok(value),
        Ok(Err(e)) => e,
        Err(_) => RepositoryError::Backend(format!(
            "{} timed out after {}s",
            operation,
            STORE_TIMEOUT.as_secs()
        )),
    };
    Err(OrchestratorError::store(target, source))
}
