// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Engine Error Kinds
//!
//! Every public operation of the engine fails with an [`OrchestratorError`].
//! Variants carry the id(s) of the entities involved so that a caller can act
//! on the failure without parsing the message.
//!
//! | Kind | Retried internally |
//! |------|--------------------|
//! | `NotFound`, `InvalidConfiguration`, `InvalidTransition`, `InvalidState` | never |
//! | `CapacityExceeded`, `AgentBusy`, `AlreadyExists`, `OperationInProgress` | never |
//! | `PoolExhausted`, `InvalidPort` | never |
//! | `RuntimeFailure` | once, during sandbox start |
//! | `StoreFailure` | never |

use chrono::{DateTime, Utc};

use crate::domain::ids::{AgentId, SandboxId, SwarmId, TaskId};
use crate::domain::repository::RepositoryError;
use crate::domain::runtime::RuntimeError;

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("{entity} {id} cannot transition from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    #[error("{entity} {id} is {state}; {operation} is not allowed")]
    InvalidState {
        entity: &'static str,
        id: String,
        state: String,
        operation: &'static str,
    },

    #[error("Swarm {swarm_id} is at capacity ({max_agents} agents)")]
    CapacityExceeded { swarm_id: SwarmId, max_agents: u32 },

    #[error("Agent {agent_id} is busy with task {task_id:?}")]
    AgentBusy {
        agent_id: AgentId,
        task_id: Option<TaskId>,
    },

    #[error("Port pool is exhausted ({size} ports from {base})")]
    PoolExhausted { base: u16, size: u16 },

    #[error("Port {port} is outside the pool ({size} ports from {base})")]
    InvalidPort { port: u16, base: u16, size: u16 },

    #[error("{entity} {id} already exists")]
    AlreadyExists { entity: &'static str, id: String },

    #[error("Sandbox {sandbox_id} has a {operation} operation in progress since {started_at}")]
    OperationInProgress {
        sandbox_id: SandboxId,
        operation: String,
        started_at: DateTime<Utc>,
    },

    #[error("Container runtime failure for {target}: {source}")]
    RuntimeFailure {
        target: String,
        #[source]
        source: RuntimeError,
    },

    #[error("Store failure for {target}: {source}")]
    StoreFailure {
        target: String,
        #[source]
        source: RepositoryError,
    },
}

impl OrchestratorError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn runtime(target: impl ToString, source: RuntimeError) -> Self {
        Self::RuntimeFailure {
            target: target.to_string(),
            source,
        }
    }

    pub fn store(target: impl ToString, source: RepositoryError) -> Self {
        Self::StoreFailure {
            target: target.to_string(),
            source,
        }
    }

    /// Stable snake_case name of the error kind, used on the wire and in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::InvalidConfiguration(_) => "invalid_configuration",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::InvalidState { .. } => "invalid_state",
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::AgentBusy { .. } => "agent_busy",
            Self::PoolExhausted { .. } => "pool_exhausted",
            Self::InvalidPort { .. } => "invalid_port",
            Self::AlreadyExists { .. } => "already_exists",
            Self::OperationInProgress { .. } => "operation_in_progress",
            Self::RuntimeFailure { .. } => "runtime_failure",
            Self::StoreFailure { .. } => "store_failure",
        }
    }
}

impl From<RepositoryError> for OrchestratorError {
    fn from(source: RepositoryError) -> Self {
        Self::store("durable store", source)
    }
}

impl From<RuntimeError> for OrchestratorError {
    fn from(source: RuntimeError) -> Self {
        Self::runtime("container runtime", source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_entity_ids() {
        let swarm_id = SwarmId::new();
        let err = OrchestratorError::not_found("Swarm", swarm_id);
        assert_eq!(err.kind(), "not_found");
        assert!(err.to_string().contains(&swarm_id.to_string()));

        let err = OrchestratorError::PoolExhausted { base: 8010, size: 80 };
        assert_eq!(err.to_string(), "Port pool is exhausted (80 ports from 8010)");
    }

    #[test]
    fn test_operation_in_progress_reports_operation_and_start() {
        let sandbox_id = SandboxId::new();
        let started_at = Utc::now();
        let err = OrchestratorError::OperationInProgress {
            sandbox_id,
            operation: "stop".to_string(),
            started_at,
        };
        let message = err.to_string();
        assert!(message.contains("stop"));
        assert!(message.contains(&sandbox_id.to_string()));
        assert!(message.contains(&started_at.to_string()));
        assert_eq!(err.kind(), "operation_in_progress");
    }

    #[test]
    fn test_store_failure_names_the_record() {
        let task_id = TaskId::new();
        let err = OrchestratorError::store(
            format!("task {}", task_id),
            RepositoryError::Backend("connection reset".into()),
        );
        assert_eq!(err.kind(), "store_failure");
        assert!(err.to_string().contains(&task_id.to_string()));
        assert!(err.to_string().contains("connection reset"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_runtime_error_converts_with_source() {
        let err: OrchestratorError = RuntimeError::Unavailable("daemon down".into()).into();
        assert_eq!(err.kind(), "runtime_failure");
        assert!(std::error::Error::source(&err).is_some());
    }
}
