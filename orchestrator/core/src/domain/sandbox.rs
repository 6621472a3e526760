// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Sandbox Aggregate
//!
//! A sandbox is one isolated container owned by a project and bound to one
//! port drawn from the [`PortPool`](crate::domain::port_pool::PortPool).
//!
//! ```text
//! stopped ──start──▶ starting ──ready──▶ running ──stop──▶ stopping ──cleanup──▶ stopped
//!                        │                  │                  │
//!                        └──────────────────┴──────────────────┴──▶ error ──reset──▶ stopped
//! ```
//!
//! # Invariants
//!
//! - `allocated_port` is `Some` only while the status is not `stopped`, except
//!   that an `error` reached after cleanup has already given its port back.
//! - `container_ref` is `Some` only between a successful start and cleanup.
//! - Transition methods never touch the pool; they return the port the caller
//!   must release.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::{OrchestratorError, OrchestratorResult};
use crate::domain::ids::{ProjectId, SandboxId};
use crate::domain::runtime::{ContainerRef, ResourceLimits};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxStatus {
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
}

impl SandboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for SandboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sandbox {
    pub id: SandboxId,
    pub project_id: ProjectId,
    pub image: String,
    pub allocated_port: Option<u16>,
    pub status: SandboxStatus,
    pub container_ref: Option<ContainerRef>,
    pub resources: ResourceLimits,
    /// Last failure reported by the runtime, cleared on reset
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

impl Sandbox {
    pub fn new(project_id: ProjectId, image: String, resources: ResourceLimits) -> Self {
        let now = Utc::now();
        Self {
            id: SandboxId::new(),
            project_id,
            image,
            allocated_port: None,
            status: SandboxStatus::Stopped,
            container_ref: None,
            resources,
            last_error: None,
            created_at: now,
            last_accessed_at: now,
        }
    }

    fn transition_error(&self, to: SandboxStatus) -> OrchestratorError {
        OrchestratorError::InvalidTransition {
            entity: "Sandbox",
            id: self.id.to_string(),
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }

    /// `stopped → starting`, recording the port acquired for this run.
    pub fn begin_start(&mut self, port: u16) -> OrchestratorResult<()> {
        if self.status != SandboxStatus::Stopped {
            return Err(self.transition_error(SandboxStatus::Starting));
        }
        self.status = SandboxStatus::Starting;
        self.allocated_port = Some(port);
        self.last_error = None;
        self.last_accessed_at = Utc::now();
        Ok(())
    }

    /// `starting → running` once the runtime reports the container up.
    pub fn mark_running(&mut self, container: ContainerRef) -> OrchestratorResult<()> {
        if self.status != SandboxStatus::Starting {
            return Err(self.transition_error(SandboxStatus::Running));
        }
        self.status = SandboxStatus::Running;
        self.container_ref = Some(container);
        Ok(())
    }

    /// `running → stopping`.
    pub fn begin_stop(&mut self) -> OrchestratorResult<()> {
        if self.status != SandboxStatus::Running {
            return Err(self.transition_error(SandboxStatus::Stopping));
        }
        self.status = SandboxStatus::Stopping;
        Ok(())
    }

    /// `stopping → stopped`. Returns the port to give back to the pool.
    pub fn mark_stopped(&mut self) -> OrchestratorResult<Option<u16>> {
        if self.status != SandboxStatus::Stopping {
            return Err(self.transition_error(SandboxStatus::Stopped));
        }
        self.status = SandboxStatus::Stopped;
        self.container_ref = None;
        Ok(self.allocated_port.take())
    }

    /// Any in-flight or running state `→ error`, keeping the port and
    /// container handle so that a later reset can clean them up.
    pub fn mark_error(&mut self, reason: impl Into<String>) -> OrchestratorResult<()> {
        if matches!(self.status, SandboxStatus::Stopped | SandboxStatus::Error) {
            return Err(self.transition_error(SandboxStatus::Error));
        }
        self.status = SandboxStatus::Error;
        self.last_error = Some(reason.into());
        Ok(())
    }

    /// `→ error` after the container has already been removed. Returns the
    /// port to give back to the pool.
    pub fn mark_error_after_cleanup(
        &mut self,
        reason: impl Into<String>,
    ) -> OrchestratorResult<Option<u16>> {
        self.mark_error(reason)?;
        self.container_ref = None;
        Ok(self.allocated_port.take())
    }

    /// `error → stopped`. Returns the port still held, if any.
    pub fn reset(&mut self) -> OrchestratorResult<Option<u16>> {
        if self.status != SandboxStatus::Error {
            return Err(self.transition_error(SandboxStatus::Stopped));
        }
        self.status = SandboxStatus::Stopped;
        self.container_ref = None;
        self.last_error = None;
        Ok(self.allocated_port.take())
    }

    pub fn touch(&mut self) {
        self.last_accessed_at = Utc::now();
    }
}
