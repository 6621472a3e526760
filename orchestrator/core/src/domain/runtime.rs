// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Label present on every container the engine creates.
pub const SANDBOX_LABEL: &str = "hive.sandbox";
pub const SANDBOX_ID_LABEL: &str = "hive.sandbox.id";
pub const PROJECT_LABEL: &str = "hive.project";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Relative CPU weight (Docker `--cpu-shares`, 1024 = one full share)
    pub cpu_shares: u32,
    /// Hard memory limit in bytes
    pub memory_limit: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpu_shares: 512,
            memory_limit: 512 * 1024 * 1024,
        }
    }
}

/// Everything the runtime needs to start one sandbox container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// Host port, bound to the same container port on the loopback interface
    pub port: u16,
    pub resources: ResourceLimits,
    /// Isolation network the container is attached to
    pub network: String,
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub env: Vec<String>,
}

/// Opaque handle to a container, as returned by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerRef(pub String);

impl ContainerRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContainerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Created,
    Running,
    Restarting,
    Paused,
    Exited,
    Dead,
    /// The runtime has no container with this reference
    Missing,
}

impl ContainerState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running | Self::Restarting)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub container: ContainerRef,
    pub name: String,
    pub state: ContainerState,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Container runtime unavailable: {0}")]
    Unavailable(String),
    #[error("Image unavailable: {0}")]
    ImageUnavailable(String),
    #[error("Failed to start container: {0}")]
    StartFailed(String),
    #[error("Failed to stop container: {0}")]
    StopFailed(String),
    #[error("Failed to remove container: {0}")]
    RemoveFailed(String),
    #[error("Network setup failed: {0}")]
    Network(String),
    #[error("Runtime call failed: {0}")]
    Api(String),
    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: &'static str, seconds: u64 },
}

/// Container runtime collaborator used by the sandbox manager.
///
/// Implementations must be safe to call concurrently for different
/// containers. `remove_container` always forces removal.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn ping(&self) -> Result<(), RuntimeError>;
    async fn ensure_network(&self, name: &str) -> Result<(), RuntimeError>;
    async fn start_container(&self, spec: ContainerSpec) -> Result<ContainerRef, RuntimeError>;
    async fn stop_container(
        &self,
        container: &ContainerRef,
        grace: Duration,
    ) -> Result<(), RuntimeError>;
    async fn remove_container(&self, container: &ContainerRef) -> Result<(), RuntimeError>;
    async fn inspect(&self, container: &ContainerRef) -> Result<ContainerState, RuntimeError>;
    /// List every container (running or not) carrying `label=true`.
    async fn list_labelled(&self, label: &str) -> Result<Vec<ContainerSummary>, RuntimeError>;
}
