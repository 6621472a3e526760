// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ids::{AgentId, ProjectId, SandboxId, SwarmId, TaskId};
use crate::domain::runtime::ContainerRef;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SwarmEvent {
    SwarmCreated {
        swarm_id: SwarmId,
        name: String,
        topology: String,
        strategy: String,
        max_agents: u32,
        created_at: DateTime<Utc>,
    },
    SwarmScaled {
        swarm_id: SwarmId,
        previous_max_agents: u32,
        max_agents: u32,
        scaled_at: DateTime<Utc>,
    },
    SwarmDraining {
        swarm_id: SwarmId,
        cancelled_tasks: usize,
        in_progress_tasks: usize,
        draining_at: DateTime<Utc>,
    },
    SwarmTerminated {
        swarm_id: SwarmId,
        removed_agents: usize,
        terminated_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AgentEvent {
    AgentSpawned {
        swarm_id: SwarmId,
        agent_id: AgentId,
        agent_type: String,
        name: String,
        spawned_at: DateTime<Utc>,
    },
    AgentStatusChanged {
        swarm_id: SwarmId,
        agent_id: AgentId,
        from: String,
        to: String,
        changed_at: DateTime<Utc>,
    },
    AgentRemoved {
        swarm_id: SwarmId,
        agent_id: AgentId,
        forced: bool,
        removed_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskEvent {
    TaskSubmitted {
        swarm_id: SwarmId,
        task_id: TaskId,
        priority: String,
        submitted_at: DateTime<Utc>,
    },
    TaskDispatched {
        swarm_id: SwarmId,
        task_id: TaskId,
        agent_id: AgentId,
        dispatched_at: DateTime<Utc>,
    },
    TaskCompleted {
        swarm_id: SwarmId,
        task_id: TaskId,
        agent_id: AgentId,
        completed_at: DateTime<Utc>,
    },
    TaskFailed {
        swarm_id: SwarmId,
        task_id: TaskId,
        agent_id: AgentId,
        reason: Option<String>,
        failed_at: DateTime<Utc>,
    },
    TaskCancelled {
        swarm_id: SwarmId,
        task_id: TaskId,
        reason: String,
        cancelled_at: DateTime<Utc>,
    },
}

impl TaskEvent {
    pub fn swarm_id(&self) -> SwarmId {
        match self {
            Self::TaskSubmitted { swarm_id, .. }
            | Self::TaskDispatched { swarm_id, .. }
            | Self::TaskCompleted { swarm_id, .. }
            | Self::TaskFailed { swarm_id, .. }
            | Self::TaskCancelled { swarm_id, .. } => *swarm_id,
        }
    }
}

impl AgentEvent {
    pub fn swarm_id(&self) -> SwarmId {
        match self {
            Self::AgentSpawned { swarm_id, .. }
            | Self::AgentStatusChanged { swarm_id, .. }
            | Self::AgentRemoved { swarm_id, .. } => *swarm_id,
        }
    }
}

impl SwarmEvent {
    pub fn swarm_id(&self) -> SwarmId {
        match self {
            Self::SwarmCreated { swarm_id, .. }
            | Self::SwarmScaled { swarm_id, .. }
            | Self::SwarmDraining { swarm_id, .. }
            | Self::SwarmTerminated { swarm_id, .. } => *swarm_id,
        }
    }
}

/// Sandbox lifecycle events. `SandboxError` is the one external notification
/// channels are expected to alert on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SandboxEvent {
    SandboxCreated {
        sandbox_id: SandboxId,
        project_id: ProjectId,
        image: String,
        created_at: DateTime<Utc>,
    },
    SandboxRunning {
        sandbox_id: SandboxId,
        project_id: ProjectId,
        port: u16,
        container: ContainerRef,
        started_at: DateTime<Utc>,
    },
    SandboxStopped {
        sandbox_id: SandboxId,
        project_id: ProjectId,
        forced: bool,
        stopped_at: DateTime<Utc>,
    },
    SandboxError {
        sandbox_id: SandboxId,
        project_id: ProjectId,
        reason: String,
        failed_at: DateTime<Utc>,
    },
    SandboxReset {
        sandbox_id: SandboxId,
        project_id: ProjectId,
        reset_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MemoryEvent {
    EntriesEvicted {
        count: usize,
        evicted_at: DateTime<Utc>,
    },
}
