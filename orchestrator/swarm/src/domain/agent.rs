// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Aggregate
//!
//! A worker identity scoped to exactly one swarm for its lifetime.
//!
//! ```text
//!            dispatch             result
//!   idle ──────────────▶ busy ──────────▶ idle
//!                          │
//!                          └── agent error ──▶ error
//!
//!   any non-removed state ── remove ──▶ removed (terminal)
//! ```

use chrono::{DateTime, Utc};
use hive_core::{AgentId, OrchestratorError, OrchestratorResult, SwarmId, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Idle,
    Busy,
    Error,
    Removed,
}

string_enum!(AgentStatus, "agent status" {
    Active => "active",
    Idle => "idle",
    Busy => "busy",
    Error => "error",
    Removed => "removed",
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub tasks_completed: u64,
    pub tasks_failed: u64,
}

impl AgentMetrics {
    /// Fraction of finished tasks that succeeded; 1.0 before any finish.
    pub fn success_rate(&self) -> f64 {
        let total = self.tasks_completed + self.tasks_failed;
        if total == 0 {
            1.0
        } else {
            self.tasks_completed as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub swarm_id: SwarmId,
    #[serde(rename = "type")]
    pub agent_type: String,
    pub name: String,
    pub capabilities: BTreeSet<String>,
    pub status: AgentStatus,
    pub current_task: Option<TaskId>,
    pub metrics: AgentMetrics,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl Agent {
    pub fn new(
        swarm_id: SwarmId,
        agent_type: &str,
        name: Option<String>,
        capabilities: impl IntoIterator<Item = String>,
        now: DateTime<Utc>,
    ) -> OrchestratorResult<Self> {
        let agent_type = agent_type.trim();
        if agent_type.is_empty() {
            return Err(OrchestratorError::InvalidConfiguration(
                "agent type cannot be empty".to_string(),
            ));
        }

        let id = AgentId::new();
        let name = match name.map(|n| n.trim().to_string()) {
            Some(n) if !n.is_empty() => n,
            _ => format!("{}-{}", agent_type, &id.to_string()[..8]),
        };

        Ok(Self {
            id,
            swarm_id,
            agent_type: agent_type.to_string(),
            name,
            capabilities: capabilities
                .into_iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            status: AgentStatus::Idle,
            current_task: None,
            metrics: AgentMetrics::default(),
            created_at: now,
            last_active: now,
        })
    }

    /// Counts against the swarm's agent cap.
    pub fn is_live(&self) -> bool {
        self.status != AgentStatus::Removed
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.status, AgentStatus::Idle | AgentStatus::Active)
    }

    /// Idle and holding every required capability.
    pub fn can_take(&self, required: &BTreeSet<String>) -> bool {
        self.is_idle() && required.is_subset(&self.capabilities)
    }

    fn transition(
        &mut self,
        to: AgentStatus,
        now: DateTime<Utc>,
    ) -> OrchestratorResult<AgentStatus> {
        use AgentStatus::*;
        let legal = match (self.status, to) {
            (Active | Idle, Busy) => true,
            (Active, Idle) => true,
            (Busy, Idle | Error) => true,
            (from, Removed) => from != Removed,
            _ => false,
        };
        if !legal {
            return Err(OrchestratorError::InvalidTransition {
                entity: "Agent",
                id: self.id.to_string(),
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        let from = self.status;
        self.status = to;
        self.last_active = now;
        Ok(from)
    }

    /// `idle → busy` for `task_id`.
    pub fn assign(&mut self, task_id: TaskId, now: DateTime<Utc>) -> OrchestratorResult<()> {
        self.transition(AgentStatus::Busy, now)?;
        self.current_task = Some(task_id);
        Ok(())
    }

    /// `busy → idle` after the current task finished.
    pub fn finish_task(&mut self, success: bool, now: DateTime<Utc>) -> OrchestratorResult<()> {
        self.transition(AgentStatus::Idle, now)?;
        self.current_task = None;
        if success {
            self.metrics.tasks_completed += 1;
        } else {
            self.metrics.tasks_failed += 1;
        }
        Ok(())
    }

    /// `busy → error`. Returns the task the agent was working on.
    pub fn mark_error(&mut self, now: DateTime<Utc>) -> OrchestratorResult<Option<TaskId>> {
        self.transition(AgentStatus::Error, now)?;
        self.metrics.tasks_failed += 1;
        Ok(self.current_task.take())
    }

    /// `* → removed`. Returns the task the agent was working on.
    pub fn remove(&mut self, now: DateTime<Utc>) -> OrchestratorResult<Option<TaskId>> {
        self.transition(AgentStatus::Removed, now)?;
        Ok(self.current_task.take())
    }
}
