// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Task Aggregate
//!
//! A unit of work queued on a swarm. The assigned agent is present exactly
//! while the task is `in_progress` or after it `completed`/`failed`.
//!
//! ```text
//! pending ──dispatch──▶ in_progress ──▶ completed | failed
//!    │
//!    └──cancel──▶ cancelled
//! ```

use chrono::{DateTime, Utc};
use hive_core::{AgentId, OrchestratorError, OrchestratorResult, SwarmId, TaskId};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

string_enum!(TaskPriority, "priority" {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStrategy {
    /// Runs alone: nothing else in the swarm is in progress alongside it
    Sequential,
    /// Up to the swarm's agent cap (narrowed by the task's own `max_agents`)
    Parallel,
    /// Capped by the idle-agent count at the start of each dispatch cycle
    #[default]
    Adaptive,
}

string_enum!(TaskStrategy, "task strategy" {
    Sequential => "sequential",
    Parallel => "parallel",
    Adaptive => "adaptive",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

string_enum!(TaskStatus, "task status" {
    Pending => "pending",
    InProgress => "in_progress",
    Completed => "completed",
    Failed => "failed",
    Cancelled => "cancelled",
});

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Submission request for a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewTask {
    pub description: String,
    pub priority: TaskPriority,
    pub strategy: TaskStrategy,
    pub max_agents: Option<u32>,
    pub required_capabilities: BTreeSet<String>,
    pub dependencies: Vec<TaskId>,
    pub tags: Vec<String>,
}

impl NewTask {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_strategy(mut self, strategy: TaskStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn requiring(mut self, capability: impl Into<String>) -> Self {
        self.required_capabilities.insert(capability.into());
        self
    }

    pub fn after(mut self, dependency: TaskId) -> Self {
        self.dependencies.push(dependency);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub swarm_id: SwarmId,
    /// Per-swarm submission order, FIFO tie-break within a priority band
    pub sequence: u64,
    pub description: String,
    pub priority: TaskPriority,
    pub strategy: TaskStrategy,
    pub max_agents: Option<u32>,
    pub required_capabilities: BTreeSet<String>,
    pub dependencies: Vec<TaskId>,
    pub tags: Vec<String>,
    pub status: TaskStatus,
    pub assigned_agent_id: Option<AgentId>,
    pub result: Option<serde_json::Value>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(
        swarm_id: SwarmId,
        sequence: u64,
        request: NewTask,
        now: DateTime<Utc>,
    ) -> OrchestratorResult<Self> {
        let description = request.description.trim().to_string();
        if description.is_empty() {
            return Err(OrchestratorError::InvalidConfiguration(
                "task description cannot be empty".to_string(),
            ));
        }
        if request.max_agents == Some(0) {
            return Err(OrchestratorError::InvalidConfiguration(
                "task max_agents must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            id: TaskId::new(),
            swarm_id,
            sequence,
            description,
            priority: request.priority,
            strategy: request.strategy,
            max_agents: request.max_agents,
            required_capabilities: request.required_capabilities,
            dependencies: request.dependencies,
            tags: request.tags,
            status: TaskStatus::Pending,
            assigned_agent_id: None,
            result: None,
            failure_reason: None,
            created_at: now,
            started_at: None,
            completed_at: None,
        })
    }

    /// Dispatch order: highest priority first, then earliest submission.
    pub fn dispatch_key(&self) -> (Reverse<TaskPriority>, u64) {
        (Reverse(self.priority), self.sequence)
    }

    fn require(&self, expected: TaskStatus, operation: &'static str) -> OrchestratorResult<()> {
        if self.status != expected {
            return Err(OrchestratorError::InvalidState {
                entity: "Task",
                id: self.id.to_string(),
                state: self.status.to_string(),
                operation,
            });
        }
        Ok(())
    }

    /// `pending → in_progress` on `agent_id`.
    pub fn dispatch(&mut self, agent_id: AgentId, now: DateTime<Utc>) -> OrchestratorResult<()> {
        self.require(TaskStatus::Pending, "dispatch")?;
        self.status = TaskStatus::InProgress;
        self.assigned_agent_id = Some(agent_id);
        self.started_at = Some(now);
        Ok(())
    }

    /// Record the outcome reported by the agent.
    pub fn report(
        &mut self,
        success: bool,
        payload: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> OrchestratorResult<AgentId> {
        self.require(TaskStatus::InProgress, "report result")?;
        let agent_id = self.assigned_agent_id.ok_or_else(|| OrchestratorError::InvalidState {
            entity: "Task",
            id: self.id.to_string(),
            state: "unassigned".to_string(),
            operation: "report result",
        })?;
        self.status = if success { TaskStatus::Completed } else { TaskStatus::Failed };
        self.result = payload;
        self.completed_at = Some(now);
        Ok(agent_id)
    }

    /// `in_progress → failed` for reasons outside the agent's report
    /// (agent removed, agent error, swarm terminated).
    pub fn fail(
        &mut self,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> OrchestratorResult<()> {
        self.require(TaskStatus::InProgress, "fail")?;
        self.status = TaskStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.completed_at = Some(now);
        Ok(())
    }

    /// `pending → cancelled`.
    pub fn cancel(
        &mut self,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> OrchestratorResult<()> {
        self.require(TaskStatus::Pending, "cancel")?;
        self.status = TaskStatus::Cancelled;
        self.failure_reason = Some(reason.into());
        self.completed_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(request: NewTask) -> Task {
        Task::new(SwarmId::new(), 1, request, Utc::now()).unwrap()
    }

    #[test]
    fn test_priority_ordering() {
        assert!(TaskPriority::Critical > TaskPriority::High);
        assert!(TaskPriority::Medium > TaskPriority::Low);
        assert_eq!(TaskPriority::default(), TaskPriority::Medium);
        assert_eq!(TaskStrategy::default(), TaskStrategy::Adaptive);
    }

    #[test]
    fn test_empty_description_is_rejected() {
        let err = Task::new(SwarmId::new(), 1, NewTask::new("   "), Utc::now()).unwrap_err();
        assert_eq!(err.kind(), "invalid_configuration");
    }

    #[test]
    fn test_assignment_tracks_status() {
        let mut task = task(NewTask::new("build"));
        assert!(task.assigned_agent_id.is_none());

        let agent = AgentId::new();
        task.dispatch(agent, Utc::now()).unwrap();
        assert_eq!(task.assigned_agent_id, Some(agent));

        let reported = task
            .report(true, Some(serde_json::json!({"ok": true})), Utc::now())
            .unwrap();
        assert_eq!(reported, agent);
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.completed_at.is_some());
        assert_eq!(task.assigned_agent_id, Some(agent));
    }

    #[test]
    fn test_report_requires_in_progress() {
        let mut task = task(NewTask::new("build"));
        let err = task.report(true, None, Utc::now()).unwrap_err();
        assert_eq!(err.kind(), "invalid_state");
    }

    #[test]
    fn test_cancel_only_while_pending() {
        let mut task = task(NewTask::new("build"));
        task.dispatch(AgentId::new(), Utc::now()).unwrap();
        assert!(task.cancel("caller", Utc::now()).is_err());

        let mut other = self::task(NewTask::new("lint"));
        other.cancel("caller", Utc::now()).unwrap();
        assert_eq!(other.status, TaskStatus::Cancelled);
        assert!(other.assigned_agent_id.is_none());
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(TaskStatus::InProgress.as_str(), "in_progress");
        assert_eq!("in_progress".parse::<TaskStatus>().unwrap(), TaskStatus::InProgress);
        assert_eq!(
            serde_json::to_value(TaskStatus::InProgress).unwrap(),
            serde_json::json!("in_progress")
        );
    }
}
