// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Task Scheduler
//!
//! Pure dispatch logic over one swarm's in-memory state. The coordinator
//! holds the swarm lock while calling [`dispatch_cycle`] and persists the
//! returned assignments afterwards.
//!
//! # Dispatch rules
//!
//! Pending tasks whose dependencies have all completed are visited highest
//! priority first, FIFO (submission sequence) within a priority band. Each
//! visited task is gated by its strategy:
//!
//! | Strategy | Gate |
//! |----------|------|
//! | `sequential` | nothing else in progress |
//! | `parallel` | in-progress count below `min(swarm.max_agents, task.max_agents)` |
//! | `adaptive` | dispatches this cycle below the idle-agent count taken at cycle start |
//!
//! A running sequential task blocks the swarm, and a waiting one holds back
//! every lower-ranked task.
//!
//! A task that passes its gate goes to an idle agent covering its required
//! capabilities, chosen by the swarm strategy. No eligible agent leaves the
//! task pending.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use hive_core::{AgentId, OrchestratorResult, TaskId};
use serde::Serialize;

use crate::domain::agent::{Agent, AgentStatus};
use crate::domain::swarm::{Swarm, SwarmStrategy};
use crate::domain::task::{Task, TaskPriority, TaskStatus, TaskStrategy};

/// Everything a swarm owns, guarded as one unit by the coordinator.
#[derive(Debug, Clone)]
pub struct SwarmState {
    pub swarm: Swarm,
    pub agents: HashMap<AgentId, Agent>,
    pub tasks: HashMap<TaskId, Task>,
    next_sequence: u64,
}

impl SwarmState {
    pub fn new(swarm: Swarm) -> Self {
        Self {
            swarm,
            agents: HashMap::new(),
            tasks: HashMap::new(),
            next_sequence: 1,
        }
    }

    /// Rebuild the state of a swarm loaded from the durable store.
    pub fn from_parts(swarm: Swarm, agents: Vec<Agent>, tasks: Vec<Task>) -> Self {
        let next_sequence = tasks.iter().map(|t| t.sequence).max().unwrap_or(0) + 1;
        Self {
            swarm,
            agents: agents.into_iter().map(|a| (a.id, a)).collect(),
            tasks: tasks.into_iter().map(|t| (t.id, t)).collect(),
            next_sequence,
        }
    }

    pub fn next_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    /// Agents counting against `max_agents` (everything but `removed`).
    pub fn live_agent_count(&self) -> usize {
        self.agents.values().filter(|a| a.is_live()).count()
    }

    pub fn in_progress_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|t| t.status == TaskStatus::InProgress)
            .count()
    }

    pub fn agent_counts(&self) -> BTreeMap<AgentStatus, usize> {
        let mut counts = BTreeMap::new();
        for agent in self.agents.values() {
            *counts.entry(agent.status).or_insert(0) += 1;
        }
        counts
    }

    pub fn task_counts(&self) -> BTreeMap<TaskStatus, usize> {
        let mut counts = BTreeMap::new();
        for task in self.tasks.values() {
            *counts.entry(task.status).or_insert(0) += 1;
        }
        counts
    }

    fn dependencies_met(&self, task: &Task) -> bool {
        task.dependencies.iter().all(|dep| {
            self.tasks
                .get(dep)
                .is_some_and(|t| t.status == TaskStatus::Completed)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub task_id: TaskId,
    pub agent_id: AgentId,
}

/// Run one dispatch cycle, applying every assignment to `state`.
pub fn dispatch_cycle(
    state: &mut SwarmState,
    now: DateTime<Utc>,
) -> OrchestratorResult<Vec<Assignment>> {
    let mut assignments = Vec::new();
    if !state.swarm.is_active() {
        return Ok(assignments);
    }

    let sequential_running = state
        .tasks
        .values()
        .any(|t| t.status == TaskStatus::InProgress && t.strategy == TaskStrategy::Sequential);
    if sequential_running {
        return Ok(assignments);
    }

    let idle_at_start = state.agents.values().filter(|a| a.is_idle()).count();
    if idle_at_start == 0 {
        return Ok(assignments);
    }
    let mut in_progress = state.in_progress_count();

    let mut queue: Vec<(Reverse<TaskPriority>, u64, TaskId)> = state
        .tasks
        .values()
        .filter(|t| t.status == TaskStatus::Pending && state.dependencies_met(t))
        .map(|t| {
            let (priority, sequence) = t.dispatch_key();
            (priority, sequence, t.id)
        })
        .collect();
    queue.sort();

    for (_, _, task_id) in queue {
        let Some(task) = state.tasks.get(&task_id) else {
            continue;
        };
        let strategy = task.strategy;

        match strategy {
            TaskStrategy::Sequential => {
                if in_progress > 0 {
                    break;
                }
            }
            TaskStrategy::Parallel => {
                let cap = task
                    .max_agents
                    .map_or(state.swarm.max_agents, |m| m.min(state.swarm.max_agents));
                if in_progress >= cap as usize {
                    continue;
                }
            }
            TaskStrategy::Adaptive => {
                if assignments.len() >= idle_at_start {
                    continue;
                }
            }
        }

        let Some(agent_id) = select_agent(state.swarm.strategy, state.agents.values(), task) else {
            continue;
        };

        if let Some(task) = state.tasks.get_mut(&task_id) {
            task.dispatch(agent_id, now)?;
        }
        if let Some(agent) = state.agents.get_mut(&agent_id) {
            agent.assign(task_id, now)?;
        }
        in_progress += 1;
        assignments.push(Assignment { task_id, agent_id });

        if strategy == TaskStrategy::Sequential {
            break;
        }
    }

    Ok(assignments)
}

/// Pick an idle agent able to run `task`, ranked by the swarm strategy.
fn select_agent<'a>(
    strategy: SwarmStrategy,
    agents: impl Iterator<Item = &'a Agent>,
    task: &Task,
) -> Option<AgentId> {
    agents
        .filter(|a| a.can_take(&task.required_capabilities))
        .min_by(|a, b| rank(strategy, a, b))
        .map(|a| a.id)
}

fn rank(strategy: SwarmStrategy, a: &Agent, b: &Agent) -> Ordering {
    let load = |agent: &Agent| agent.metrics.tasks_completed + agent.metrics.tasks_failed;
    let primary = match strategy {
        SwarmStrategy::Balanced => load(a).cmp(&load(b)),
        SwarmStrategy::Specialized => a.capabilities.len().cmp(&b.capabilities.len()),
        SwarmStrategy::Adaptive => b
            .metrics
            .success_rate()
            .partial_cmp(&a.metrics.success_rate())
            .unwrap_or(Ordering::Equal),
    };
    primary
        .then_with(|| load(a).cmp(&load(b)))
        .then_with(|| a.last_active.cmp(&b.last_active))
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}
