// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Swarm Coordinator Application Service
//!
//! Public façade of the swarm half of the engine. It coordinates:
//! - Agent registry: spawn/remove/error transitions, capacity checks
//! - Task scheduler: submission, dispatch cycles, result reporting
//! - Memory store: swarm-scoped key/value memory
//! - Durable store: write-through of every changed record
//! - Event bus: swarm, agent and task lifecycle events
//!
//! # Concurrency
//!
//! Each swarm's agents and tasks live in one [`SwarmState`] behind a
//! per-swarm async mutex, so all mutations of a swarm are serialized while
//! different swarms proceed in parallel. Store writes happen under that lock
//! and are bounded by [`STORE_TIMEOUT`](crate::application::STORE_TIMEOUT).
//!
//! A mutation is staged on a copy of the state and becomes visible only once
//! every record it touched has been written, so a `StoreFailure` leaves the
//! swarm exactly as it was.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use hive_core::domain::engine_config::SwarmConfig;
use hive_core::domain::events::{AgentEvent, SwarmEvent, TaskEvent};
use hive_core::infrastructure::event_bus::EventBus;
use hive_core::{AgentId, Clock, OrchestratorError, OrchestratorResult, SwarmId, TaskId};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, error, info, warn};

use crate::application::bounded;
use crate::application::memory_store::MemoryStore;
use crate::application::scheduler::{dispatch_cycle, Assignment, SwarmState};
use crate::domain::agent::{Agent, AgentStatus};
use crate::domain::memory::{MemoryEntry, MemoryKey, DEFAULT_NAMESPACE};
use crate::domain::repository::{AgentRepository, SwarmRepository, TaskRepository};
use crate::domain::swarm::{Swarm, SwarmStatus, SwarmStrategy, SwarmTopology};
use crate::domain::task::{NewTask, Task, TaskStatus};

/// Failure reason recorded on the task of a force-removed agent.
pub const AGENT_REMOVED: &str = "agent_removed";
/// Failure/cancel reason for tasks cut short by swarm termination.
pub const SWARM_TERMINATED: &str = "swarm_terminated";
pub const CANCELLED_BY_CALLER: &str = "cancelled_by_caller";

// ============================================================================
// Requests and reports
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSwarmRequest {
    #[serde(default)]
    pub name: Option<String>,
    pub topology: SwarmTopology,
    #[serde(default)]
    pub strategy: SwarmStrategy,
    pub max_agents: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnAgentRequest {
    #[serde(rename = "type")]
    pub agent_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmStatusReport {
    pub swarm: Swarm,
    pub live_agents: usize,
    pub agents: BTreeMap<AgentStatus, usize>,
    pub tasks: BTreeMap<TaskStatus, usize>,
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How long `terminate_swarm` waits for in-progress tasks
    pub termination_grace: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            termination_grace: Duration::from_secs(30),
        }
    }
}

impl From<&SwarmConfig> for CoordinatorConfig {
    fn from(config: &SwarmConfig) -> Self {
        Self {
            termination_grace: Duration::from_secs(config.termination_grace_seconds),
        }
    }
}

// ============================================================================
// Service Trait
// ============================================================================

#[async_trait]
pub trait SwarmCoordinator: Send + Sync {
    async fn create_swarm(&self, request: CreateSwarmRequest) -> OrchestratorResult<Swarm>;
    /// Drain, wait for running tasks (bounded), remove agents, terminate.
    /// Idempotent.
    async fn terminate_swarm(&self, id: SwarmId) -> OrchestratorResult<Swarm>;
    async fn scale_swarm(&self, id: SwarmId, max_agents: u32) -> OrchestratorResult<Swarm>;
    async fn get_swarm(&self, id: SwarmId) -> OrchestratorResult<Swarm>;
    async fn list_swarms(&self) -> OrchestratorResult<Vec<Swarm>>;
    async fn swarm_status(&self, id: SwarmId) -> OrchestratorResult<SwarmStatusReport>;

    async fn spawn_agent(
        &self,
        swarm_id: SwarmId,
        request: SpawnAgentRequest,
    ) -> OrchestratorResult<Agent>;
    async fn remove_agent(&self, agent_id: AgentId, force: bool) -> OrchestratorResult<Agent>;
    /// `busy → error`, failing the agent's task with `reason`.
    async fn report_agent_error(
        &self,
        agent_id: AgentId,
        reason: String,
    ) -> OrchestratorResult<Agent>;
    async fn get_agent(&self, agent_id: AgentId) -> OrchestratorResult<Agent>;
    async fn list_agents(&self, swarm_id: SwarmId) -> OrchestratorResult<Vec<Agent>>;

    async fn submit_task(&self, swarm_id: SwarmId, request: NewTask) -> OrchestratorResult<Task>;
    async fn report_result(
        &self,
        task_id: TaskId,
        success: bool,
        payload: Option<serde_json::Value>,
    ) -> OrchestratorResult<Task>;
    async fn cancel_task(&self, task_id: TaskId) -> OrchestratorResult<Task>;
    async fn get_task(&self, task_id: TaskId) -> OrchestratorResult<Task>;
    async fn list_tasks(
        &self,
        swarm_id: SwarmId,
        status: Option<TaskStatus>,
    ) -> OrchestratorResult<Vec<Task>>;

    async fn put_memory(
        &self,
        swarm_id: SwarmId,
        namespace: Option<String>,
        key: String,
        value: serde_json::Value,
        ttl_seconds: Option<u64>,
    ) -> OrchestratorResult<MemoryEntry>;
    async fn get_memory(
        &self,
        swarm_id: SwarmId,
        namespace: Option<String>,
        key: String,
    ) -> OrchestratorResult<MemoryEntry>;
    async fn delete_memory(
        &self,
        swarm_id: SwarmId,
        namespace: Option<String>,
        key: String,
    ) -> OrchestratorResult<bool>;
    async fn list_memory(
        &self,
        swarm_id: SwarmId,
        namespace: Option<String>,
    ) -> OrchestratorResult<Vec<MemoryEntry>>;
}

// ============================================================================
// Standard Implementation
// ============================================================================

/// A record of a swarm changed under its lock and written through on commit.
#[derive(Debug, Clone, Copy)]
enum Record {
    Swarm,
    Agent(AgentId),
    Task(TaskId),
}

struct SwarmHandle {
    state: Mutex<SwarmState>,
    /// Signalled whenever an in-progress task reaches a terminal state
    settled: Notify,
}

pub struct StandardSwarmCoordinator {
    swarms: DashMap<SwarmId, Arc<SwarmHandle>>,
    agent_index: DashMap<AgentId, SwarmId>,
    task_index: DashMap<TaskId, SwarmId>,
    swarm_repository: Arc<dyn SwarmRepository>,
    agent_repository: Arc<dyn AgentRepository>,
    task_repository: Arc<dyn TaskRepository>,
    memory: Arc<MemoryStore>,
    event_bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    config: CoordinatorConfig,
}

impl StandardSwarmCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        swarm_repository: Arc<dyn SwarmRepository>,
        agent_repository: Arc<dyn AgentRepository>,
        task_repository: Arc<dyn TaskRepository>,
        memory: Arc<MemoryStore>,
        event_bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            swarms: DashMap::new(),
            agent_index: DashMap::new(),
            task_index: DashMap::new(),
            swarm_repository,
            agent_repository,
            task_repository,
            memory,
            event_bus,
            clock,
            config,
        }
    }

    pub fn memory_store(&self) -> Arc<MemoryStore> {
        self.memory.clone()
    }

    /// Load every swarm (with its agents and tasks) from the durable store
    /// that is not already in the registry. Returns how many were loaded.
    pub async fn restore(&self) -> OrchestratorResult<usize> {
        let swarms = bounded("swarm list", "swarms", self.swarm_repository.list_all()).await?;
        let mut restored = 0;

        for swarm in swarms {
            if self.swarms.contains_key(&swarm.id) {
                continue;
            }
            let swarm_id = swarm.id;
            let agents = bounded(
                "agent list",
                format!("agents of swarm {}", swarm_id),
                self.agent_repository.find_by_swarm(swarm_id),
            )
            .await?;
            let tasks = bounded(
                "task list",
                format!("tasks of swarm {}", swarm_id),
                self.task_repository.find_by_swarm(swarm_id),
            )
            .await?;

            for agent in &agents {
                self.agent_index.insert(agent.id, swarm_id);
            }
            for task in &tasks {
                self.task_index.insert(task.id, swarm_id);
            }
            let state = SwarmState::from_parts(swarm, agents, tasks);
            self.swarms.insert(swarm_id, Arc::new(SwarmHandle {
                state: Mutex::new(state),
                settled: Notify::new(),
            }));
            restored += 1;
        }

        if restored > 0 {
            info!(restored, "Restored swarms from the durable store");
        }
        Ok(restored)
    }

    fn handle(&self, id: SwarmId) -> OrchestratorResult<Arc<SwarmHandle>> {
        self.swarms
            .get(&id)
            .map(|h| h.value().clone())
            .ok_or_else(|| OrchestratorError::not_found("Swarm", id))
    }

    fn handle_for_agent(&self, agent_id: AgentId) -> OrchestratorResult<Arc<SwarmHandle>> {
        let swarm_id = self
            .agent_index
            .get(&agent_id)
            .map(|e| *e.value())
            .ok_or_else(|| OrchestratorError::not_found("Agent", agent_id))?;
        self.handle(swarm_id)
    }

    fn handle_for_task(&self, task_id: TaskId) -> OrchestratorResult<Arc<SwarmHandle>> {
        let swarm_id = self
            .task_index
            .get(&task_id)
            .map(|e| *e.value())
            .ok_or_else(|| OrchestratorError::not_found("Task", task_id))?;
        self.handle(swarm_id)
    }

    async fn save_swarm(&self, swarm: &Swarm) -> OrchestratorResult<()> {
        let target = format!("swarm {}", swarm.id);
        bounded("swarm save", target, self.swarm_repository.save(swarm)).await
    }

    async fn save_agent(&self, agent: &Agent) -> OrchestratorResult<()> {
        let target = format!("agent {}", agent.id);
        bounded("agent save", target, self.agent_repository.save(agent)).await
    }

    async fn save_task(&self, task: &Task) -> OrchestratorResult<()> {
        let target = format!("task {}", task.id);
        bounded("task save", target, self.task_repository.save(task)).await
    }

    /// Write the version of `record` held by `state`. Records `state` does not
    /// hold are skipped.
    async fn save_record(&self, state: &SwarmState, record: Record) -> OrchestratorResult<()> {
        match record {
            Record::Swarm => self.save_swarm(&state.swarm).await,
            Record::Agent(id) => match state.agents.get(&id) {
                Some(agent) => self.save_agent(agent).await,
                None => Ok(()),
            },
            Record::Task(id) => match state.tasks.get(&id) {
                Some(task) => self.save_task(task).await,
                None => Ok(()),
            },
        }
    }

    /// Write the `records` changed in `next` through to the store, then make
    /// `next` the live state. If a write fails, the records already written
    /// are put back to their versions in `state`, which stays as it was.
    async fn commit(
        &self,
        state: &mut SwarmState,
        next: SwarmState,
        records: &[Record],
    ) -> OrchestratorResult<()> {
        let swarm_id = state.swarm.id;
        for (written, record) in records.iter().enumerate() {
            if let Err(e) = self.save_record(&next, *record).await {
                error!(%swarm_id, ?record, "Failed to persist swarm change: {}", e);
                for undo in records[..written].iter().rev() {
                    if let Err(undo_err) = self.save_record(state, *undo).await {
                        error!(
                            %swarm_id,
                            record = ?undo,
                            "Failed to roll back record: {}", undo_err
                        );
                    }
                }
                return Err(e);
            }
        }
        *state = next;
        Ok(())
    }

    fn publish_agent_status(&self, agent: &Agent, from: AgentStatus) {
        self.event_bus.publish_agent_event(AgentEvent::AgentStatusChanged {
            swarm_id: agent.swarm_id,
            agent_id: agent.id,
            from: from.to_string(),
            to: agent.status.to_string(),
            changed_at: agent.last_active,
        });
    }

    fn publish_task_failed(&self, task: &Task, agent_id: AgentId) {
        counter!("hive_tasks_failed_total").increment(1);
        self.event_bus.publish_task_event(TaskEvent::TaskFailed {
            swarm_id: task.swarm_id,
            task_id: task.id,
            agent_id,
            reason: task.failure_reason.clone(),
            failed_at: task.completed_at.unwrap_or_else(|| self.clock.now()),
        });
    }

    /// Run a dispatch cycle and commit its assignments as one unit.
    async fn dispatch(&self, state: &mut SwarmState) -> OrchestratorResult<Vec<Assignment>> {
        let now = self.clock.now();
        let mut next = state.clone();
        let assignments = dispatch_cycle(&mut next, now)?;
        if assignments.is_empty() {
            return Ok(assignments);
        }

        let records: Vec<Record> = assignments
            .iter()
            .flat_map(|a| [Record::Task(a.task_id), Record::Agent(a.agent_id)])
            .collect();
        self.commit(state, next, &records).await?;

        for assignment in &assignments {
            if let Some(agent) = state.agents.get(&assignment.agent_id) {
                self.publish_agent_status(agent, AgentStatus::Idle);
            }
            counter!("hive_tasks_dispatched_total").increment(1);
            self.event_bus.publish_task_event(TaskEvent::TaskDispatched {
                swarm_id: state.swarm.id,
                task_id: assignment.task_id,
                agent_id: assignment.agent_id,
                dispatched_at: now,
            });
            info!(
                swarm_id = %state.swarm.id,
                task_id = %assignment.task_id,
                agent_id = %assignment.agent_id,
                "Task dispatched"
            );
        }

        Ok(assignments)
    }

    /// Dispatch after an operation has already committed. A failure here
    /// leaves the tasks pending for the next cycle and does not fail the
    /// operation.
    async fn redispatch(&self, state: &mut SwarmState) {
        if let Err(e) = self.dispatch(state).await {
            warn!(swarm_id = %state.swarm.id, "Dispatch cycle failed; tasks stay pending: {}", e);
        }
    }

    /// Wait until no task of the swarm is in progress or the termination
    /// grace period runs out. Returns whether the swarm settled in time.
    async fn wait_for_settle(&self, handle: &SwarmHandle) -> bool {
        let deadline = tokio::time::Instant::now() + self.config.termination_grace;
        loop {
            let notified = handle.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if handle.state.lock().await.in_progress_count() == 0 {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return false;
            }
        }
    }

    fn memory_key(swarm_id: SwarmId, namespace: Option<String>, key: String) -> MemoryKey {
        MemoryKey::new(swarm_id, namespace.as_deref(), key)
    }
}

#[async_trait]
impl SwarmCoordinator for StandardSwarmCoordinator {
    async fn create_swarm(&self, request: CreateSwarmRequest) -> OrchestratorResult<Swarm> {
        let now = self.clock.now();
        let swarm = Swarm::new(
            request.name,
            request.topology,
            request.strategy,
            request.max_agents,
            now,
        )?;
        self.save_swarm(&swarm).await?;

        self.swarms.insert(swarm.id, Arc::new(SwarmHandle {
            state: Mutex::new(SwarmState::new(swarm.clone())),
            settled: Notify::new(),
        }));

        self.event_bus.publish_swarm_event(SwarmEvent::SwarmCreated {
            swarm_id: swarm.id,
            name: swarm.name.clone(),
            topology: swarm.topology.to_string(),
            strategy: swarm.strategy.to_string(),
            max_agents: swarm.max_agents,
            created_at: now,
        });
        info!(
            swarm_id = %swarm.id,
            name = %swarm.name,
            topology = %swarm.topology,
            strategy = %swarm.strategy,
            max_agents = swarm.max_agents,
            "Swarm created"
        );
        Ok(swarm)
    }

    async fn terminate_swarm(&self, id: SwarmId) -> OrchestratorResult<Swarm> {
        let handle = self.handle(id)?;

        {
            let mut state = handle.state.lock().await;
            match state.swarm.status {
                SwarmStatus::Terminated => {
                    debug!(swarm_id = %id, "Swarm already terminated");
                    return Ok(state.swarm.clone());
                }
                // Another caller is draining it; wait alongside
                SwarmStatus::Draining => {}
                SwarmStatus::Active | SwarmStatus::Initializing => {
                    let now = self.clock.now();
                    let mut next = state.clone();
                    next.swarm.begin_draining(now)?;
                    let mut records = vec![Record::Swarm];

                    let pending: Vec<TaskId> = next
                        .tasks
                        .values()
                        .filter(|t| t.status == TaskStatus::Pending)
                        .map(|t| t.id)
                        .collect();
                    for task_id in &pending {
                        if let Some(task) = next.tasks.get_mut(task_id) {
                            task.cancel(SWARM_TERMINATED, now)?;
                            records.push(Record::Task(*task_id));
                        }
                    }
                    self.commit(&mut state, next, &records).await?;

                    for task_id in &pending {
                        self.event_bus.publish_task_event(TaskEvent::TaskCancelled {
                            swarm_id: id,
                            task_id: *task_id,
                            reason: SWARM_TERMINATED.to_string(),
                            cancelled_at: now,
                        });
                    }

                    let in_progress = state.in_progress_count();
                    self.event_bus.publish_swarm_event(SwarmEvent::SwarmDraining {
                        swarm_id: id,
                        cancelled_tasks: pending.len(),
                        in_progress_tasks: in_progress,
                        draining_at: now,
                    });
                    info!(swarm_id = %id, cancelled = pending.len(), in_progress, "Swarm draining");
                }
            }
        }

        if !self.wait_for_settle(&handle).await {
            warn!(
                swarm_id = %id,
                grace_secs = self.config.termination_grace.as_secs(),
                "Termination grace period elapsed with tasks still in progress"
            );
        }

        let mut state = handle.state.lock().await;
        if state.swarm.status == SwarmStatus::Terminated {
            return Ok(state.swarm.clone());
        }
        let now = self.clock.now();
        let mut next = state.clone();
        let mut records = Vec::new();

        let leftovers: Vec<TaskId> = next
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::InProgress)
            .map(|t| t.id)
            .collect();
        for task_id in &leftovers {
            if let Some(task) = next.tasks.get_mut(task_id) {
                task.fail(SWARM_TERMINATED, now)?;
                records.push(Record::Task(*task_id));
            }
        }

        let live: Vec<AgentId> = next
            .agents
            .values()
            .filter(|a| a.is_live())
            .map(|a| a.id)
            .collect();
        for agent_id in &live {
            if let Some(agent) = next.agents.get_mut(agent_id) {
                agent.remove(now)?;
                records.push(Record::Agent(*agent_id));
            }
        }

        next.swarm.mark_terminated(now)?;
        records.push(Record::Swarm);
        self.commit(&mut state, next, &records).await?;
        handle.settled.notify_waiters();

        for task_id in &leftovers {
            if let Some(task) = state.tasks.get(task_id) {
                self.publish_task_failed(task, task.assigned_agent_id.unwrap_or_default());
                warn!(swarm_id = %id, %task_id, "Task failed by swarm termination");
            }
        }
        for agent_id in &live {
            self.event_bus.publish_agent_event(AgentEvent::AgentRemoved {
                swarm_id: id,
                agent_id: *agent_id,
                forced: true,
                removed_at: now,
            });
        }

        self.event_bus.publish_swarm_event(SwarmEvent::SwarmTerminated {
            swarm_id: id,
            removed_agents: live.len(),
            terminated_at: now,
        });
        info!(swarm_id = %id, removed_agents = live.len(), "Swarm terminated");
        Ok(state.swarm.clone())
    }

    async fn scale_swarm(&self, id: SwarmId, max_agents: u32) -> OrchestratorResult<Swarm> {
        let handle = self.handle(id)?;
        let mut state = handle.state.lock().await;
        let now = self.clock.now();

        let live = state.live_agent_count() as u32;
        let mut next = state.clone();
        let previous = next.swarm.scale(max_agents, live, now)?;
        self.commit(&mut state, next, &[Record::Swarm]).await?;

        self.event_bus.publish_swarm_event(SwarmEvent::SwarmScaled {
            swarm_id: id,
            previous_max_agents: previous,
            max_agents,
            scaled_at: now,
        });
        info!(swarm_id = %id, previous, max_agents, "Swarm scaled");

        self.redispatch(&mut state).await;
        Ok(state.swarm.clone())
    }

    async fn get_swarm(&self, id: SwarmId) -> OrchestratorResult<Swarm> {
        let handle = self.handle(id)?;
        let state = handle.state.lock().await;
        Ok(state.swarm.clone())
    }

    async fn list_swarms(&self) -> OrchestratorResult<Vec<Swarm>> {
        let handles: Vec<Arc<SwarmHandle>> =
            self.swarms.iter().map(|h| h.value().clone()).collect();
        let mut swarms = Vec::with_capacity(handles.len());
        for handle in handles {
            swarms.push(handle.state.lock().await.swarm.clone());
        }
        swarms.sort_by_key(|s| s.created_at);
        Ok(swarms)
    }

    async fn swarm_status(&self, id: SwarmId) -> OrchestratorResult<SwarmStatusReport> {
        let handle = self.handle(id)?;
        let state = handle.state.lock().await;
        Ok(SwarmStatusReport {
            swarm: state.swarm.clone(),
            live_agents: state.live_agent_count(),
            agents: state.agent_counts(),
            tasks: state.task_counts(),
        })
    }

    async fn spawn_agent(
        &self,
        swarm_id: SwarmId,
        request: SpawnAgentRequest,
    ) -> OrchestratorResult<Agent> {
        let handle = self.handle(swarm_id)?;
        let mut state = handle.state.lock().await;

        if !state.swarm.is_active() {
            return Err(OrchestratorError::not_found("Active swarm", swarm_id));
        }
        if state.live_agent_count() >= state.swarm.max_agents as usize {
            return Err(OrchestratorError::CapacityExceeded {
                swarm_id,
                max_agents: state.swarm.max_agents,
            });
        }

        let now = self.clock.now();
        let agent = Agent::new(
            swarm_id,
            &request.agent_type,
            request.name,
            request.capabilities,
            now,
        )?;
        let agent_id = agent.id;
        self.save_agent(&agent).await?;
        self.agent_index.insert(agent_id, swarm_id);
        state.agents.insert(agent_id, agent.clone());

        counter!("hive_agents_spawned_total").increment(1);
        self.event_bus.publish_agent_event(AgentEvent::AgentSpawned {
            swarm_id,
            agent_id,
            agent_type: agent.agent_type.clone(),
            name: agent.name.clone(),
            spawned_at: now,
        });
        info!(
            %swarm_id,
            %agent_id,
            agent_type = %agent.agent_type,
            name = %agent.name,
            "Agent spawned"
        );

        self.redispatch(&mut state).await;
        Ok(state.agents.get(&agent_id).cloned().unwrap_or(agent))
    }

    async fn remove_agent(&self, agent_id: AgentId, force: bool) -> OrchestratorResult<Agent> {
        let handle = self.handle_for_agent(agent_id)?;
        let mut state = handle.state.lock().await;
        let now = self.clock.now();

        let mut next = state.clone();
        let agent = next
            .agents
            .get_mut(&agent_id)
            .ok_or_else(|| OrchestratorError::not_found("Agent", agent_id))?;
        if agent.status == AgentStatus::Busy && !force {
            return Err(OrchestratorError::AgentBusy {
                agent_id,
                task_id: agent.current_task,
            });
        }

        let interrupted = agent.remove(now)?;
        let removed = agent.clone();
        let mut records = vec![Record::Agent(agent_id)];

        let mut failed_task = None;
        if let Some(task_id) = interrupted {
            if let Some(task) = next.tasks.get_mut(&task_id) {
                if task.status == TaskStatus::InProgress {
                    task.fail(AGENT_REMOVED, now)?;
                    records.push(Record::Task(task_id));
                    failed_task = Some(task.clone());
                }
            }
        }
        self.commit(&mut state, next, &records).await?;

        if let Some(task) = &failed_task {
            self.publish_task_failed(task, agent_id);
            warn!(
                swarm_id = %removed.swarm_id,
                %agent_id,
                task_id = %task.id,
                "Task failed by forced agent removal"
            );
        }
        if interrupted.is_some() {
            handle.settled.notify_waiters();
        }

        self.event_bus.publish_agent_event(AgentEvent::AgentRemoved {
            swarm_id: removed.swarm_id,
            agent_id,
            forced: interrupted.is_some(),
            removed_at: now,
        });
        info!(swarm_id = %removed.swarm_id, %agent_id, force, "Agent removed");

        self.redispatch(&mut state).await;
        Ok(removed)
    }

    async fn report_agent_error(
        &self,
        agent_id: AgentId,
        reason: String,
    ) -> OrchestratorResult<Agent> {
        let handle = self.handle_for_agent(agent_id)?;
        let mut state = handle.state.lock().await;
        let now = self.clock.now();

        let mut next = state.clone();
        let agent = next
            .agents
            .get_mut(&agent_id)
            .ok_or_else(|| OrchestratorError::not_found("Agent", agent_id))?;
        let from = agent.status;
        let interrupted = agent.mark_error(now)?;
        let errored = agent.clone();
        let mut records = vec![Record::Agent(agent_id)];

        let mut failed_task = None;
        if let Some(task_id) = interrupted {
            if let Some(task) = next.tasks.get_mut(&task_id) {
                task.fail(reason.clone(), now)?;
                records.push(Record::Task(task_id));
                failed_task = Some(task.clone());
            }
        }
        self.commit(&mut state, next, &records).await?;

        self.publish_agent_status(&errored, from);
        warn!(swarm_id = %errored.swarm_id, %agent_id, reason = %reason, "Agent reported an error");
        if let Some(task) = &failed_task {
            self.publish_task_failed(task, agent_id);
        }
        if interrupted.is_some() {
            handle.settled.notify_waiters();
        }

        self.redispatch(&mut state).await;
        Ok(errored)
    }

    async fn get_agent(&self, agent_id: AgentId) -> OrchestratorResult<Agent> {
        let handle = self.handle_for_agent(agent_id)?;
        let state = handle.state.lock().await;
        state
            .agents
            .get(&agent_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::not_found("Agent", agent_id))
    }

    async fn list_agents(&self, swarm_id: SwarmId) -> OrchestratorResult<Vec<Agent>> {
        let handle = self.handle(swarm_id)?;
        let state = handle.state.lock().await;
        let mut agents: Vec<Agent> = state.agents.values().cloned().collect();
        agents.sort_by_key(|a| (a.created_at, a.id));
        Ok(agents)
    }

    async fn submit_task(&self, swarm_id: SwarmId, request: NewTask) -> OrchestratorResult<Task> {
        let handle = self.handle(swarm_id)?;
        let mut state = handle.state.lock().await;
        state.swarm.ensure_accepting_work()?;

        let missing = request
            .dependencies
            .iter()
            .find(|dep| !state.tasks.contains_key(dep));
        if let Some(missing) = missing {
            return Err(OrchestratorError::not_found("Task", missing));
        }

        let now = self.clock.now();
        let sequence = state.next_sequence();
        let task = Task::new(swarm_id, sequence, request, now)?;
        let task_id = task.id;
        self.save_task(&task).await?;
        self.task_index.insert(task_id, swarm_id);
        state.tasks.insert(task_id, task.clone());

        self.event_bus.publish_task_event(TaskEvent::TaskSubmitted {
            swarm_id,
            task_id,
            priority: task.priority.to_string(),
            submitted_at: now,
        });
        info!(
            %swarm_id,
            %task_id,
            priority = %task.priority,
            strategy = %task.strategy,
            sequence,
            "Task submitted"
        );

        self.redispatch(&mut state).await;
        Ok(state.tasks.get(&task_id).cloned().unwrap_or(task))
    }

    async fn report_result(
        &self,
        task_id: TaskId,
        success: bool,
        payload: Option<serde_json::Value>,
    ) -> OrchestratorResult<Task> {
        let handle = self.handle_for_task(task_id)?;
        let mut state = handle.state.lock().await;
        let now = self.clock.now();

        let mut next = state.clone();
        let task = next
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| OrchestratorError::not_found("Task", task_id))?;
        let agent_id = task.report(success, payload, now)?;
        let task = task.clone();
        let mut records = vec![Record::Task(task_id)];

        let mut freed = None;
        if let Some(agent) = next.agents.get_mut(&agent_id) {
            agent.finish_task(success, now)?;
            records.push(Record::Agent(agent_id));
            freed = Some(agent.clone());
        }
        self.commit(&mut state, next, &records).await?;

        if let Some(agent) = &freed {
            self.publish_agent_status(agent, AgentStatus::Busy);
        }

        if success {
            counter!("hive_tasks_completed_total").increment(1);
            self.event_bus.publish_task_event(TaskEvent::TaskCompleted {
                swarm_id: task.swarm_id,
                task_id,
                agent_id,
                completed_at: now,
            });
            info!(swarm_id = %task.swarm_id, %task_id, %agent_id, "Task completed");
        } else {
            self.publish_task_failed(&task, agent_id);
            info!(swarm_id = %task.swarm_id, %task_id, %agent_id, "Task failed; not retried");
        }
        handle.settled.notify_waiters();

        self.redispatch(&mut state).await;
        Ok(task)
    }

    async fn cancel_task(&self, task_id: TaskId) -> OrchestratorResult<Task> {
        let handle = self.handle_for_task(task_id)?;
        let mut state = handle.state.lock().await;
        let now = self.clock.now();

        let mut next = state.clone();
        let task = next
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| OrchestratorError::not_found("Task", task_id))?;
        task.cancel(CANCELLED_BY_CALLER, now)?;
        let task = task.clone();
        self.commit(&mut state, next, &[Record::Task(task_id)]).await?;

        self.event_bus.publish_task_event(TaskEvent::TaskCancelled {
            swarm_id: task.swarm_id,
            task_id,
            reason: CANCELLED_BY_CALLER.to_string(),
            cancelled_at: now,
        });
        info!(swarm_id = %task.swarm_id, %task_id, "Task cancelled");
        Ok(task)
    }

    async fn get_task(&self, task_id: TaskId) -> OrchestratorResult<Task> {
        let handle = self.handle_for_task(task_id)?;
        let state = handle.state.lock().await;
        state
            .tasks
            .get(&task_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::not_found("Task", task_id))
    }

    async fn list_tasks(
        &self,
        swarm_id: SwarmId,
        status: Option<TaskStatus>,
    ) -> OrchestratorResult<Vec<Task>> {
        let handle = self.handle(swarm_id)?;
        let state = handle.state.lock().await;
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| status.map_or(true, |s| t.status == s))
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.sequence);
        Ok(tasks)
    }

    async fn put_memory(
        &self,
        swarm_id: SwarmId,
        namespace: Option<String>,
        key: String,
        value: serde_json::Value,
        ttl_seconds: Option<u64>,
    ) -> OrchestratorResult<MemoryEntry> {
        self.handle(swarm_id)?;
        self.memory
            .put(Self::memory_key(swarm_id, namespace, key), value, ttl_seconds)
            .await
    }

    async fn get_memory(
        &self,
        swarm_id: SwarmId,
        namespace: Option<String>,
        key: String,
    ) -> OrchestratorResult<MemoryEntry> {
        self.handle(swarm_id)?;
        self.memory.get(&Self::memory_key(swarm_id, namespace, key)).await
    }

    async fn delete_memory(
        &self,
        swarm_id: SwarmId,
        namespace: Option<String>,
        key: String,
    ) -> OrchestratorResult<bool> {
        self.handle(swarm_id)?;
        self.memory.delete(&Self::memory_key(swarm_id, namespace, key)).await
    }

    async fn list_memory(
        &self,
        swarm_id: SwarmId,
        namespace: Option<String>,
    ) -> OrchestratorResult<Vec<MemoryEntry>> {
        self.handle(swarm_id)?;
        let namespace = namespace
            .filter(|ns| !ns.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        self.memory.list_by_namespace(swarm_id, &namespace).await
    }
}
