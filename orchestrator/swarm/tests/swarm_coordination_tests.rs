// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hive_core::domain::events::{AgentEvent, TaskEvent};
use hive_core::domain::repository::RepositoryError;
use hive_core::infrastructure::event_bus::{DomainEvent, EventBus};
use hive_core::{AgentId, Clock, ManualClock, OrchestratorError, SwarmId, TaskId};
use hive_swarm::application::{
    CoordinatorConfig, CreateSwarmRequest, MemoryStore, SpawnAgentRequest, StandardSwarmCoordinator,
    SwarmCoordinator,
};
use hive_swarm::domain::agent::{Agent, AgentStatus};
use hive_swarm::domain::repository::{AgentRepository, TaskRepository};
use hive_swarm::domain::swarm::{SwarmStatus, SwarmStrategy, SwarmTopology};
use hive_swarm::domain::task::{NewTask, TaskPriority, TaskStatus, TaskStrategy};
use hive_swarm::infrastructure::{
    InMemoryAgentRepository, InMemoryMemoryRepository, InMemorySwarmRepository,
    InMemoryTaskRepository,
};

struct Harness {
    coordinator: Arc<StandardSwarmCoordinator>,
    clock: Arc<ManualClock>,
    event_bus: Arc<EventBus>,
    swarms: Arc<InMemorySwarmRepository>,
    agents: Arc<InMemoryAgentRepository>,
    tasks: Arc<InMemoryTaskRepository>,
}

fn harness(grace: Duration) -> Harness {
    let clock = Arc::new(ManualClock::default());
    let event_bus = Arc::new(EventBus::with_default_capacity());
    let swarms = Arc::new(InMemorySwarmRepository::new());
    let agents = Arc::new(InMemoryAgentRepository::new());
    let tasks = Arc::new(InMemoryTaskRepository::new());
    let memory = Arc::new(MemoryStore::new(
        Arc::new(InMemoryMemoryRepository::new()),
        clock.clone(),
        event_bus.clone(),
    ));
    let coordinator = Arc::new(StandardSwarmCoordinator::new(
        swarms.clone(),
        agents.clone(),
        tasks.clone(),
        memory,
        event_bus.clone(),
        clock.clone(),
        CoordinatorConfig {
            termination_grace: grace,
        },
    ));
    Harness {
        coordinator,
        clock,
        event_bus,
        swarms,
        agents,
        tasks,
    }
}

fn agent(agent_type: &str, capabilities: &[&str]) -> SpawnAgentRequest {
    SpawnAgentRequest {
        agent_type: agent_type.to_string(),
        name: None,
        capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
    }
}

fn swarm(max_agents: u32) -> CreateSwarmRequest {
    CreateSwarmRequest {
        name: Some("build".to_string()),
        topology: SwarmTopology::Mesh,
        strategy: SwarmStrategy::Balanced,
        max_agents,
    }
}

fn dispatched_tasks(
    receiver: &mut hive_core::infrastructure::event_bus::EventReceiver,
) -> Vec<TaskId> {
    let mut order = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        if let DomainEvent::Task(TaskEvent::TaskDispatched { task_id, .. }) = event {
            order.push(task_id);
        }
    }
    order
}

#[tokio::test]
async fn test_priority_then_fifo_dispatch_with_three_agents() {
    let h = harness(Duration::from_secs(1));
    let s = h.coordinator.create_swarm(swarm(3)).await.unwrap();
    let mut events = h.event_bus.subscribe();

    // Queue everything first so that each spawn picks from the full backlog
    let low = h
        .coordinator
        .submit_task(s.id, NewTask::new("low").with_priority(TaskPriority::Low))
        .await
        .unwrap();
    let medium_1 = h
        .coordinator
        .submit_task(s.id, NewTask::new("medium 1").with_priority(TaskPriority::Medium))
        .await
        .unwrap();
    let medium_2 = h
        .coordinator
        .submit_task(s.id, NewTask::new("medium 2").with_priority(TaskPriority::Medium))
        .await
        .unwrap();
    let high = h
        .coordinator
        .submit_task(s.id, NewTask::new("high").with_priority(TaskPriority::High))
        .await
        .unwrap();

    for _ in 0..3 {
        h.coordinator.spawn_agent(s.id, agent("coder", &[])).await.unwrap();
    }

    assert_eq!(dispatched_tasks(&mut events), vec![high.id, medium_1.id, medium_2.id]);
    let low_now = h.coordinator.get_task(low.id).await.unwrap();
    assert_eq!(low_now.status, TaskStatus::Pending);

    // Freeing one agent lets the low-priority task run
    h.coordinator.report_result(high.id, true, None).await.unwrap();
    assert_eq!(dispatched_tasks(&mut events), vec![low.id]);

    let low_now = h.coordinator.get_task(low.id).await.unwrap();
    assert_eq!(low_now.status, TaskStatus::InProgress);
    let high_now = h.coordinator.get_task(high.id).await.unwrap();
    assert_eq!(low_now.assigned_agent_id, high_now.assigned_agent_id);
}

#[tokio::test]
async fn test_failed_report_is_not_retried() {
    let h = harness(Duration::from_secs(1));
    let s = h.coordinator.create_swarm(swarm(1)).await.unwrap();
    let worker = h.coordinator.spawn_agent(s.id, agent("coder", &[])).await.unwrap();
    let task = h.coordinator.submit_task(s.id, NewTask::new("flaky")).await.unwrap();
    assert_eq!(task.status, TaskStatus::InProgress);

    let failed = h
        .coordinator
        .report_result(task.id, false, Some(serde_json::json!({"error": "exit 1"})))
        .await
        .unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);

    let worker = h.coordinator.get_agent(worker.id).await.unwrap();
    assert_eq!(worker.status, AgentStatus::Idle);
    assert_eq!(worker.metrics.tasks_failed, 1);

    // Another state change runs a dispatch cycle; the failed task stays put
    h.coordinator.scale_swarm(s.id, 2).await.unwrap();
    let task = h.coordinator.get_task(task.id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);

    // Resubmission is the only way to run it again
    let retry = h.coordinator.submit_task(s.id, NewTask::new("flaky")).await.unwrap();
    assert_ne!(retry.id, task.id);
    assert_eq!(retry.status, TaskStatus::InProgress);
}

#[tokio::test]
async fn test_in_progress_tasks_always_have_a_busy_agent() {
    let h = harness(Duration::from_secs(1));
    let s = h.coordinator.create_swarm(swarm(4)).await.unwrap();
    h.coordinator.spawn_agent(s.id, agent("coder", &["rust"])).await.unwrap();
    h.coordinator.spawn_agent(s.id, agent("tester", &["qa"])).await.unwrap();

    for i in 0..6 {
        let request = if i % 2 == 0 {
            NewTask::new(format!("build {}", i)).requiring("rust")
        } else {
            NewTask::new(format!("verify {}", i)).requiring("qa")
        };
        h.coordinator.submit_task(s.id, request).await.unwrap();
    }

    loop {
        let running = h
            .coordinator
            .list_tasks(s.id, Some(TaskStatus::InProgress))
            .await
            .unwrap();
        if running.is_empty() {
            break;
        }
        for task in &running {
            let agent_id = task.assigned_agent_id.unwrap();
            let worker = h.coordinator.get_agent(agent_id).await.unwrap();
            assert_eq!(worker.status, AgentStatus::Busy);
            assert_eq!(worker.current_task, Some(task.id));
            assert!(task.required_capabilities.is_subset(&worker.capabilities));
        }
        h.coordinator.report_result(running[0].id, true, None).await.unwrap();
    }

    let completed = h
        .coordinator
        .list_tasks(s.id, Some(TaskStatus::Completed))
        .await
        .unwrap();
    assert_eq!(completed.len(), 6);
}

#[tokio::test]
async fn test_task_without_capable_agent_waits() {
    let h = harness(Duration::from_secs(1));
    let s = h.coordinator.create_swarm(swarm(2)).await.unwrap();
    h.coordinator.spawn_agent(s.id, agent("coder", &["rust"])).await.unwrap();

    let gpu = h
        .coordinator
        .submit_task(s.id, NewTask::new("train").requiring("gpu"))
        .await
        .unwrap();
    assert_eq!(gpu.status, TaskStatus::Pending);

    let trainer = h
        .coordinator
        .spawn_agent(s.id, agent("trainer", &["gpu", "python"]))
        .await
        .unwrap();
    assert_eq!(trainer.status, AgentStatus::Busy);
    assert_eq!(trainer.current_task, Some(gpu.id));
}

#[tokio::test]
async fn test_dependent_task_waits_for_completion() {
    let h = harness(Duration::from_secs(1));
    let s = h.coordinator.create_swarm(swarm(2)).await.unwrap();
    h.coordinator.spawn_agent(s.id, agent("coder", &[])).await.unwrap();
    h.coordinator.spawn_agent(s.id, agent("coder", &[])).await.unwrap();

    let build = h.coordinator.submit_task(s.id, NewTask::new("build")).await.unwrap();
    let deploy = h
        .coordinator
        .submit_task(s.id, NewTask::new("deploy").after(build.id))
        .await
        .unwrap();
    assert_eq!(deploy.status, TaskStatus::Pending);

    h.coordinator.report_result(build.id, true, None).await.unwrap();
    let deploy = h.coordinator.get_task(deploy.id).await.unwrap();
    assert_eq!(deploy.status, TaskStatus::InProgress);
}

#[tokio::test]
async fn test_sequential_task_runs_alone() {
    let h = harness(Duration::from_secs(1));
    let s = h.coordinator.create_swarm(swarm(3)).await.unwrap();
    for _ in 0..3 {
        h.coordinator.spawn_agent(s.id, agent("coder", &[])).await.unwrap();
    }

    let migrate = h
        .coordinator
        .submit_task(
            s.id,
            NewTask::new("migrate schema")
                .with_priority(TaskPriority::Critical)
                .with_strategy(TaskStrategy::Sequential),
        )
        .await
        .unwrap();
    assert_eq!(migrate.status, TaskStatus::InProgress);

    let other = h
        .coordinator
        .submit_task(s.id, NewTask::new("lint").with_strategy(TaskStrategy::Parallel))
        .await
        .unwrap();
    assert_eq!(other.status, TaskStatus::Pending);

    h.coordinator.report_result(migrate.id, true, None).await.unwrap();
    let other = h.coordinator.get_task(other.id).await.unwrap();
    assert_eq!(other.status, TaskStatus::InProgress);
}

#[tokio::test]
async fn test_capacity_and_unknown_swarm() {
    let h = harness(Duration::from_secs(1));
    let s = h.coordinator.create_swarm(swarm(1)).await.unwrap();
    h.coordinator.spawn_agent(s.id, agent("coder", &[])).await.unwrap();

    let err = h.coordinator.spawn_agent(s.id, agent("coder", &[])).await.unwrap_err();
    assert_eq!(err.kind(), "capacity_exceeded");

    let err = h
        .coordinator
        .spawn_agent(hive_core::SwarmId::new(), agent("coder", &[]))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::NotFound { entity: "Swarm", .. }));

    let err = h
        .coordinator
        .submit_task(s.id, NewTask::new("   "))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_configuration");
}

#[tokio::test]
async fn test_terminate_waits_for_running_task_within_grace() {
    let h = harness(Duration::from_secs(5));
    let s = h.coordinator.create_swarm(swarm(1)).await.unwrap();
    let worker = h.coordinator.spawn_agent(s.id, agent("coder", &[])).await.unwrap();
    let task = h.coordinator.submit_task(s.id, NewTask::new("long job")).await.unwrap();

    let coordinator = h.coordinator.clone();
    let terminate = tokio::spawn(async move { coordinator.terminate_swarm(s.id).await });

    // Wait for the swarm to start draining before finishing the task
    loop {
        if h.coordinator.get_swarm(s.id).await.unwrap().status == SwarmStatus::Draining {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    h.coordinator.report_result(task.id, true, None).await.unwrap();

    let terminated = tokio::time::timeout(Duration::from_secs(2), terminate)
        .await
        .expect("terminate finished within the grace period")
        .unwrap()
        .unwrap();
    assert_eq!(terminated.status, SwarmStatus::Terminated);

    let task = h.coordinator.get_task(task.id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    let worker = h.coordinator.get_agent(worker.id).await.unwrap();
    assert_eq!(worker.status, AgentStatus::Removed);

    // Terminated swarms stay queryable
    let status = h.coordinator.swarm_status(s.id).await.unwrap();
    assert_eq!(status.live_agents, 0);
    assert_eq!(status.tasks.get(&TaskStatus::Completed), Some(&1));
}

#[tokio::test]
async fn test_agent_status_events_follow_dispatch_and_report() {
    let h = harness(Duration::from_secs(1));
    let s = h.coordinator.create_swarm(swarm(1)).await.unwrap();
    let mut events = h.event_bus.subscribe_swarm(s.id);

    let worker = h.coordinator.spawn_agent(s.id, agent("coder", &[])).await.unwrap();
    let task = h.coordinator.submit_task(s.id, NewTask::new("t")).await.unwrap();
    h.coordinator.report_result(task.id, true, None).await.unwrap();

    let mut transitions = Vec::new();
    for _ in 0..6 {
        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        if let DomainEvent::Agent(AgentEvent::AgentStatusChanged {
            agent_id, from, to, ..
        }) = event
        {
            assert_eq!(agent_id, worker.id);
            transitions.push((from, to));
        }
    }
    assert_eq!(
        transitions,
        vec![
            ("idle".to_string(), "busy".to_string()),
            ("busy".to_string(), "idle".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_memory_ttl_through_coordinator() {
    let h = harness(Duration::from_secs(1));
    let s = h.coordinator.create_swarm(swarm(1)).await.unwrap();

    h.coordinator
        .put_memory(
            s.id,
            Some("plans".to_string()),
            "step".to_string(),
            serde_json::json!({"n": 1}),
            Some(60),
        )
        .await
        .unwrap();
    h.coordinator
        .put_memory(s.id, None, "pinned".to_string(), serde_json::json!("keep"), None)
        .await
        .unwrap();

    let entry = h
        .coordinator
        .get_memory(s.id, Some("plans".to_string()), "step".to_string())
        .await
        .unwrap();
    assert_eq!(entry.value, serde_json::json!({"n": 1}));

    h.clock.advance(chrono::Duration::seconds(61));
    let err = h
        .coordinator
        .get_memory(s.id, Some("plans".to_string()), "step".to_string())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");

    let pinned = h
        .coordinator
        .get_memory(s.id, None, "pinned".to_string())
        .await
        .unwrap();
    assert_eq!(pinned.value, serde_json::json!("keep"));
}

#[tokio::test]
async fn test_restore_rebuilds_swarms_from_store() {
    let h = harness(Duration::from_secs(1));
    let s = h.coordinator.create_swarm(swarm(2)).await.unwrap();
    h.coordinator.spawn_agent(s.id, agent("coder", &[])).await.unwrap();
    let first = h.coordinator.submit_task(s.id, NewTask::new("first")).await.unwrap();

    let event_bus = Arc::new(EventBus::with_default_capacity());
    let clock: Arc<dyn Clock> = h.clock.clone();
    let fresh = StandardSwarmCoordinator::new(
        h.swarms.clone(),
        h.agents.clone(),
        h.tasks.clone(),
        Arc::new(MemoryStore::new(
            Arc::new(InMemoryMemoryRepository::new()),
            clock.clone(),
            event_bus.clone(),
        )),
        event_bus,
        clock,
        CoordinatorConfig::default(),
    );
    assert_eq!(fresh.restore().await.unwrap(), 1);
    assert_eq!(fresh.restore().await.unwrap(), 0);

    let task = fresh.get_task(first.id).await.unwrap();
    assert_eq!(task.status, TaskStatus::InProgress);

    let second = fresh.submit_task(s.id, NewTask::new("second")).await.unwrap();
    assert!(second.sequence > task.sequence);
}

/// Agent store whose writes fail while `failing` is set.
struct FailingAgentRepository {
    inner: InMemoryAgentRepository,
    failing: AtomicBool,
}

#[async_trait]
impl AgentRepository for FailingAgentRepository {
    async fn save(&self, agent: &Agent) -> Result<(), RepositoryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RepositoryError::Backend("agent store offline".to_string()));
        }
        self.inner.save(agent).await
    }

    async fn find_by_id(&self, id: AgentId) -> Result<Option<Agent>, RepositoryError> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_swarm(&self, swarm_id: SwarmId) -> Result<Vec<Agent>, RepositoryError> {
        self.inner.find_by_swarm(swarm_id).await
    }

    async fn delete(&self, id: AgentId) -> Result<(), RepositoryError> {
        self.inner.delete(id).await
    }
}

#[tokio::test]
async fn test_store_failure_leaves_agent_and_task_unchanged() {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
    let event_bus = Arc::new(EventBus::with_default_capacity());
    let agents = Arc::new(FailingAgentRepository {
        inner: InMemoryAgentRepository::new(),
        failing: AtomicBool::new(false),
    });
    let tasks = Arc::new(InMemoryTaskRepository::new());
    let coordinator = StandardSwarmCoordinator::new(
        Arc::new(InMemorySwarmRepository::new()),
        agents.clone(),
        tasks.clone(),
        Arc::new(MemoryStore::new(
            Arc::new(InMemoryMemoryRepository::new()),
            clock.clone(),
            event_bus.clone(),
        )),
        event_bus,
        clock,
        CoordinatorConfig {
            termination_grace: Duration::from_millis(50),
        },
    );

    let s = coordinator.create_swarm(swarm(2)).await.unwrap();
    let worker = coordinator.spawn_agent(s.id, agent("coder", &[])).await.unwrap();
    let task = coordinator.submit_task(s.id, NewTask::new("build")).await.unwrap();
    assert_eq!(task.status, TaskStatus::InProgress);

    agents.failing.store(true, Ordering::SeqCst);

    // Forced removal fails on the agent write and nothing moves
    let err = coordinator.remove_agent(worker.id, true).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::StoreFailure { .. }), "{}", err);
    assert!(err.to_string().contains(&worker.id.to_string()), "{}", err);
    assert_eq!(coordinator.get_agent(worker.id).await.unwrap().status, AgentStatus::Busy);
    assert_eq!(coordinator.get_task(task.id).await.unwrap().status, TaskStatus::InProgress);

    // The task write succeeds before the agent write fails; it is rolled back
    let err = coordinator.report_result(task.id, true, None).await.unwrap_err();
    assert_eq!(err.kind(), "store_failure");
    assert_eq!(coordinator.get_task(task.id).await.unwrap().status, TaskStatus::InProgress);
    let stored = tasks.find_by_id(task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::InProgress);
    assert_eq!(coordinator.get_agent(worker.id).await.unwrap().status, AgentStatus::Busy);

    let err = coordinator.terminate_swarm(s.id).await.unwrap_err();
    assert_eq!(err.kind(), "store_failure");
    assert_eq!(coordinator.get_task(task.id).await.unwrap().status, TaskStatus::InProgress);
    assert_eq!(coordinator.get_agent(worker.id).await.unwrap().status, AgentStatus::Busy);

    // Once the store recovers the same calls go through consistently
    agents.failing.store(false, Ordering::SeqCst);
    let done = coordinator.report_result(task.id, true, None).await.unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(coordinator.get_agent(worker.id).await.unwrap().status, AgentStatus::Idle);

    let terminated = coordinator.terminate_swarm(s.id).await.unwrap();
    assert_eq!(terminated.status, SwarmStatus::Terminated);
    let stored = agents.find_by_id(worker.id).await.unwrap().unwrap();
    assert_eq!(stored.status, AgentStatus::Removed);
}
