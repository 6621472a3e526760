// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end tests of the daemon HTTP API through `DaemonClient`, with the
//! engine running on the in-memory container runtime.

use std::sync::Arc;
use std::time::Instant;

use hive_core::domain::engine_config::{EngineConfigManifest, RuntimeBackend};
use hive_core::domain::sandbox::SandboxStatus;
use hive_core::TaskId;
use hive_orchestrator::daemon::server::{router, AppState};
use hive_orchestrator::daemon::{DaemonClient, Engine};
use hive_swarm::application::{CreateSwarmRequest, SpawnAgentRequest};
use hive_swarm::domain::{
    AgentStatus, NewTask, SwarmStatus, SwarmStrategy, SwarmTopology, TaskStatus,
};

async fn start_daemon() -> DaemonClient {
    let mut config = EngineConfigManifest::default();
    config.spec.sandbox.runtime = RuntimeBackend::Mock;

    let engine = Engine::from_config(&config).unwrap();
    engine.initialize().await.unwrap();
    let state = Arc::new(AppState {
        coordinator: engine.coordinator.clone(),
        sandboxes: engine.sandboxes.clone(),
        event_bus: engine.event_bus.clone(),
        start_time: Instant::now(),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    DaemonClient::new("127.0.0.1", port).unwrap()
}

fn swarm_request(max_agents: u32) -> CreateSwarmRequest {
    CreateSwarmRequest {
        name: Some("api-test".to_string()),
        topology: SwarmTopology::Mesh,
        strategy: SwarmStrategy::Balanced,
        max_agents,
    }
}

fn agent_request(agent_type: &str) -> SpawnAgentRequest {
    SpawnAgentRequest {
        agent_type: agent_type.to_string(),
        name: None,
        capabilities: vec!["rust".to_string()],
    }
}

#[tokio::test]
async fn test_health_reports_version() {
    let client = start_daemon().await;
    let health = client.health().await.unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_swarm_agent_task_flow() {
    let client = start_daemon().await;

    let swarm = client.create_swarm(&swarm_request(2)).await.unwrap();
    assert_eq!(swarm.status, SwarmStatus::Active);
    assert_eq!(swarm.name, "api-test");

    let agent = client.spawn_agent(swarm.id, &agent_request("coder")).await.unwrap();
    assert_eq!(agent.status, AgentStatus::Idle);

    let task = client
        .submit_task(swarm.id, &NewTask::new("compile the crate").requiring("rust"))
        .await
        .unwrap();

    // An idle, capable agent takes the task as part of submission
    let task = client.get_task(task.id).await.unwrap();
    assert_eq!(task.status, TaskStatus::InProgress);
    assert_eq!(task.assigned_agent_id, Some(agent.id));
    assert_eq!(client.get_agent(agent.id).await.unwrap().status, AgentStatus::Busy);

    let in_progress = client
        .list_tasks(swarm.id, Some(TaskStatus::InProgress))
        .await
        .unwrap();
    assert_eq!(in_progress.len(), 1);

    let done = client
        .report_result(task.id, true, Some(serde_json::json!({"artifacts": 3})))
        .await
        .unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.result, Some(serde_json::json!({"artifacts": 3})));

    let agent = client.get_agent(agent.id).await.unwrap();
    assert_eq!(agent.status, AgentStatus::Idle);
    assert_eq!(agent.metrics.tasks_completed, 1);

    let report = client.swarm_status(swarm.id).await.unwrap();
    assert_eq!(report.live_agents, 1);
    assert_eq!(report.tasks.get(&TaskStatus::Completed), Some(&1));

    let terminated = client.terminate_swarm(swarm.id).await.unwrap();
    assert_eq!(terminated.status, SwarmStatus::Terminated);
    let agents = client.list_agents(swarm.id).await.unwrap();
    assert!(agents.iter().all(|a| a.status == AgentStatus::Removed));
}

#[tokio::test]
async fn test_errors_carry_their_kind() {
    let client = start_daemon().await;
    let swarm = client.create_swarm(&swarm_request(1)).await.unwrap();
    client.spawn_agent(swarm.id, &agent_request("coder")).await.unwrap();

    let err = client
        .spawn_agent(swarm.id, &agent_request("tester"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("capacity_exceeded"), "{}", err);

    let err = client.get_task(TaskId::new()).await.unwrap_err();
    assert!(err.to_string().contains("not_found"), "{}", err);

    let err = client.scale_swarm(swarm.id, 0).await.unwrap_err();
    assert!(err.to_string().contains("invalid_configuration"), "{}", err);
}

#[tokio::test]
async fn test_memory_round_trip_with_encoded_namespace() {
    let client = start_daemon().await;
    let swarm = client.create_swarm(&swarm_request(2)).await.unwrap();

    let entry = client
        .put_memory(swarm.id, "team notes", "plan", serde_json::json!({"step": 1}), None)
        .await
        .unwrap();
    assert_eq!(entry.namespace, "team notes");

    let read = client.get_memory(swarm.id, "team notes", "plan").await.unwrap();
    assert_eq!(read.value, serde_json::json!({"step": 1}));
    assert_eq!(read.access_count, 1);

    let listed = client.list_memory(swarm.id, "team notes").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(client.list_memory(swarm.id, "default").await.unwrap().is_empty());

    assert!(client.delete_memory(swarm.id, "team notes", "plan").await.unwrap());
    assert!(!client.delete_memory(swarm.id, "team notes", "plan").await.unwrap());
    let err = client.get_memory(swarm.id, "team notes", "plan").await.unwrap_err();
    assert!(err.to_string().contains("not_found"), "{}", err);
}

#[tokio::test]
async fn test_sandbox_lifecycle_on_mock_runtime() {
    let client = start_daemon().await;

    let sandbox = client
        .create_sandbox("project-api".to_string(), None, None)
        .await
        .unwrap();
    assert_eq!(sandbox.status, SandboxStatus::Running);
    let port = sandbox.allocated_port.unwrap();
    assert!((8010..8090).contains(&port));

    let by_project = client.get_sandbox_by_project("project-api").await.unwrap();
    assert_eq!(by_project.id, sandbox.id);
    assert_eq!(client.list_sandboxes().await.unwrap().len(), 1);

    let err = client
        .create_sandbox("other".to_string(), Some("evil/image:latest".to_string()), None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("invalid_configuration"), "{}", err);

    let stopped = client.stop_sandbox(sandbox.id).await.unwrap();
    assert_eq!(stopped.status, SandboxStatus::Stopped);
    assert_eq!(stopped.allocated_port, None);

    let reconciled = client.reconcile_sandboxes().await.unwrap();
    assert_eq!(reconciled.failed, 0);
}

#[tokio::test]
async fn test_unknown_enum_values_are_invalid_configuration() {
    let client = start_daemon().await;
    let http = reqwest::Client::new();

    let response = http
        .post(format!("{}/api/swarms", client.base_url()))
        .json(&serde_json::json!({
            "topology": "torus",
            "strategy": "balanced",
            "max_agents": 2
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "invalid_configuration");
    assert!(body["error"].as_str().unwrap().contains("torus"));

    let swarm = client.create_swarm(&swarm_request(2)).await.unwrap();
    let response = http
        .post(format!("{}/api/swarms/{}/tasks", client.base_url(), swarm.id))
        .json(&serde_json::json!({
            "description": "ship it",
            "priority": "urgent",
            "strategy": "parallel"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "invalid_configuration");

    assert!(client.list_tasks(swarm.id, None).await.unwrap().is_empty());
}
