// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0

use hive_core::application::sandbox_manager::{
    SandboxManagerConfig, SandboxService, StandardSandboxService,
};
use hive_core::domain::events::SandboxEvent;
use hive_core::domain::ids::ProjectId;
use hive_core::domain::port_pool::PortPool;
use hive_core::domain::sandbox::SandboxStatus;
use hive_core::domain::OrchestratorError;
use hive_core::infrastructure::event_bus::{DomainEvent, EventBus};
use hive_core::infrastructure::repositories::InMemorySandboxRepository;
use hive_core::infrastructure::runtime::MockContainerRuntime;
use hive_core::domain::repository::SandboxRepository;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

struct Harness {
    service: Arc<StandardSandboxService>,
    runtime: Arc<MockContainerRuntime>,
    repository: Arc<InMemorySandboxRepository>,
    event_bus: Arc<EventBus>,
}

fn harness(pool_size: u16) -> Harness {
    let runtime = Arc::new(MockContainerRuntime::new());
    let repository = Arc::new(InMemorySandboxRepository::new());
    let event_bus = Arc::new(EventBus::with_default_capacity());
    let service = Arc::new(StandardSandboxService::new(
        Arc::new(PortPool::new(8010, pool_size).unwrap()),
        runtime.clone(),
        repository.clone(),
        event_bus.clone(),
        SandboxManagerConfig {
            start_timeout: Duration::from_millis(500),
            stop_grace: Duration::from_millis(100),
            ..SandboxManagerConfig::default()
        },
    ));
    Harness { service, runtime, repository, event_bus }
}

#[tokio::test]
async fn test_create_twice_for_same_project_fails_with_already_exists() {
    let h = harness(80);
    h.service.initialize().await.unwrap();
    assert!(h.runtime.has_network("hive-sandbox-isolated"));

    let first = h
        .service
        .create_sandbox(ProjectId::new("proj-1"), None, None)
        .await
        .unwrap();
    assert_eq!(first.status, SandboxStatus::Running);

    let second = h.service.create_sandbox(ProjectId::new("proj-1"), None, None).await;
    match second {
        Err(OrchestratorError::AlreadyExists { entity, id }) => {
            assert_eq!(entity, "Sandbox");
            assert!(id.contains(&first.id.to_string()));
        }
        other => panic!("expected AlreadyExists, got {:?}", other),
    }
}

#[tokio::test]
async fn test_full_lifecycle_is_written_through_and_published() {
    let h = harness(80);
    let mut events = h.event_bus.subscribe();

    let sandbox = h
        .service
        .create_sandbox(ProjectId::new("proj-1"), None, None)
        .await
        .unwrap();
    let stored = h.repository.find_by_id(sandbox.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SandboxStatus::Running);

    h.service.stop_sandbox(sandbox.id).await.unwrap();
    let stored = h.repository.find_by_id(sandbox.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SandboxStatus::Stopped);
    assert_eq!(stored.allocated_port, None);

    let mut seen = Vec::new();
    while let Ok(Ok(event)) = timeout(Duration::from_millis(50), events.recv()).await {
        if let DomainEvent::Sandbox(event) = event {
            seen.push(event);
        }
    }
    assert!(matches!(seen[0], SandboxEvent::SandboxCreated { .. }));
    assert!(matches!(seen[1], SandboxEvent::SandboxRunning { port: 8010, .. }));
    assert!(matches!(seen[2], SandboxEvent::SandboxStopped { forced: false, .. }));
}

#[tokio::test]
async fn test_ports_are_reused_after_stop() {
    let h = harness(2);
    let a = h.service.create_sandbox(ProjectId::new("a"), None, None).await.unwrap();
    let b = h.service.create_sandbox(ProjectId::new("b"), None, None).await.unwrap();
    assert_eq!((a.allocated_port, b.allocated_port), (Some(8010), Some(8011)));

    assert!(matches!(
        h.service.create_sandbox(ProjectId::new("c"), None, None).await,
        Err(OrchestratorError::PoolExhausted { .. })
    ));

    h.service.stop_sandbox(a.id).await.unwrap();
    let c = h.service.create_sandbox(ProjectId::new("c"), None, None).await.unwrap();
    assert_eq!(c.allocated_port, Some(8010));
}

#[tokio::test]
async fn test_concurrent_creates_never_share_a_port() {
    let h = harness(80);
    let mut handles = Vec::new();
    for i in 0..20 {
        let service = h.service.clone();
        handles.push(tokio::spawn(async move {
            service
                .create_sandbox(ProjectId::new(format!("proj-{}", i)), None, None)
                .await
        }));
    }

    let mut ports = Vec::new();
    for handle in handles {
        let sandbox = handle.await.unwrap().unwrap();
        ports.push(sandbox.allocated_port.unwrap());
    }
    ports.sort_unstable();
    ports.dedup();
    assert_eq!(ports.len(), 20);
    assert!(ports.iter().all(|p| (8010..8090).contains(p)));
}

#[tokio::test]
async fn test_failed_start_publishes_error_and_releases_port() {
    let h = harness(80);
    let mut events = h.event_bus.subscribe();
    h.runtime.fail_next_starts(2);

    let err = h
        .service
        .create_sandbox(ProjectId::new("proj-1"), None, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "runtime_failure");
    assert_eq!(h.service.port_pool().in_use(), 0);

    let mut saw_error = false;
    while let Ok(Ok(event)) = timeout(Duration::from_millis(50), events.recv()).await {
        if let DomainEvent::Sandbox(SandboxEvent::SandboxError { reason, .. }) = event {
            assert!(reason.contains("injected failure"));
            saw_error = true;
        }
    }
    assert!(saw_error);

    // A failed sandbox blocks its project until it is reset
    assert!(matches!(
        h.service.create_sandbox(ProjectId::new("proj-1"), None, None).await,
        Err(OrchestratorError::AlreadyExists { .. })
    ));
}
