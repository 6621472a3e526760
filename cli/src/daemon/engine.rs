// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Engine wiring
//!
//! Builds every engine component from an [`EngineConfigManifest`] and owns
//! the background loops (memory sweeper, sandbox reconciler).

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use hive_core::application::{
    SandboxManagerConfig, SandboxReconciler, SandboxReconcilerConfig, StandardSandboxService,
};
use hive_core::domain::engine_config::EngineConfigManifest;
use hive_core::domain::port_pool::PortPool;
use hive_core::infrastructure::event_bus::EventBus;
use hive_core::infrastructure::repositories::InMemorySandboxRepository;
use hive_core::infrastructure::runtime::create_container_runtime;
use hive_core::{Clock, SystemClock};
use hive_swarm::application::{
    CoordinatorConfig, MemoryStore, MemorySweeper, MemorySweeperConfig, StandardSwarmCoordinator,
};
use hive_swarm::infrastructure::{
    InMemoryAgentRepository, InMemoryMemoryRepository, InMemorySwarmRepository,
    InMemoryTaskRepository,
};

pub struct Engine {
    pub coordinator: Arc<StandardSwarmCoordinator>,
    pub sandboxes: Arc<StandardSandboxService>,
    pub event_bus: Arc<EventBus>,
    sweeper: Arc<MemorySweeper>,
    reconciler: Arc<SandboxReconciler>,
}

impl Engine {
    /// Build the engine. Nothing touches the container runtime until
    /// [`Engine::initialize`].
    pub fn from_config(config: &EngineConfigManifest) -> Result<Self> {
        let spec = &config.spec;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let event_bus = Arc::new(EventBus::with_default_capacity());

        let pool = Arc::new(
            PortPool::new(spec.port_pool.base, spec.port_pool.size)
                .context("Invalid port pool configuration")?,
        );
        let runtime =
            create_container_runtime(&spec.sandbox.runtime, spec.sandbox.docker_socket.clone())
                .context("Failed to create container runtime")?;
        let sandboxes = Arc::new(StandardSandboxService::new(
            pool,
            runtime,
            Arc::new(InMemorySandboxRepository::new()),
            event_bus.clone(),
            SandboxManagerConfig::from(&spec.sandbox),
        ));

        let memory = Arc::new(MemoryStore::new(
            Arc::new(InMemoryMemoryRepository::new()),
            clock.clone(),
            event_bus.clone(),
        ));
        let coordinator = Arc::new(StandardSwarmCoordinator::new(
            Arc::new(InMemorySwarmRepository::new()),
            Arc::new(InMemoryAgentRepository::new()),
            Arc::new(InMemoryTaskRepository::new()),
            memory.clone(),
            event_bus.clone(),
            clock,
            CoordinatorConfig::from(&spec.swarm),
        ));

        let sweeper = Arc::new(MemorySweeper::new(
            memory,
            MemorySweeperConfig {
                interval_seconds: spec.swarm.memory_sweep_interval_seconds,
                enabled: true,
            },
        ));
        let reconciler = Arc::new(SandboxReconciler::new(
            sandboxes.clone(),
            SandboxReconcilerConfig {
                interval_seconds: spec.sandbox.reconcile_interval_seconds,
                ..SandboxReconcilerConfig::default()
            },
        ));

        Ok(Self {
            coordinator,
            sandboxes,
            event_bus,
            sweeper,
            reconciler,
        })
    }

    /// Check the container runtime and load persisted swarms.
    pub async fn initialize(&self) -> Result<()> {
        self.sandboxes
            .initialize()
            .await
            .context("Container runtime is not ready")?;
        let restored = self
            .coordinator
            .restore()
            .await
            .context("Failed to restore swarms")?;
        info!(restored, "Engine initialized");
        Ok(())
    }

    pub fn start_background_tasks(&self) -> Vec<JoinHandle<()>> {
        vec![self.sweeper.clone().start(), self.reconciler.clone().start()]
    }

    pub fn shutdown(&self) {
        self.sweeper.shutdown_token().cancel();
        self.reconciler.shutdown_token().cancel();
    }
}
