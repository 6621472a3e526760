// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Container Runtime Adapters
//!
//! `DockerRuntime` drives a local Docker daemon through bollard.
//! `MockContainerRuntime` keeps containers in memory for tests and for
//! running the daemon without Docker (`sandbox.runtime: mock`).

use crate::domain::engine_config::RuntimeBackend;
use crate::domain::runtime::{
    ContainerRef, ContainerRuntime, ContainerSpec, ContainerState, ContainerSummary, RuntimeError,
};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerStateStatusEnum, HostConfig, PortBinding};
use bollard::network::{CreateNetworkOptions, InspectNetworkOptions};
use bollard::Docker;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Keeps an otherwise idle sandbox container alive.
const KEEPALIVE_COMMAND: &str = "while true; do sleep 30; done";

/// Create the runtime selected by configuration.
pub fn create_container_runtime(
    backend: &RuntimeBackend,
    socket_path: Option<String>,
) -> Result<Arc<dyn ContainerRuntime>, RuntimeError> {
    match backend {
        RuntimeBackend::Docker => Ok(Arc::new(DockerRuntime::new(socket_path)?)),
        RuntimeBackend::Mock => Ok(Arc::new(MockContainerRuntime::new())),
    }
}

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn new(socket_path: Option<String>) -> Result<Self, RuntimeError> {
        let docker = if let Some(path) = socket_path {
            #[cfg(unix)]
            let result = Docker::connect_with_unix(&path, 120, bollard::API_DEFAULT_VERSION);

            #[cfg(windows)]
            let result = Docker::connect_with_named_pipe(&path, 120, bollard::API_DEFAULT_VERSION);

            result.map_err(|e| {
                RuntimeError::Unavailable(format!(
                    "Failed to connect to Docker at {}: {}\n\n\
                     Ensure Docker is running and the socket path is correct.",
                    path, e
                ))
            })?
        } else {
            Docker::connect_with_local_defaults().map_err(|e| {
                RuntimeError::Unavailable(format!(
                    "Failed to connect to Docker: {}\n\n\
                     Common causes:\n\
                     - Docker daemon not running (check: docker ps)\n\
                     - Permission denied accessing Docker socket\n\
                     - On Linux: Current user not in 'docker' group",
                    e
                ))
            })?
        };

        Ok(Self { docker })
    }

    async fn ensure_image(&self, image: &str) -> Result<(), RuntimeError> {
        if self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }

        info!("Image {} not found locally, pulling", image);
        let options = Some(CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        });

        let mut stream = self.docker.create_image(options, None, None);
        while let Some(result) = stream.next().await {
            if let Err(e) = result {
                return Err(RuntimeError::ImageUnavailable(format!(
                    "Failed to pull image {}: {}\n\nTry manually: docker pull {}",
                    image, e, image
                )));
            }
        }
        info!("Successfully pulled image: {}", image);
        Ok(())
    }

    async fn force_remove(&self, id: &str) -> Result<(), BollardError> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        self.docker.remove_container(id, Some(options)).await
    }
}

fn is_not_found(err: &BollardError) -> bool {
    matches!(err, BollardError::DockerResponseServerError { status_code: 404, .. })
}

fn map_state(status: Option<ContainerStateStatusEnum>) -> ContainerState {
    match status {
        Some(ContainerStateStatusEnum::CREATED) => ContainerState::Created,
        Some(ContainerStateStatusEnum::RUNNING) => ContainerState::Running,
        Some(ContainerStateStatusEnum::RESTARTING) => ContainerState::Restarting,
        Some(ContainerStateStatusEnum::PAUSED) => ContainerState::Paused,
        Some(ContainerStateStatusEnum::EXITED) => ContainerState::Exited,
        _ => ContainerState::Dead,
    }
}

fn parse_state(state: Option<&str>) -> ContainerState {
    match state {
        Some("created") => ContainerState::Created,
        Some("running") => ContainerState::Running,
        Some("restarting") => ContainerState::Restarting,
        Some("paused") => ContainerState::Paused,
        Some("exited") => ContainerState::Exited,
        _ => ContainerState::Dead,
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        self.docker.ping().await.map_err(|e| {
            RuntimeError::Unavailable(format!(
                "Cannot connect to Docker daemon: {}\n\nVerify with: docker ps",
                e
            ))
        })?;
        Ok(())
    }

    async fn ensure_network(&self, name: &str) -> Result<(), RuntimeError> {
        match self
            .docker
            .inspect_network(name, None::<InspectNetworkOptions<String>>)
            .await
        {
            Ok(_) => {
                debug!(network = name, "Sandbox network already exists");
                return Ok(());
            }
            Err(e) if is_not_found(&e) => {}
            Err(e) => return Err(RuntimeError::Network(e.to_string())),
        }

        let options = CreateNetworkOptions {
            name: name.to_string(),
            driver: "bridge".to_string(),
            options: HashMap::from([(
                "com.docker.network.bridge.enable_icc".to_string(),
                "false".to_string(),
            )]),
            labels: HashMap::from([(
                crate::domain::runtime::SANDBOX_LABEL.to_string(),
                "true".to_string(),
            )]),
            ..Default::default()
        };

        self.docker
            .create_network(options)
            .await
            .map_err(|e| {
                RuntimeError::Network(format!("Failed to create network {}: {}", name, e))
            })?;
        info!(
            network = name,
            "Created isolated sandbox network (inter-container traffic disabled)"
        );
        Ok(())
    }

    async fn start_container(&self, spec: ContainerSpec) -> Result<ContainerRef, RuntimeError> {
        self.ensure_image(&spec.image).await?;

        // A container left behind under the same name would make create fail
        match self.force_remove(&spec.name).await {
            Ok(()) => warn!(name = %spec.name, "Removed stale sandbox container"),
            Err(e) if is_not_found(&e) => {}
            Err(e) => return Err(RuntimeError::RemoveFailed(e.to_string())),
        }

        let container_port = format!("{}/tcp", spec.port);
        let port_bindings = HashMap::from([(
            container_port.clone(),
            Some(vec![PortBinding {
                host_ip: Some("127.0.0.1".to_string()),
                host_port: Some(spec.port.to_string()),
            }]),
        )]);

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            network_mode: Some(spec.network.clone()),
            memory: Some(spec.resources.memory_limit as i64),
            cpu_shares: Some(spec.resources.cpu_shares as i64),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(vec!["/bin/sh".to_string(), "-c".to_string(), KEEPALIVE_COMMAND.to_string()]),
            env: Some(spec.env.clone()),
            labels: Some(spec.labels.clone()),
            exposed_ports: Some(HashMap::from([(container_port, HashMap::new())])),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let created = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| {
                RuntimeError::StartFailed(format!(
                    "Failed to create container {}: {}",
                    spec.name, e
                ))
            })?;

        if let Err(e) = self
            .docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
        {
            if let Err(cleanup) = self.force_remove(&created.id).await {
                warn!(
                    container = %created.id,
                    "Failed to clean up container after start failure: {}", cleanup
                );
            }
            return Err(RuntimeError::StartFailed(format!(
                "Failed to start container {}: {}",
                spec.name, e
            )));
        }

        info!(
            container = %created.id,
            name = %spec.name,
            port = spec.port,
            "Started sandbox container"
        );
        Ok(ContainerRef::new(created.id))
    }

    async fn stop_container(
        &self,
        container: &ContainerRef,
        grace: Duration,
    ) -> Result<(), RuntimeError> {
        let options = StopContainerOptions {
            t: grace.as_secs() as i64,
        };
        match self.docker.stop_container(container.as_str(), Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(BollardError::DockerResponseServerError { status_code: 304, .. }) => Ok(()),
            Err(e) => Err(RuntimeError::StopFailed(e.to_string())),
        }
    }

    async fn remove_container(&self, container: &ContainerRef) -> Result<(), RuntimeError> {
        match self.force_remove(container.as_str()).await {
            Ok(()) => {
                debug!(%container, "Removed container");
                Ok(())
            }
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(RuntimeError::RemoveFailed(e.to_string())),
        }
    }

    async fn inspect(&self, container: &ContainerRef) -> Result<ContainerState, RuntimeError> {
        match self
            .docker
            .inspect_container(container.as_str(), None::<InspectContainerOptions>)
            .await
        {
            Ok(inspect) => Ok(map_state(inspect.state.and_then(|s| s.status))),
            Err(e) if is_not_found(&e) => Ok(ContainerState::Missing),
            Err(e) => Err(RuntimeError::Api(e.to_string())),
        }
    }

    async fn list_labelled(&self, label: &str) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let options = ListContainersOptions::<String> {
            all: true,
            filters: HashMap::from([("label".to_string(), vec![format!("{}=true", label)])]),
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| RuntimeError::Api(e.to_string()))?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let id = c.id?;
                let name = c
                    .names
                    .and_then(|names| names.into_iter().next())
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_default();
                Some(ContainerSummary {
                    container: ContainerRef::new(id),
                    name,
                    state: parse_state(c.state.as_deref()),
                    labels: c.labels.unwrap_or_default(),
                })
            })
            .collect())
    }
}

// Re-export MockContainerRuntime for tests and Docker-less daemons
pub use mock::MockContainerRuntime;

mod mock {
    use super::*;
    use crate::domain::runtime::SANDBOX_LABEL;
    use parking_lot::Mutex;

    #[derive(Debug, Clone)]
    struct MockContainer {
        name: String,
        state: ContainerState,
        labels: HashMap<String, String>,
    }

    #[derive(Default)]
    struct MockState {
        containers: HashMap<ContainerRef, MockContainer>,
        networks: Vec<String>,
        started: Vec<ContainerSpec>,
        start_attempts: usize,
        failing_starts: usize,
        fail_stops: bool,
        stop_delay: Option<Duration>,
        next_id: u64,
    }

    /// In-memory runtime. Failure injection helpers let tests drive the
    /// retry, forced-stop and reconcile paths.
    #[derive(Default)]
    pub struct MockContainerRuntime {
        state: Mutex<MockState>,
    }

    impl MockContainerRuntime {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make the next `count` start calls fail.
        pub fn fail_next_starts(&self, count: usize) {
            self.state.lock().failing_starts = count;
        }

        pub fn fail_stops(&self, fail: bool) {
            self.state.lock().fail_stops = fail;
        }

        pub fn set_stop_delay(&self, delay: Duration) {
            self.state.lock().stop_delay = Some(delay);
        }

        /// Simulate the container dying outside the engine's control.
        pub fn kill(&self, container: &ContainerRef) {
            if let Some(c) = self.state.lock().containers.get_mut(container) {
                c.state = ContainerState::Exited;
            }
        }

        /// Add a labelled container no sandbox record knows about.
        pub fn insert_foreign_container(&self, name: &str) -> ContainerRef {
            let mut state = self.state.lock();
            state.next_id += 1;
            let container = ContainerRef::new(format!("foreign-{}", state.next_id));
            state.containers.insert(
                container.clone(),
                MockContainer {
                    name: name.to_string(),
                    state: ContainerState::Running,
                    labels: HashMap::from([(SANDBOX_LABEL.to_string(), "true".to_string())]),
                },
            );
            container
        }

        pub fn started_specs(&self) -> Vec<ContainerSpec> {
            self.state.lock().started.clone()
        }

        pub fn start_attempts(&self) -> usize {
            self.state.lock().start_attempts
        }

        pub fn running_count(&self) -> usize {
            self.state
                .lock()
                .containers
                .values()
                .filter(|c| c.state.is_running())
                .count()
        }

        pub fn has_network(&self, name: &str) -> bool {
            self.state.lock().networks.iter().any(|n| n == name)
        }
    }

    #[async_trait]
    impl ContainerRuntime for MockContainerRuntime {
        async fn ping(&self) -> Result<(), RuntimeError> {
            Ok(())
        }

        async fn ensure_network(&self, name: &str) -> Result<(), RuntimeError> {
            let mut state = self.state.lock();
            if !state.networks.iter().any(|n| n == name) {
                state.networks.push(name.to_string());
            }
            Ok(())
        }

        async fn start_container(&self, spec: ContainerSpec) -> Result<ContainerRef, RuntimeError> {
            let mut state = self.state.lock();
            state.start_attempts += 1;
            if state.failing_starts > 0 {
                state.failing_starts -= 1;
                return Err(RuntimeError::StartFailed(format!(
                    "injected failure for {}",
                    spec.name
                )));
            }

            // Same-name containers are replaced, as the Docker adapter does
            state.containers.retain(|_, c| c.name != spec.name);

            state.next_id += 1;
            let container = ContainerRef::new(format!("mock-{}", state.next_id));
            state.containers.insert(
                container.clone(),
                MockContainer {
                    name: spec.name.clone(),
                    state: ContainerState::Running,
                    labels: spec.labels.clone(),
                },
            );
            state.started.push(spec);
            Ok(container)
        }

        async fn stop_container(
            &self,
            container: &ContainerRef,
            _grace: Duration,
        ) -> Result<(), RuntimeError> {
            let (delay, fail) = {
                let state = self.state.lock();
                (state.stop_delay, state.fail_stops)
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if fail {
                return Err(RuntimeError::StopFailed(format!("injected failure for {}", container)));
            }
            if let Some(c) = self.state.lock().containers.get_mut(container) {
                c.state = ContainerState::Exited;
            }
            Ok(())
        }

        async fn remove_container(&self, container: &ContainerRef) -> Result<(), RuntimeError> {
            self.state.lock().containers.remove(container);
            Ok(())
        }

        async fn inspect(&self, container: &ContainerRef) -> Result<ContainerState, RuntimeError> {
            Ok(self
                .state
                .lock()
                .containers
                .get(container)
                .map(|c| c.state)
                .unwrap_or(ContainerState::Missing))
        }

        async fn list_labelled(&self, label: &str) -> Result<Vec<ContainerSummary>, RuntimeError> {
            Ok(self
                .state
                .lock()
                .containers
                .iter()
                .filter(|(_, c)| c.labels.get(label).map(String::as_str) == Some("true"))
                .map(|(id, c)| ContainerSummary {
                    container: id.clone(),
                    name: c.name.clone(),
                    state: c.state,
                    labels: c.labels.clone(),
                })
                .collect())
        }
    }
}
