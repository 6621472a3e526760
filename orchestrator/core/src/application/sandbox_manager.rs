// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Sandbox Manager Application Service
//!
//! Owns the lifecycle state machine of every sandbox, coordinating:
//! - Domain layer: `Sandbox` aggregate, `PortPool`, `ContainerRuntime` trait
//! - Infrastructure layer: `SandboxRepository` (write-through), runtime adapter
//! - Event bus: publishing `SandboxEvent`s for external notification
//!
//! # Concurrency
//!
//! Each sandbox has its own slot holding an operation lease. A lifecycle
//! operation (start, stop, reset, reconcile) takes the lease for its whole
//! duration; a second operation on the same sandbox is **rejected** with
//! `OperationInProgress`, naming the running operation and when it started.
//! Runtime calls are awaited while holding only that lease, never the pool
//! lock or a registry shard.

use crate::domain::error::{OrchestratorError, OrchestratorResult};
use crate::domain::events::SandboxEvent;
use crate::domain::ids::{ProjectId, SandboxId};
use crate::domain::engine_config::SandboxConfig;
use crate::domain::port_pool::PortPool;
use crate::domain::repository::SandboxRepository;
use crate::domain::runtime::{
    ContainerRef, ContainerRuntime, ContainerSpec, ResourceLimits, RuntimeError,
    PROJECT_LABEL, SANDBOX_ID_LABEL, SANDBOX_LABEL,
};
use crate::domain::sandbox::{Sandbox, SandboxStatus};
use crate::infrastructure::event_bus::EventBus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use metrics::counter;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Extra time allowed on top of the grace period before a stop call is
/// considered hung.
const STOP_CALL_SLACK: Duration = Duration::from_secs(5);
/// Bound on removal and inspection calls.
const RUNTIME_CALL_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Service Trait
// ============================================================================

#[async_trait]
pub trait SandboxService: Send + Sync {
    /// Provision (or restart) the sandbox of a project on a fresh port
    async fn create_sandbox(
        &self,
        project_id: ProjectId,
        image: Option<String>,
        resources: Option<ResourceLimits>,
    ) -> OrchestratorResult<Sandbox>;

    /// Stop the container and release the port; no-op when already stopped
    async fn stop_sandbox(&self, id: SandboxId) -> OrchestratorResult<Sandbox>;

    /// Force cleanup of a sandbox in `error` and return it to `stopped`
    async fn reset_sandbox(&self, id: SandboxId) -> OrchestratorResult<Sandbox>;

    /// Record access for the external idle reaper
    async fn touch(&self, id: SandboxId) -> OrchestratorResult<Sandbox>;

    async fn get_sandbox(&self, id: SandboxId) -> OrchestratorResult<Sandbox>;

    async fn get_sandbox_by_project(&self, project_id: &ProjectId) -> OrchestratorResult<Sandbox>;

    async fn list_sandboxes(&self) -> OrchestratorResult<Vec<Sandbox>>;

    /// Inspect running sandboxes; returns how many were moved to `error`
    async fn reconcile(&self) -> OrchestratorResult<usize>;

    /// Remove labelled containers the registry does not own; returns the count
    async fn prune_orphans(&self) -> OrchestratorResult<usize>;
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct SandboxManagerConfig {
    pub allowed_images: Vec<String>,
    pub default_image: String,
    pub default_resources: ResourceLimits,
    pub network: String,
    pub start_timeout: Duration,
    pub stop_grace: Duration,
    pub start_retries: u32,
}

impl Default for SandboxManagerConfig {
    fn default() -> Self {
        Self::from(&SandboxConfig::default())
    }
}

impl From<&SandboxConfig> for SandboxManagerConfig {
    fn from(config: &SandboxConfig) -> Self {
        Self {
            allowed_images: config.allowed_images.clone(),
            default_image: config.default_image.clone(),
            default_resources: config.default_resources,
            network: config.network.clone(),
            start_timeout: config.start_timeout(),
            stop_grace: config.stop_grace(),
            start_retries: config.start_retries,
        }
    }
}

// ============================================================================
// Per-sandbox slot and operation lease
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxOperation {
    Start,
    Stop,
    Reset,
    Reconcile,
}

impl SandboxOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Reset => "reset",
            Self::Reconcile => "reconcile",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct InFlightOperation {
    operation: SandboxOperation,
    started_at: DateTime<Utc>,
}

struct SandboxSlot {
    id: SandboxId,
    lease: Mutex<Option<InFlightOperation>>,
    sandbox: RwLock<Sandbox>,
}

impl SandboxSlot {
    fn new(sandbox: Sandbox) -> Arc<Self> {
        Arc::new(Self {
            id: sandbox.id,
            lease: Mutex::new(None),
            sandbox: RwLock::new(sandbox),
        })
    }

    fn try_lease(
        self: &Arc<Self>,
        operation: SandboxOperation,
    ) -> OrchestratorResult<OperationLease> {
        let mut lease = self.lease.lock();
        if let Some(current) = lease.as_ref() {
            return Err(OrchestratorError::OperationInProgress {
                sandbox_id: self.id,
                operation: current.operation.as_str().to_string(),
                started_at: current.started_at,
            });
        }
        *lease = Some(InFlightOperation {
            operation,
            started_at: Utc::now(),
        });
        Ok(OperationLease { slot: self.clone() })
    }

    fn is_leased(&self) -> bool {
        self.lease.lock().is_some()
    }

    fn snapshot(&self) -> Sandbox {
        self.sandbox.read().clone()
    }
}

/// Held for the duration of one lifecycle operation; released on drop.
struct OperationLease {
    slot: Arc<SandboxSlot>,
}

impl Drop for OperationLease {
    fn drop(&mut self) {
        *self.slot.lease.lock() = None;
    }
}

// ============================================================================
// Standard Implementation
// ============================================================================

pub struct StandardSandboxService {
    pool: Arc<PortPool>,
    runtime: Arc<dyn ContainerRuntime>,
    repository: Arc<dyn SandboxRepository>,
    event_bus: Arc<EventBus>,
    config: SandboxManagerConfig,
    slots: DashMap<SandboxId, Arc<SandboxSlot>>,
    by_project: DashMap<ProjectId, SandboxId>,
}

impl StandardSandboxService {
    pub fn new(
        pool: Arc<PortPool>,
        runtime: Arc<dyn ContainerRuntime>,
        repository: Arc<dyn SandboxRepository>,
        event_bus: Arc<EventBus>,
        config: SandboxManagerConfig,
    ) -> Self {
        Self {
            pool,
            runtime,
            repository,
            event_bus,
            config,
            slots: DashMap::new(),
            by_project: DashMap::new(),
        }
    }

    /// Check the runtime is reachable and the isolation network exists.
    pub async fn initialize(&self) -> OrchestratorResult<()> {
        self.runtime
            .ping()
            .await
            .map_err(|e| OrchestratorError::runtime("container runtime", e))?;
        self.runtime
            .ensure_network(&self.config.network)
            .await
            .map_err(|e| OrchestratorError::runtime(&self.config.network, e))?;
        info!(network = %self.config.network, "Sandbox isolation network ready");
        Ok(())
    }

    pub fn port_pool(&self) -> &Arc<PortPool> {
        &self.pool
    }

    fn slot(&self, id: SandboxId) -> OrchestratorResult<Arc<SandboxSlot>> {
        self.slots
            .get(&id)
            .map(|slot| slot.value().clone())
            .ok_or_else(|| OrchestratorError::not_found("Sandbox", id))
    }

    fn resolve_image(&self, image: Option<String>) -> OrchestratorResult<String> {
        let image = image.unwrap_or_else(|| self.config.default_image.clone());
        if !self.config.allowed_images.contains(&image) {
            return Err(OrchestratorError::InvalidConfiguration(format!(
                "image '{}' is not in the sandbox allow-list",
                image
            )));
        }
        Ok(image)
    }

    /// Atomically claim the project's sandbox slot and take its start lease.
    /// Returns the lease and whether the slot was created by this call.
    fn claim_project(
        &self,
        project_id: &ProjectId,
        image: &str,
        resources: ResourceLimits,
    ) -> OrchestratorResult<(OperationLease, bool)> {
        match self.by_project.entry(project_id.clone()) {
            Entry::Occupied(entry) => {
                let sandbox_id = *entry.get();
                let slot = self.slot(sandbox_id)?;
                let status = slot.sandbox.read().status;
                if status != SandboxStatus::Stopped {
                    return Err(OrchestratorError::AlreadyExists {
                        entity: "Sandbox",
                        id: format!("{} (project {}, {})", sandbox_id, project_id, status),
                    });
                }
                let lease = slot.try_lease(SandboxOperation::Start)?;
                {
                    let mut sandbox = slot.sandbox.write();
                    sandbox.image = image.to_string();
                    sandbox.resources = resources;
                }
                Ok((lease, false))
            }
            Entry::Vacant(entry) => {
                let sandbox = Sandbox::new(project_id.clone(), image.to_string(), resources);
                let slot = SandboxSlot::new(sandbox);
                let lease = slot.try_lease(SandboxOperation::Start)?;
                self.slots.insert(slot.id, slot.clone());
                entry.insert(slot.id);
                self.event_bus.publish_sandbox_event(SandboxEvent::SandboxCreated {
                    sandbox_id: slot.id,
                    project_id: project_id.clone(),
                    image: image.to_string(),
                    created_at: Utc::now(),
                });
                Ok((lease, true))
            }
        }
    }

    fn forget(&self, id: SandboxId, project_id: &ProjectId) {
        self.by_project.remove_if(project_id, |_, owner| *owner == id);
        self.slots.remove(&id);
    }

    async fn persist(&self, sandbox: &Sandbox) -> OrchestratorResult<()> {
        self.repository.save(sandbox).await.map_err(|e| {
            error!(sandbox_id = %sandbox.id, "Failed to persist sandbox: {}", e);
            OrchestratorError::store(format!("sandbox {}", sandbox.id), e)
        })
    }

    /// Write-through for intermediate states; failures are logged only.
    async fn persist_best_effort(&self, sandbox: &Sandbox) {
        if let Err(e) = self.repository.save(sandbox).await {
            warn!(
                sandbox_id = %sandbox.id,
                status = %sandbox.status,
                "Failed to persist sandbox transition: {}", e
            );
        }
    }

    fn release_port(&self, port: Option<u16>) {
        if let Some(port) = port {
            if let Err(e) = self.pool.release(port) {
                error!(port, "Failed to release sandbox port: {}", e);
            }
        }
    }

    fn container_spec(&self, sandbox: &Sandbox, port: u16) -> ContainerSpec {
        let labels = HashMap::from([
            (SANDBOX_LABEL.to_string(), "true".to_string()),
            (SANDBOX_ID_LABEL.to_string(), sandbox.id.to_string()),
            (PROJECT_LABEL.to_string(), sandbox.project_id.to_string()),
        ]);

        ContainerSpec {
            name: container_name(&sandbox.project_id, sandbox.id),
            image: sandbox.image.clone(),
            port,
            resources: sandbox.resources,
            network: self.config.network.clone(),
            labels,
            env: vec![
                format!("SANDBOX_PORT={}", port),
                format!("HIVE_PROJECT_ID={}", sandbox.project_id),
            ],
        }
    }

    /// Start the container, retrying transient failures up to
    /// `start_retries` times.
    async fn start_with_retry(
        &self,
        sandbox_id: SandboxId,
        spec: &ContainerSpec,
    ) -> Result<ContainerRef, RuntimeError> {
        let attempts = self.config.start_retries + 1;
        let mut last_error = None;

        for attempt in 1..=attempts {
            let result = tokio::time::timeout(
                self.config.start_timeout,
                self.runtime.start_container(spec.clone()),
            )
            .await;

            match result {
                Ok(Ok(container)) => return Ok(container),
                Ok(Err(e)) => {
                    warn!(%sandbox_id, attempt, attempts, "Sandbox container start failed: {}", e);
                    last_error = Some(e);
                }
                Err(_) => {
                    warn!(%sandbox_id, attempt, attempts, "Sandbox container start timed out");
                    // The runtime may have created the container before the deadline
                    self.remove_quietly(&ContainerRef::new(spec.name.clone())).await;
                    last_error = Some(RuntimeError::Timeout {
                        operation: "container start",
                        seconds: self.config.start_timeout.as_secs(),
                    });
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| RuntimeError::StartFailed("no start attempt made".to_string())))
    }

    async fn remove_container(&self, container: &ContainerRef) -> Result<(), RuntimeError> {
        let result =
            tokio::time::timeout(RUNTIME_CALL_TIMEOUT, self.runtime.remove_container(container))
                .await;
        match result {
            Ok(result) => result,
            Err(_) => Err(RuntimeError::Timeout {
                operation: "container removal",
                seconds: RUNTIME_CALL_TIMEOUT.as_secs(),
            }),
        }
    }

    async fn remove_quietly(&self, container: &ContainerRef) {
        if let Err(e) = self.remove_container(container).await {
            debug!(%container, "Best-effort container removal failed: {}", e);
        }
    }

    async fn launch(&self, lease: &OperationLease, created: bool) -> OrchestratorResult<Sandbox> {
        let slot = &lease.slot;
        let (sandbox_id, project_id) = {
            let sandbox = slot.sandbox.read();
            (sandbox.id, sandbox.project_id.clone())
        };

        let port = match self.pool.acquire() {
            Ok(port) => port,
            Err(e) => {
                if created {
                    self.forget(sandbox_id, &project_id);
                }
                return Err(e);
            }
        };

        let begun = {
            let mut sandbox = slot.sandbox.write();
            sandbox.begin_start(port).map(|_| sandbox.clone())
        };
        let starting = match begun {
            Ok(sandbox) => sandbox,
            Err(e) => {
                self.release_port(Some(port));
                return Err(e);
            }
        };
        self.persist_best_effort(&starting).await;

        info!(
            %sandbox_id,
            %project_id,
            port,
            image = %starting.image,
            "Starting sandbox container"
        );
        let spec = self.container_spec(&starting, port);

        match self.start_with_retry(sandbox_id, &spec).await {
            Ok(container) => {
                let running = {
                    let mut sandbox = slot.sandbox.write();
                    sandbox.mark_running(container.clone())?;
                    sandbox.clone()
                };
                counter!("hive_sandboxes_started_total").increment(1);
                self.event_bus.publish_sandbox_event(SandboxEvent::SandboxRunning {
                    sandbox_id,
                    project_id: project_id.clone(),
                    port,
                    container: container.clone(),
                    started_at: Utc::now(),
                });
                info!(%sandbox_id, %project_id, port, %container, "Sandbox running");
                self.persist(&running).await?;
                Ok(running)
            }
            Err(e) => {
                let reason = e.to_string();
                let (failed, released) = {
                    let mut sandbox = slot.sandbox.write();
                    let released = sandbox.mark_error_after_cleanup(reason.clone())?;
                    (sandbox.clone(), released)
                };
                self.release_port(released);
                counter!("hive_sandbox_start_failures_total").increment(1);
                self.event_bus.publish_sandbox_event(SandboxEvent::SandboxError {
                    sandbox_id,
                    project_id,
                    reason: reason.clone(),
                    failed_at: Utc::now(),
                });
                error!(%sandbox_id, port, "Sandbox failed to start: {}", reason);
                self.persist_best_effort(&failed).await;
                Err(OrchestratorError::runtime(sandbox_id, e))
            }
        }
    }
}

/// Docker-safe container name for a sandbox. Sanitizing the project id can
/// map distinct projects to the same text, so the sandbox id keeps it unique.
fn container_name(project_id: &ProjectId, sandbox_id: SandboxId) -> String {
    let project: String = project_id
        .as_str()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let id = sandbox_id.to_string();
    format!("hive-sandbox-{}-{}", project, &id[..8])
}

#[async_trait]
impl SandboxService for StandardSandboxService {
    async fn create_sandbox(
        &self,
        project_id: ProjectId,
        image: Option<String>,
        resources: Option<ResourceLimits>,
    ) -> OrchestratorResult<Sandbox> {
        if project_id.as_str().is_empty() {
            return Err(OrchestratorError::InvalidConfiguration(
                "project id cannot be empty".to_string(),
            ));
        }
        let image = self.resolve_image(image)?;
        let resources = resources.unwrap_or(self.config.default_resources);
        if resources.memory_limit == 0 {
            return Err(OrchestratorError::InvalidConfiguration(format!(
                "memory limit for project {} must be greater than zero",
                project_id
            )));
        }

        let (lease, created) = self.claim_project(&project_id, &image, resources)?;
        debug!(%project_id, sandbox_id = %lease.slot.id, created, "Claimed project sandbox slot");
        self.launch(&lease, created).await
    }

    async fn stop_sandbox(&self, id: SandboxId) -> OrchestratorResult<Sandbox> {
        let slot = self.slot(id)?;
        let lease = slot.try_lease(SandboxOperation::Stop)?;

        let (container, project_id) = {
            let mut sandbox = lease.slot.sandbox.write();
            if sandbox.status == SandboxStatus::Stopped {
                debug!(sandbox_id = %id, "Stop requested for stopped sandbox; nothing to do");
                return Ok(sandbox.clone());
            }
            sandbox.begin_stop()?;
            (sandbox.container_ref.clone(), sandbox.project_id.clone())
        };
        self.persist_best_effort(&slot.snapshot()).await;

        info!(sandbox_id = %id, %project_id, "Stopping sandbox");
        let mut forced = false;

        if let Some(container) = &container {
            let grace = self.config.stop_grace;
            let stopped = tokio::time::timeout(
                grace + STOP_CALL_SLACK,
                self.runtime.stop_container(container, grace),
            )
            .await;
            match stopped {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(
                        sandbox_id = %id,
                        %container,
                        "Graceful stop failed, forcing removal: {}", e
                    );
                    forced = true;
                }
                Err(_) => {
                    warn!(
                        sandbox_id = %id,
                        %container,
                        grace_secs = grace.as_secs(),
                        "Graceful stop timed out, forcing removal"
                    );
                    forced = true;
                }
            }

            if let Err(e) = self.remove_container(container).await {
                let reason = format!("container cleanup failed: {}", e);
                let failed = {
                    let mut sandbox = lease.slot.sandbox.write();
                    sandbox.mark_error(reason.clone())?;
                    sandbox.clone()
                };
                self.event_bus.publish_sandbox_event(SandboxEvent::SandboxError {
                    sandbox_id: id,
                    project_id,
                    reason: reason.clone(),
                    failed_at: Utc::now(),
                });
                error!(sandbox_id = %id, "Sandbox stop failed: {}", reason);
                self.persist_best_effort(&failed).await;
                return Err(OrchestratorError::runtime(id, e));
            }
        }

        let (stopped, released) = {
            let mut sandbox = lease.slot.sandbox.write();
            let released = sandbox.mark_stopped()?;
            (sandbox.clone(), released)
        };
        self.release_port(released);
        self.event_bus.publish_sandbox_event(SandboxEvent::SandboxStopped {
            sandbox_id: id,
            project_id,
            forced,
            stopped_at: Utc::now(),
        });
        info!(sandbox_id = %id, forced, "Sandbox stopped");
        self.persist(&stopped).await?;
        Ok(stopped)
    }

    async fn reset_sandbox(&self, id: SandboxId) -> OrchestratorResult<Sandbox> {
        let slot = self.slot(id)?;
        let lease = slot.try_lease(SandboxOperation::Reset)?;

        let (status, container, project_id) = {
            let sandbox = lease.slot.sandbox.read();
            (sandbox.status, sandbox.container_ref.clone(), sandbox.project_id.clone())
        };
        if status != SandboxStatus::Error {
            return Err(OrchestratorError::InvalidTransition {
                entity: "Sandbox",
                id: id.to_string(),
                from: status.to_string(),
                to: SandboxStatus::Stopped.to_string(),
            });
        }

        if let Some(container) = &container {
            info!(sandbox_id = %id, %container, "Force removing container of failed sandbox");
            self.remove_container(container)
                .await
                .map_err(|e| OrchestratorError::runtime(id, e))?;
        }

        let (reset, released) = {
            let mut sandbox = lease.slot.sandbox.write();
            let released = sandbox.reset()?;
            (sandbox.clone(), released)
        };
        self.release_port(released);
        self.event_bus.publish_sandbox_event(SandboxEvent::SandboxReset {
            sandbox_id: id,
            project_id,
            reset_at: Utc::now(),
        });
        info!(sandbox_id = %id, "Sandbox reset to stopped");
        self.persist(&reset).await?;
        Ok(reset)
    }

    async fn touch(&self, id: SandboxId) -> OrchestratorResult<Sandbox> {
        let slot = self.slot(id)?;
        let touched = {
            let mut sandbox = slot.sandbox.write();
            sandbox.touch();
            sandbox.clone()
        };
        self.persist(&touched).await?;
        Ok(touched)
    }

    async fn get_sandbox(&self, id: SandboxId) -> OrchestratorResult<Sandbox> {
        Ok(self.slot(id)?.snapshot())
    }

    async fn get_sandbox_by_project(&self, project_id: &ProjectId) -> OrchestratorResult<Sandbox> {
        let id = self
            .by_project
            .get(project_id)
            .map(|entry| *entry.value())
            .ok_or_else(|| OrchestratorError::not_found("Sandbox for project", project_id))?;
        self.get_sandbox(id).await
    }

    async fn list_sandboxes(&self) -> OrchestratorResult<Vec<Sandbox>> {
        let mut sandboxes: Vec<Sandbox> = self
            .slots
            .iter()
            .map(|slot| slot.value().snapshot())
            .collect();
        sandboxes.sort_by_key(|s| s.created_at);
        Ok(sandboxes)
    }

    async fn reconcile(&self) -> OrchestratorResult<usize> {
        let slots: Vec<Arc<SandboxSlot>> = self.slots.iter().map(|s| s.value().clone()).collect();
        let mut failed = 0;

        for slot in slots {
            // Sandboxes with an operation in flight are reconciled next pass
            let lease = match slot.try_lease(SandboxOperation::Reconcile) {
                Ok(lease) => lease,
                Err(_) => continue,
            };
            let (status, container, project_id) = {
                let sandbox = lease.slot.sandbox.read();
                (sandbox.status, sandbox.container_ref.clone(), sandbox.project_id.clone())
            };
            let container = match (status, container) {
                (SandboxStatus::Running, Some(container)) => container,
                _ => continue,
            };

            let inspected =
                tokio::time::timeout(RUNTIME_CALL_TIMEOUT, self.runtime.inspect(&container)).await;
            let state = match inspected {
                Ok(Ok(state)) => state,
                Ok(Err(e)) => {
                    warn!(sandbox_id = %slot.id, %container, "Sandbox inspect failed: {}", e);
                    continue;
                }
                Err(_) => {
                    warn!(sandbox_id = %slot.id, %container, "Sandbox inspect timed out");
                    continue;
                }
            };

            if state.is_running() {
                continue;
            }

            let reason = format!("container {} is {:?}", container, state);
            let errored = {
                let mut sandbox = lease.slot.sandbox.write();
                sandbox.mark_error(reason.clone())?;
                sandbox.clone()
            };
            warn!(sandbox_id = %slot.id, "Reconcile moved sandbox to error: {}", reason);
            self.event_bus.publish_sandbox_event(SandboxEvent::SandboxError {
                sandbox_id: slot.id,
                project_id,
                reason,
                failed_at: Utc::now(),
            });
            self.persist_best_effort(&errored).await;
            failed += 1;
        }

        Ok(failed)
    }

    async fn prune_orphans(&self) -> OrchestratorResult<usize> {
        let containers = self
            .runtime
            .list_labelled(SANDBOX_LABEL)
            .await
            .map_err(|e| OrchestratorError::runtime("sandbox containers", e))?;

        let mut removed = 0;
        for summary in containers {
            let owner = summary
                .labels
                .get(SANDBOX_ID_LABEL)
                .and_then(|id| SandboxId::from_string(id).ok())
                .and_then(|id| self.slots.get(&id).map(|slot| slot.value().clone()));

            let owned = match owner {
                Some(slot) => {
                    slot.is_leased()
                        || slot.sandbox.read().container_ref.as_ref() == Some(&summary.container)
                }
                None => false,
            };
            if owned {
                continue;
            }

            info!(
                container = %summary.container,
                name = %summary.name,
                "Removing orphaned sandbox container"
            );
            match self.remove_container(&summary.container).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(
                    container = %summary.container,
                    "Failed to remove orphaned container: {}", e
                ),
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::InMemorySandboxRepository;
    use crate::infrastructure::runtime::MockContainerRuntime;

    fn create_test_service(
        pool_size: u16,
    ) -> (Arc<StandardSandboxService>, Arc<MockContainerRuntime>) {
        let runtime = Arc::new(MockContainerRuntime::new());
        let service = StandardSandboxService::new(
            Arc::new(PortPool::new(8010, pool_size).unwrap()),
            runtime.clone(),
            Arc::new(InMemorySandboxRepository::new()),
            Arc::new(EventBus::with_default_capacity()),
            SandboxManagerConfig {
                start_timeout: Duration::from_millis(200),
                stop_grace: Duration::from_millis(100),
                ..SandboxManagerConfig::default()
            },
        );
        (Arc::new(service), runtime)
    }

    #[tokio::test]
    async fn test_create_sandbox_binds_port_and_labels() {
        let (service, runtime) = create_test_service(80);

        let sandbox = service
            .create_sandbox(ProjectId::new("proj-1"), None, None)
            .await
            .expect("Failed to create sandbox");

        assert_eq!(sandbox.status, SandboxStatus::Running);
        assert_eq!(sandbox.allocated_port, Some(8010));
        assert!(sandbox.container_ref.is_some());
        assert!(service.port_pool().lookup(8010));

        let specs = runtime.started_specs();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].port, 8010);
        assert_eq!(specs[0].network, "hive-sandbox-isolated");
        assert_eq!(specs[0].labels.get(SANDBOX_LABEL).map(String::as_str), Some("true"));
        assert_eq!(
            specs[0].name,
            format!("hive-sandbox-proj-1-{}", &sandbox.id.to_string()[..8])
        );
    }

    #[tokio::test]
    async fn test_second_create_for_project_fails_with_already_exists() {
        let (service, _runtime) = create_test_service(80);
        let project = ProjectId::new("proj-1");

        service.create_sandbox(project.clone(), None, None).await.unwrap();
        let err = service.create_sandbox(project, None, None).await.unwrap_err();

        assert!(matches!(err, OrchestratorError::AlreadyExists { .. }));
        assert_eq!(service.port_pool().in_use(), 1);
    }

    #[tokio::test]
    async fn test_image_outside_allow_list_is_rejected() {
        let (service, runtime) = create_test_service(80);
        let err = service
            .create_sandbox(ProjectId::new("proj-1"), Some("evil:latest".to_string()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidConfiguration(_)));
        assert!(runtime.started_specs().is_empty());
        assert_eq!(service.port_pool().in_use(), 0);
    }

    #[tokio::test]
    async fn test_stop_releases_port_and_is_idempotent() {
        let (service, runtime) = create_test_service(80);
        let sandbox = service.create_sandbox(ProjectId::new("proj-1"), None, None).await.unwrap();

        let stopped = service.stop_sandbox(sandbox.id).await.unwrap();
        assert_eq!(stopped.status, SandboxStatus::Stopped);
        assert_eq!(stopped.allocated_port, None);
        assert!(!service.port_pool().lookup(8010));
        assert_eq!(runtime.running_count(), 0);

        let again = service.stop_sandbox(sandbox.id).await.unwrap();
        assert_eq!(again.status, SandboxStatus::Stopped);
    }

    #[tokio::test]
    async fn test_stopped_sandbox_is_restarted_by_create() {
        let (service, _runtime) = create_test_service(80);
        let project = ProjectId::new("proj-1");
        let first = service.create_sandbox(project.clone(), None, None).await.unwrap();
        service.stop_sandbox(first.id).await.unwrap();

        let second = service.create_sandbox(project, None, None).await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.status, SandboxStatus::Running);
        assert_eq!(service.list_sandboxes().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_start_failure_retries_once_then_errors() {
        let (service, runtime) = create_test_service(80);
        runtime.fail_next_starts(2);

        let err = service
            .create_sandbox(ProjectId::new("proj-1"), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::RuntimeFailure { .. }));
        assert_eq!(runtime.start_attempts(), 2);

        let sandbox = service.get_sandbox_by_project(&ProjectId::new("proj-1")).await.unwrap();
        assert_eq!(sandbox.status, SandboxStatus::Error);
        assert_eq!(sandbox.allocated_port, None);
        assert_eq!(service.port_pool().in_use(), 0);

        // Only reset leaves error
        let reset = service.reset_sandbox(sandbox.id).await.unwrap();
        assert_eq!(reset.status, SandboxStatus::Stopped);
    }

    #[tokio::test]
    async fn test_transient_start_failure_is_absorbed_by_retry() {
        let (service, runtime) = create_test_service(80);
        runtime.fail_next_starts(1);

        let sandbox = service
            .create_sandbox(ProjectId::new("proj-1"), None, None)
            .await
            .unwrap();
        assert_eq!(sandbox.status, SandboxStatus::Running);
        assert_eq!(runtime.start_attempts(), 2);
    }

    #[tokio::test]
    async fn test_pool_exhaustion_is_fatal_and_leaves_no_record() {
        let (service, _runtime) = create_test_service(1);
        service.create_sandbox(ProjectId::new("proj-1"), None, None).await.unwrap();

        let err = service
            .create_sandbox(ProjectId::new("proj-2"), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::PoolExhausted { .. }));
        assert!(service.get_sandbox_by_project(&ProjectId::new("proj-2")).await.is_err());
    }

    #[tokio::test]
    async fn test_hung_stop_falls_back_to_forced_removal() {
        let (service, runtime) = create_test_service(80);
        let sandbox = service.create_sandbox(ProjectId::new("proj-1"), None, None).await.unwrap();

        runtime.fail_stops(true);
        let stopped = service.stop_sandbox(sandbox.id).await.unwrap();
        assert_eq!(stopped.status, SandboxStatus::Stopped);
        assert_eq!(runtime.running_count(), 0);
        assert!(!service.port_pool().lookup(8010));
    }

    #[tokio::test]
    async fn test_concurrent_operation_is_rejected_with_details() {
        let (service, runtime) = create_test_service(80);
        let sandbox = service.create_sandbox(ProjectId::new("proj-1"), None, None).await.unwrap();

        runtime.set_stop_delay(Duration::from_millis(50));
        let first = {
            let service = service.clone();
            tokio::spawn(async move { service.stop_sandbox(sandbox.id).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let err = service.stop_sandbox(sandbox.id).await.unwrap_err();
        match err {
            OrchestratorError::OperationInProgress { sandbox_id, operation, .. } => {
                assert_eq!(sandbox_id, sandbox.id);
                assert_eq!(operation, "stop");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        assert_eq!(first.await.unwrap().unwrap().status, SandboxStatus::Stopped);
    }

    #[tokio::test]
    async fn test_reconcile_flags_exited_containers() {
        let (service, runtime) = create_test_service(80);
        let sandbox = service.create_sandbox(ProjectId::new("proj-1"), None, None).await.unwrap();
        let container = sandbox.container_ref.clone().unwrap();

        assert_eq!(service.reconcile().await.unwrap(), 0);
        runtime.kill(&container);
        assert_eq!(service.reconcile().await.unwrap(), 1);

        let errored = service.get_sandbox(sandbox.id).await.unwrap();
        assert_eq!(errored.status, SandboxStatus::Error);
        // Port stays held until reset cleans the container up
        assert!(service.port_pool().lookup(8010));

        service.reset_sandbox(sandbox.id).await.unwrap();
        assert!(!service.port_pool().lookup(8010));
    }

    #[tokio::test]
    async fn test_touch_updates_last_accessed() {
        let (service, _runtime) = create_test_service(80);
        let sandbox = service.create_sandbox(ProjectId::new("proj-1"), None, None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let touched = service.touch(sandbox.id).await.unwrap();
        assert!(touched.last_accessed_at > sandbox.last_accessed_at);
        assert!(matches!(
            service.touch(SandboxId::new()).await,
            Err(OrchestratorError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_prune_removes_unknown_labelled_containers() {
        let (service, runtime) = create_test_service(80);
        service.create_sandbox(ProjectId::new("proj-1"), None, None).await.unwrap();
        runtime.insert_foreign_container("leftover");

        assert_eq!(service.prune_orphans().await.unwrap(), 1);
        assert_eq!(runtime.running_count(), 1);
    }

    #[test]
    fn test_container_name_is_sanitized_and_unique_per_sandbox() {
        let id = SandboxId::new();
        let short = id.to_string()[..8].to_string();
        assert_eq!(
            container_name(&ProjectId::new("team/app 1"), id),
            format!("hive-sandbox-team-app-1-{}", short)
        );
        assert_ne!(
            container_name(&ProjectId::new("team/app"), SandboxId::new()),
            container_name(&ProjectId::new("team-app"), SandboxId::new())
        );
    }

    #[tokio::test]
    async fn test_projects_with_colliding_sanitized_ids_coexist() {
        let (service, runtime) = create_test_service(80);

        let first = service
            .create_sandbox(ProjectId::new("team/app"), None, None)
            .await
            .unwrap();
        let second = service
            .create_sandbox(ProjectId::new("team-app"), None, None)
            .await
            .unwrap();

        let specs = runtime.started_specs();
        assert_ne!(specs[0].name, specs[1].name);
        assert_eq!(runtime.running_count(), 2);

        // Starting the second project must not have taken down the first
        assert_eq!(service.reconcile().await.unwrap(), 0);
        assert_eq!(
            service.get_sandbox(first.id).await.unwrap().status,
            SandboxStatus::Running
        );
        assert_eq!(
            service.get_sandbox(second.id).await.unwrap().status,
            SandboxStatus::Running
        );
    }
}
