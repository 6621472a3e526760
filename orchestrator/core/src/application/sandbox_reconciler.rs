// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Sandbox Reconciler - Background task keeping the registry honest
//!
//! The container runtime is the source of truth for whether a sandbox is
//! actually up. Each cycle inspects running sandboxes (moving dead ones to
//! `error`) and, optionally, removes labelled containers nobody owns.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Periodic runtime reconciliation for the sandbox manager

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::sandbox_manager::SandboxService;
use crate::domain::error::OrchestratorResult;

#[derive(Debug, Clone)]
pub struct SandboxReconcilerConfig {
    /// How often to run a cycle (in seconds)
    pub interval_seconds: u64,

    /// Also remove labelled containers the registry does not know about
    pub prune_orphans: bool,

    pub enabled: bool,
}

impl Default for SandboxReconcilerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 30,
            prune_orphans: true,
            enabled: true,
        }
    }
}

/// Outcome of one reconcile cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub failed: usize,
    pub pruned: usize,
}

pub struct SandboxReconciler {
    sandbox_service: Arc<dyn SandboxService>,
    config: SandboxReconcilerConfig,
    shutdown_token: CancellationToken,
}

impl SandboxReconciler {
    pub fn new(sandbox_service: Arc<dyn SandboxService>, config: SandboxReconcilerConfig) -> Self {
        Self {
            sandbox_service,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Get a handle to trigger shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        if !self.config.enabled {
            info!("Sandbox reconciler is disabled");
            return;
        }

        info!(
            interval_seconds = self.config.interval_seconds,
            prune_orphans = self.config.prune_orphans,
            "Starting sandbox reconciler background task"
        );

        let mut tick = interval(Duration::from_secs(self.config.interval_seconds.max(1)));

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    debug!("Running sandbox reconcile cycle");
                    match self.reconcile_cycle().await {
                        Ok(report) if report != ReconcileReport::default() => {
                            info!(
                                failed = report.failed,
                                pruned = report.pruned,
                                "Sandbox reconcile cycle changed state"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => warn!("Sandbox reconcile cycle failed: {}", e),
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping sandbox reconciler");
                    break;
                }
            }
        }

        info!("Sandbox reconciler background task stopped");
    }

    pub async fn reconcile_cycle(&self) -> OrchestratorResult<ReconcileReport> {
        let failed = self.sandbox_service.reconcile().await?;
        let pruned = if self.config.prune_orphans {
            self.sandbox_service.prune_orphans().await?
        } else {
            0
        };
        Ok(ReconcileReport { failed, pruned })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::{ProjectId, SandboxId};
    use crate::domain::runtime::ResourceLimits;
    use crate::domain::sandbox::Sandbox;
    use crate::domain::OrchestratorError;
    use async_trait::async_trait;

    struct MockSandboxService {
        reconciles: Arc<tokio::sync::Mutex<usize>>,
        prunes: Arc<tokio::sync::Mutex<usize>>,
    }

    impl MockSandboxService {
        fn new() -> Self {
            Self {
                reconciles: Arc::new(tokio::sync::Mutex::new(0)),
                prunes: Arc::new(tokio::sync::Mutex::new(0)),
            }
        }
    }

    #[async_trait]
    impl SandboxService for MockSandboxService {
        async fn create_sandbox(
            &self,
            _p: ProjectId,
            _i: Option<String>,
            _r: Option<ResourceLimits>,
        ) -> OrchestratorResult<Sandbox> {
            Err(OrchestratorError::InvalidConfiguration("unused".into()))
        }
        async fn stop_sandbox(&self, id: SandboxId) -> OrchestratorResult<Sandbox> {
            Err(OrchestratorError::not_found("Sandbox", id))
        }
        async fn reset_sandbox(&self, id: SandboxId) -> OrchestratorResult<Sandbox> {
            Err(OrchestratorError::not_found("Sandbox", id))
        }
        async fn touch(&self, id: SandboxId) -> OrchestratorResult<Sandbox> {
            Err(OrchestratorError::not_found("Sandbox", id))
        }
        async fn get_sandbox(&self, id: SandboxId) -> OrchestratorResult<Sandbox> {
            Err(OrchestratorError::not_found("Sandbox", id))
        }
        async fn get_sandbox_by_project(
            &self,
            project_id: &ProjectId,
        ) -> OrchestratorResult<Sandbox> {
            Err(OrchestratorError::not_found("Sandbox for project", project_id))
        }
        async fn list_sandboxes(&self) -> OrchestratorResult<Vec<Sandbox>> {
            Ok(vec![])
        }
        async fn reconcile(&self) -> OrchestratorResult<usize> {
            *self.reconciles.lock().await += 1;
            Ok(2)
        }
        async fn prune_orphans(&self) -> OrchestratorResult<usize> {
            *self.prunes.lock().await += 1;
            Ok(1)
        }
    }

    #[tokio::test]
    async fn test_reconcile_cycle_reports_both_passes() {
        let service = Arc::new(MockSandboxService::new());
        let reconciler =
            SandboxReconciler::new(service.clone(), SandboxReconcilerConfig::default());

        let report = reconciler.reconcile_cycle().await.unwrap();
        assert_eq!(report, ReconcileReport { failed: 2, pruned: 1 });
    }

    #[tokio::test]
    async fn test_prune_can_be_disabled() {
        let service = Arc::new(MockSandboxService::new());
        let config = SandboxReconcilerConfig {
            prune_orphans: false,
            ..Default::default()
        };
        let reconciler = SandboxReconciler::new(service.clone(), config);

        let report = reconciler.reconcile_cycle().await.unwrap();
        assert_eq!(report.pruned, 0);
        assert_eq!(*service.prunes.lock().await, 0);
    }

    #[tokio::test]
    async fn test_reconciler_stops_on_shutdown() {
        let service = Arc::new(MockSandboxService::new());
        let reconciler = Arc::new(SandboxReconciler::new(
            service.clone(),
            SandboxReconcilerConfig::default(),
        ));
        let token = reconciler.shutdown_token();

        let handle = reconciler.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("reconciler did not stop")
            .unwrap();
        // The first tick fires immediately
        assert_eq!(*service.reconciles.lock().await, 1);
    }
}
