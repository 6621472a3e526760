// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod sandbox_manager;
pub mod sandbox_reconciler;

pub use sandbox_manager::{
    SandboxManagerConfig, SandboxOperation, SandboxService, StandardSandboxService,
};
pub use sandbox_reconciler::{ReconcileReport, SandboxReconciler, SandboxReconcilerConfig};
