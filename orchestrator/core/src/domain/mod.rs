// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Domain Layer
//!
//! Types and invariants shared by every engine component. Nothing in here
//! performs I/O; collaborators are expressed as traits.

pub mod clock;
pub mod engine_config;
pub mod error;
pub mod events;
pub mod ids;
pub mod port_pool;
pub mod repository;
pub mod runtime;
pub mod sandbox;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{OrchestratorError, OrchestratorResult};
pub use ids::{AgentId, ProjectId, SandboxId, SwarmId, TaskId};
