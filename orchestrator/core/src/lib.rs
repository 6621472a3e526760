// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Hive Orchestrator Core
//!
//! Shared kernel for the orchestration engine plus the sandbox half of it.
//!
//! # Architecture
//!
//! - **domain:** ids, error kinds, clock, events, config manifest, port pool,
//!   sandbox aggregate and the container runtime / store interfaces
//! - **application:** sandbox lifecycle service and its reconcile loop
//! - **infrastructure:** event bus, Docker and mock runtimes, in-memory store

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
