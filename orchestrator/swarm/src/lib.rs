// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # `hive-swarm` - Swarm Coordination Crate
//!
//! Agent registry, task scheduler and swarm-scoped shared memory.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `Swarm`, `Agent`, `Task`, `MemoryEntry` aggregates, repositories |
//! | [`application`] | Application | `SwarmCoordinator` façade, dispatch, memory store, sweeper |
//! | [`infrastructure`] | Infrastructure | In-memory repositories |
//!
//! ## Key Concepts
//!
//! - **Swarm**: a bounded group of agents with a topology label and a
//!   selection strategy. Terminated swarms stay queryable.
//! - **Dispatch cycle**: runs after every state change and pairs pending
//!   tasks with idle agents by priority, FIFO within a priority.
//! - **Memory**: JSON values keyed by `(swarm, namespace, key)` with an
//!   optional TTL, evicted lazily on read and by the background sweeper.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::*;
