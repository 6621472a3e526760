// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod repositories;

pub use repositories::{
    InMemoryAgentRepository, InMemoryMemoryRepository, InMemorySwarmRepository,
    InMemoryTaskRepository,
};
