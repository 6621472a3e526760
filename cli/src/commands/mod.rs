// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Hive CLI

use anyhow::Result;
use serde::Serialize;

pub mod agent;
pub mod config;
pub mod daemon;
pub mod memory;
pub mod sandbox;
pub mod swarm;
pub mod task;

pub use self::agent::AgentCommand;
pub use self::config::ConfigCommand;
pub use self::daemon::DaemonCommand;
pub use self::memory::MemoryCommand;
pub use self::sandbox::SandboxCommand;
pub use self::swarm::SwarmCommand;
pub use self::task::TaskCommand;

/// Where a command should send its requests.
#[derive(Debug, Clone)]
pub struct Target {
    pub host: String,
    pub port: u16,
    /// Print raw JSON instead of tables
    pub json: bool,
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// First eight characters of an id, for table columns.
pub(crate) fn short(id: impl ToString) -> String {
    let id = id.to_string();
    id.chars().take(8).collect()
}
