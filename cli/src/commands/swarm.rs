// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Swarm commands
//!
//! Commands: create, list, show, status, scale, terminate

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use uuid::Uuid;

use hive_core::SwarmId;
use hive_swarm::application::CreateSwarmRequest;
use hive_swarm::domain::{Swarm, SwarmStatus, SwarmStrategy, SwarmTopology};

use super::{print_json, short, Target};
use crate::daemon::require_daemon;

#[derive(Subcommand)]
pub enum SwarmCommand {
    /// Create a swarm
    Create {
        /// Display name (default: swarm-<id>)
        #[arg(long)]
        name: Option<String>,

        /// mesh, hierarchical, star or ring
        #[arg(long, default_value = "mesh")]
        topology: SwarmTopology,

        /// balanced, specialized or adaptive
        #[arg(long, default_value = "balanced")]
        strategy: SwarmStrategy,

        /// Agent cap
        #[arg(long, default_value = "8")]
        max_agents: u32,
    },

    /// List swarms
    List,

    /// Show one swarm
    Show {
        #[arg(value_name = "SWARM_ID")]
        swarm_id: Uuid,
    },

    /// Agent and task counts of a swarm
    Status {
        #[arg(value_name = "SWARM_ID")]
        swarm_id: Uuid,
    },

    /// Change the agent cap of a swarm
    Scale {
        #[arg(value_name = "SWARM_ID")]
        swarm_id: Uuid,

        #[arg(value_name = "MAX_AGENTS")]
        max_agents: u32,
    },

    /// Drain and terminate a swarm
    Terminate {
        #[arg(value_name = "SWARM_ID")]
        swarm_id: Uuid,
    },
}

pub async fn handle_command(command: SwarmCommand, target: &Target) -> Result<()> {
    let client = require_daemon(&target.host, target.port).await?;

    match command {
        SwarmCommand::Create {
            name,
            topology,
            strategy,
            max_agents,
        } => {
            let swarm = client
                .create_swarm(&CreateSwarmRequest {
                    name,
                    topology,
                    strategy,
                    max_agents,
                })
                .await?;
            if target.json {
                return print_json(&swarm);
            }
            println!("{}", format!("✓ Swarm created: {}", swarm.id).green());
            print_swarm(&swarm);
        }
        SwarmCommand::List => {
            let swarms = client.list_swarms().await?;
            if target.json {
                return print_json(&swarms);
            }
            if swarms.is_empty() {
                println!("{}", "No swarms found".yellow());
                return Ok(());
            }
            println!(
                "{:<10} {:<24} {:<14} {:<12} {:<6} {}",
                "ID", "NAME", "TOPOLOGY", "STRATEGY", "MAX", "STATUS"
            );
            for swarm in swarms {
                println!(
                    "{:<10} {:<24} {:<14} {:<12} {:<6} {}",
                    short(swarm.id),
                    swarm.name.bold(),
                    swarm.topology,
                    swarm.strategy,
                    swarm.max_agents,
                    colored_status(swarm.status)
                );
            }
        }
        SwarmCommand::Show { swarm_id } => {
            let swarm = client.get_swarm(SwarmId(swarm_id)).await?;
            if target.json {
                return print_json(&swarm);
            }
            print_swarm(&swarm);
        }
        SwarmCommand::Status { swarm_id } => {
            let report = client.swarm_status(SwarmId(swarm_id)).await?;
            if target.json {
                return print_json(&report);
            }
            print_swarm(&report.swarm);
            println!(
                "  Agents: {}/{} live",
                report.live_agents, report.swarm.max_agents
            );
            for (status, count) in &report.agents {
                println!("    {:<10} {}", status, count);
            }
            println!("  Tasks:");
            for (status, count) in &report.tasks {
                println!("    {:<12} {}", status, count);
            }
        }
        SwarmCommand::Scale { swarm_id, max_agents } => {
            let swarm = client.scale_swarm(SwarmId(swarm_id), max_agents).await?;
            if target.json {
                return print_json(&swarm);
            }
            println!(
                "{}",
                format!("✓ Swarm {} scaled to {} agents", swarm.id, swarm.max_agents).green()
            );
        }
        SwarmCommand::Terminate { swarm_id } => {
            println!("Terminating swarm {} (waits for running tasks)...", swarm_id);
            let swarm = client.terminate_swarm(SwarmId(swarm_id)).await?;
            if target.json {
                return print_json(&swarm);
            }
            println!("{}", format!("✓ Swarm {} terminated", swarm.id).green());
        }
    }

    Ok(())
}

fn print_swarm(swarm: &Swarm) {
    println!("{}", swarm.name.bold());
    println!("  ID: {}", swarm.id);
    println!("  Topology: {}", swarm.topology);
    println!("  Strategy: {}", swarm.strategy);
    println!("  Max agents: {}", swarm.max_agents);
    println!("  Status: {}", colored_status(swarm.status));
    println!("  Created: {}", swarm.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
}

fn colored_status(status: SwarmStatus) -> colored::ColoredString {
    match status {
        SwarmStatus::Active => status.as_str().green(),
        SwarmStatus::Initializing | SwarmStatus::Draining => status.as_str().yellow(),
        SwarmStatus::Terminated => status.as_str().dimmed(),
    }
}
