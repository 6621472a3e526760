// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use uuid::Uuid;

use hive_core::{AgentId, SwarmId};
use hive_swarm::application::SpawnAgentRequest;
use hive_swarm::domain::{Agent, AgentStatus};

use super::{print_json, short, Target};
use crate::daemon::require_daemon;

#[derive(Subcommand)]
pub enum AgentCommand {
    /// Spawn an agent into a swarm
    Spawn {
        #[arg(value_name = "SWARM_ID")]
        swarm_id: Uuid,

        /// Agent type (e.g. coder, tester)
        #[arg(long = "type", value_name = "TYPE")]
        agent_type: String,

        #[arg(long)]
        name: Option<String>,

        /// Capability tag; repeat for several
        #[arg(long = "capability", short = 'c', value_name = "CAPABILITY")]
        capabilities: Vec<String>,
    },

    /// List the agents of a swarm
    List {
        #[arg(value_name = "SWARM_ID")]
        swarm_id: Uuid,
    },

    /// Show one agent
    Show {
        #[arg(value_name = "AGENT_ID")]
        agent_id: Uuid,
    },

    /// Remove an agent
    Remove {
        #[arg(value_name = "AGENT_ID")]
        agent_id: Uuid,

        /// Remove even if busy, failing its current task
        #[arg(short, long)]
        force: bool,
    },

    /// Report that a busy agent failed
    Error {
        #[arg(value_name = "AGENT_ID")]
        agent_id: Uuid,

        #[arg(value_name = "REASON")]
        reason: String,
    },
}

pub async fn handle_command(command: AgentCommand, target: &Target) -> Result<()> {
    let client = require_daemon(&target.host, target.port).await?;

    match command {
        AgentCommand::Spawn {
            swarm_id,
            agent_type,
            name,
            capabilities,
        } => {
            let agent = client
                .spawn_agent(
                    SwarmId(swarm_id),
                    &SpawnAgentRequest {
                        agent_type,
                        name,
                        capabilities,
                    },
                )
                .await?;
            if target.json {
                return print_json(&agent);
            }
            println!("{}", format!("✓ Agent spawned: {}", agent.id).green());
            print_agent(&agent);
        }
        AgentCommand::List { swarm_id } => {
            let agents = client.list_agents(SwarmId(swarm_id)).await?;
            if target.json {
                return print_json(&agents);
            }
            if agents.is_empty() {
                println!("{}", "No agents found".yellow());
                return Ok(());
            }

            println!("{} agents found:", agents.len());
            println!(
                "{:<10} {:<24} {:<12} {:<9} {:<10} {}",
                "ID", "NAME", "TYPE", "STATUS", "TASK", "CAPABILITIES"
            );
            for agent in agents {
                println!(
                    "{:<10} {:<24} {:<12} {:<9} {:<10} {}",
                    short(agent.id),
                    agent.name.bold(),
                    agent.agent_type,
                    colored_status(agent.status),
                    agent.current_task.map(short).unwrap_or_else(|| "-".to_string()),
                    agent.capabilities.iter().cloned().collect::<Vec<_>>().join(",")
                );
            }
        }
        AgentCommand::Show { agent_id } => {
            let agent = client.get_agent(AgentId(agent_id)).await?;
            if target.json {
                return print_json(&agent);
            }
            print_agent(&agent);
        }
        AgentCommand::Remove { agent_id, force } => {
            let agent = client.remove_agent(AgentId(agent_id), force).await?;
            if target.json {
                return print_json(&agent);
            }
            println!("{}", format!("✓ Agent {} removed", agent.id).green());
        }
        AgentCommand::Error { agent_id, reason } => {
            let agent = client.report_agent_error(AgentId(agent_id), reason).await?;
            if target.json {
                return print_json(&agent);
            }
            println!("{}", format!("Agent {} marked as errored", agent.id).yellow());
        }
    }

    Ok(())
}

fn print_agent(agent: &Agent) {
    println!("{}", agent.name.bold());
    println!("  ID: {}", agent.id);
    println!("  Swarm: {}", agent.swarm_id);
    println!("  Type: {}", agent.agent_type);
    println!("  Status: {}", colored_status(agent.status));
    if let Some(task) = agent.current_task {
        println!("  Current task: {}", task);
    }
    if !agent.capabilities.is_empty() {
        println!(
            "  Capabilities: {}",
            agent.capabilities.iter().cloned().collect::<Vec<_>>().join(", ")
        );
    }
    println!(
        "  Tasks: {} completed, {} failed ({:.0}% success)",
        agent.metrics.tasks_completed,
        agent.metrics.tasks_failed,
        agent.metrics.success_rate() * 100.0
    );
    println!("  Last active: {}", agent.last_active.format("%Y-%m-%d %H:%M:%S UTC"));
}

fn colored_status(status: AgentStatus) -> colored::ColoredString {
    match status {
        AgentStatus::Idle | AgentStatus::Active => status.as_str().green(),
        AgentStatus::Busy => status.as_str().cyan(),
        AgentStatus::Error => status.as_str().red(),
        AgentStatus::Removed => status.as_str().dimmed(),
    }
}
