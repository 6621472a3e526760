// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Task commands
//!
//! Commands: submit, list, show, report, cancel

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use uuid::Uuid;

use hive_core::{SwarmId, TaskId};
use hive_swarm::domain::{NewTask, Task, TaskPriority, TaskStatus, TaskStrategy};

use super::{print_json, short, Target};
use crate::daemon::require_daemon;

#[derive(Subcommand)]
pub enum TaskCommand {
    /// Submit a task to a swarm
    Submit {
        #[arg(value_name = "SWARM_ID")]
        swarm_id: Uuid,

        #[arg(value_name = "DESCRIPTION")]
        description: String,

        /// low, medium, high or critical
        #[arg(short, long, default_value = "medium")]
        priority: TaskPriority,

        /// sequential, parallel or adaptive
        #[arg(short, long, default_value = "adaptive")]
        strategy: TaskStrategy,

        /// Concurrency cap for parallel tasks
        #[arg(long)]
        max_agents: Option<u32>,

        /// Required capability; repeat for several
        #[arg(long = "require", short = 'r', value_name = "CAPABILITY")]
        required_capabilities: Vec<String>,

        /// Task that must complete first; repeat for several
        #[arg(long = "after", value_name = "TASK_ID")]
        dependencies: Vec<Uuid>,

        #[arg(long = "tag", value_name = "TAG")]
        tags: Vec<String>,
    },

    /// List the tasks of a swarm
    List {
        #[arg(value_name = "SWARM_ID")]
        swarm_id: Uuid,

        /// Only tasks in this status
        #[arg(long)]
        status: Option<TaskStatus>,
    },

    /// Show one task
    Show {
        #[arg(value_name = "TASK_ID")]
        task_id: Uuid,
    },

    /// Report the outcome of an in-progress task
    Report {
        #[arg(value_name = "TASK_ID")]
        task_id: Uuid,

        /// Mark the task failed instead of completed
        #[arg(long)]
        failed: bool,

        /// JSON result payload
        #[arg(long, value_name = "JSON")]
        payload: Option<String>,
    },

    /// Cancel a pending task
    Cancel {
        #[arg(value_name = "TASK_ID")]
        task_id: Uuid,
    },
}

pub async fn handle_command(command: TaskCommand, target: &Target) -> Result<()> {
    let client = require_daemon(&target.host, target.port).await?;

    match command {
        TaskCommand::Submit {
            swarm_id,
            description,
            priority,
            strategy,
            max_agents,
            required_capabilities,
            dependencies,
            tags,
        } => {
            let request = NewTask {
                description,
                priority,
                strategy,
                max_agents,
                required_capabilities: required_capabilities.into_iter().collect(),
                dependencies: dependencies.into_iter().map(TaskId).collect(),
                tags,
            };
            let task = client.submit_task(SwarmId(swarm_id), &request).await?;
            if target.json {
                return print_json(&task);
            }
            println!("{}", format!("✓ Task submitted: {}", task.id).green());
            print_task(&task);
        }
        TaskCommand::List { swarm_id, status } => {
            let tasks = client.list_tasks(SwarmId(swarm_id), status).await?;
            if target.json {
                return print_json(&tasks);
            }
            if tasks.is_empty() {
                println!("{}", "No tasks found".yellow());
                return Ok(());
            }

            println!(
                "{:<5} {:<10} {:<9} {:<11} {:<12} {:<10} {}",
                "SEQ", "ID", "PRIORITY", "STRATEGY", "STATUS", "AGENT", "DESCRIPTION"
            );
            for task in tasks {
                println!(
                    "{:<5} {:<10} {:<9} {:<11} {:<12} {:<10} {}",
                    task.sequence,
                    short(task.id),
                    task.priority,
                    task.strategy,
                    colored_status(task.status),
                    task.assigned_agent_id.map(short).unwrap_or_else(|| "-".to_string()),
                    task.description
                );
            }
        }
        TaskCommand::Show { task_id } => {
            let task = client.get_task(TaskId(task_id)).await?;
            if target.json {
                return print_json(&task);
            }
            print_task(&task);
        }
        TaskCommand::Report {
            task_id,
            failed,
            payload,
        } => {
            let payload = payload
                .map(|raw| serde_json::from_str(&raw).context("--payload must be valid JSON"))
                .transpose()?;
            let task = client.report_result(TaskId(task_id), !failed, payload).await?;
            if target.json {
                return print_json(&task);
            }
            println!("Task {} is now {}", task.id, colored_status(task.status));
        }
        TaskCommand::Cancel { task_id } => {
            let task = client.cancel_task(TaskId(task_id)).await?;
            if target.json {
                return print_json(&task);
            }
            println!("{}", format!("✓ Task {} cancelled", task.id).green());
        }
    }

    Ok(())
}

fn print_task(task: &Task) {
    println!("{}", task.description.bold());
    println!("  ID: {}", task.id);
    println!("  Swarm: {}", task.swarm_id);
    println!("  Sequence: {}", task.sequence);
    println!("  Priority: {}", task.priority);
    println!("  Strategy: {}", task.strategy);
    println!("  Status: {}", colored_status(task.status));
    if let Some(agent) = task.assigned_agent_id {
        println!("  Agent: {}", agent);
    }
    if !task.required_capabilities.is_empty() {
        println!(
            "  Requires: {}",
            task.required_capabilities.iter().cloned().collect::<Vec<_>>().join(", ")
        );
    }
    if !task.dependencies.is_empty() {
        let deps: Vec<String> = task.dependencies.iter().map(|d| d.to_string()).collect();
        println!("  After: {}", deps.join(", "));
    }
    if let Some(reason) = &task.failure_reason {
        println!("  Reason: {}", reason);
    }
    if let Some(result) = &task.result {
        println!("  Result: {}", result);
    }
}

fn colored_status(status: TaskStatus) -> colored::ColoredString {
    match status {
        TaskStatus::Pending => status.as_str().yellow(),
        TaskStatus::InProgress => status.as_str().cyan(),
        TaskStatus::Completed => status.as_str().green(),
        TaskStatus::Failed => status.as_str().red(),
        TaskStatus::Cancelled => status.as_str().dimmed(),
    }
}
