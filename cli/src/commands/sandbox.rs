// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Sandbox commands
//!
//! Commands: create, list, show, project, stop, reset, touch, reconcile

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use uuid::Uuid;

use hive_core::domain::runtime::ResourceLimits;
use hive_core::domain::sandbox::{Sandbox, SandboxStatus};
use hive_core::SandboxId;

use super::{print_json, short, Target};
use crate::daemon::require_daemon;

#[derive(Subcommand)]
pub enum SandboxCommand {
    /// Create (or return) the sandbox of a project and start it
    Create {
        #[arg(value_name = "PROJECT_ID")]
        project_id: String,

        /// Container image (must be on the allow-list)
        #[arg(long)]
        image: Option<String>,

        /// Relative CPU weight
        #[arg(long, requires = "memory_mb")]
        cpu_shares: Option<u32>,

        /// Memory limit in MiB
        #[arg(long, requires = "cpu_shares")]
        memory_mb: Option<u64>,
    },

    /// List sandboxes
    List,

    /// Show one sandbox
    Show {
        #[arg(value_name = "SANDBOX_ID")]
        sandbox_id: Uuid,
    },

    /// Show the sandbox of a project
    Project {
        #[arg(value_name = "PROJECT_ID")]
        project_id: String,
    },

    /// Stop a sandbox and release its port
    Stop {
        #[arg(value_name = "SANDBOX_ID")]
        sandbox_id: Uuid,
    },

    /// Recreate the container of a sandbox
    Reset {
        #[arg(value_name = "SANDBOX_ID")]
        sandbox_id: Uuid,
    },

    /// Record activity on a sandbox
    Touch {
        #[arg(value_name = "SANDBOX_ID")]
        sandbox_id: Uuid,
    },

    /// Compare running sandboxes against the container runtime
    Reconcile,
}

pub async fn handle_command(command: SandboxCommand, target: &Target) -> Result<()> {
    let client = require_daemon(&target.host, target.port).await?;

    match command {
        SandboxCommand::Create {
            project_id,
            image,
            cpu_shares,
            memory_mb,
        } => {
            let resources = match (cpu_shares, memory_mb) {
                (Some(cpu_shares), Some(memory_mb)) => Some(ResourceLimits {
                    cpu_shares,
                    memory_limit: memory_mb * 1024 * 1024,
                }),
                _ => None,
            };
            let sandbox = client.create_sandbox(project_id, image, resources).await?;
            if target.json {
                return print_json(&sandbox);
            }
            println!("{}", format!("✓ Sandbox ready: {}", sandbox.id).green());
            print_sandbox(&sandbox);
        }
        SandboxCommand::List => {
            let sandboxes = client.list_sandboxes().await?;
            if target.json {
                return print_json(&sandboxes);
            }
            if sandboxes.is_empty() {
                println!("{}", "No sandboxes found".yellow());
                return Ok(());
            }
            println!(
                "{:<10} {:<24} {:<28} {:<9} {}",
                "ID", "PROJECT", "IMAGE", "STATUS", "PORT"
            );
            for sandbox in sandboxes {
                println!(
                    "{:<10} {:<24} {:<28} {:<9} {}",
                    short(sandbox.id),
                    sandbox.project_id.to_string(),
                    sandbox.image,
                    colored_status(sandbox.status),
                    sandbox
                        .allocated_port
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
            }
        }
        SandboxCommand::Show { sandbox_id } => {
            let sandbox = client.get_sandbox(SandboxId(sandbox_id)).await?;
            if target.json {
                return print_json(&sandbox);
            }
            print_sandbox(&sandbox);
        }
        SandboxCommand::Project { project_id } => {
            let sandbox = client.get_sandbox_by_project(&project_id).await?;
            if target.json {
                return print_json(&sandbox);
            }
            print_sandbox(&sandbox);
        }
        SandboxCommand::Stop { sandbox_id } => {
            let sandbox = client.stop_sandbox(SandboxId(sandbox_id)).await?;
            if target.json {
                return print_json(&sandbox);
            }
            println!("{}", format!("✓ Sandbox {} stopped", sandbox.id).green());
        }
        SandboxCommand::Reset { sandbox_id } => {
            let sandbox = client.reset_sandbox(SandboxId(sandbox_id)).await?;
            if target.json {
                return print_json(&sandbox);
            }
            println!("{}", format!("✓ Sandbox {} reset", sandbox.id).green());
            print_sandbox(&sandbox);
        }
        SandboxCommand::Touch { sandbox_id } => {
            let sandbox = client.touch_sandbox(SandboxId(sandbox_id)).await?;
            if target.json {
                return print_json(&sandbox);
            }
            println!(
                "Sandbox {} last accessed {}",
                sandbox.id,
                sandbox.last_accessed_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
        SandboxCommand::Reconcile => {
            let report = client.reconcile_sandboxes().await?;
            if target.json {
                return print_json(&report);
            }
            if report.failed == 0 && report.pruned == 0 {
                println!("{}", "✓ All sandboxes match the runtime".green());
            } else {
                println!(
                    "{}",
                    format!(
                        "Reconciled: {} marked failed, {} orphaned containers pruned",
                        report.failed, report.pruned
                    )
                    .yellow()
                );
            }
        }
    }

    Ok(())
}

fn print_sandbox(sandbox: &Sandbox) {
    println!("{}", sandbox.project_id.to_string().bold());
    println!("  ID: {}", sandbox.id);
    println!("  Image: {}", sandbox.image);
    println!("  Status: {}", colored_status(sandbox.status));
    if let Some(port) = sandbox.allocated_port {
        println!("  Port: {}", port);
    }
    if let Some(container) = &sandbox.container_ref {
        println!("  Container: {}", container);
    }
    println!(
        "  Resources: {} cpu shares, {} MiB",
        sandbox.resources.cpu_shares,
        sandbox.resources.memory_limit / (1024 * 1024)
    );
    if let Some(error) = &sandbox.last_error {
        println!("  Last error: {}", error.red());
    }
    println!(
        "  Last accessed: {}",
        sandbox.last_accessed_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
}

fn colored_status(status: SandboxStatus) -> colored::ColoredString {
    match status {
        SandboxStatus::Running => status.as_str().green(),
        SandboxStatus::Starting | SandboxStatus::Stopping => status.as_str().yellow(),
        SandboxStatus::Stopped => status.as_str().dimmed(),
        SandboxStatus::Error => status.as_str().red(),
    }
}
