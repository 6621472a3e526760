// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Daemon lifecycle commands
//!
//! Commands: run, status

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use crate::daemon::{check_daemon_running, DaemonStatus};
use hive_core::domain::engine_config::EngineConfigManifest;

use super::Target;

#[derive(Subcommand)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground
    Run,

    /// Check daemon status
    Status,
}

/// `port_flag` is the explicit `--port`, which overrides the configured API
/// port for `run`.
pub async fn handle_command(
    command: DaemonCommand,
    config_path: Option<PathBuf>,
    port_flag: Option<u16>,
    target: &Target,
) -> Result<()> {
    match command {
        DaemonCommand::Run => {
            let config = EngineConfigManifest::load_or_default(config_path)
                .context("Failed to load configuration")?;
            crate::daemon::run(config, port_flag).await
        }
        DaemonCommand::Status => status(target).await,
    }
}

async fn status(target: &Target) -> Result<()> {
    match check_daemon_running(&target.host, target.port).await {
        Ok(DaemonStatus::Running { version, uptime }) => {
            println!("{}", "✓ Daemon is running".green());
            println!("  Address: {}:{}", target.host, target.port);
            if let Some(version) = version {
                println!("  Version: {}", version);
            }
            if let Some(uptime) = uptime {
                println!("  Uptime: {}", format_duration(uptime));
            }
        }
        Ok(DaemonStatus::Stopped) => {
            println!("{}", "✗ Daemon is not running".red());
        }
        Ok(DaemonStatus::Unhealthy { error }) => {
            println!("{}", "⚠ Daemon unhealthy".yellow());
            println!("  HTTP API check failed: {}", error);
        }
        Err(e) => {
            println!("{}", format!("✗ Failed to check status: {}", e).red());
            return Err(e);
        }
    }

    Ok(())
}

fn format_duration(secs: u64) -> String {
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let minutes = (secs % 3600) / 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}
