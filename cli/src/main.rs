// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0

//! # Hive CLI
//!
//! The `hive` binary runs the orchestration daemon and talks to it.
//!
//! ## Architecture
//!
//! - **Daemon mode**: `hive daemon run` hosts the engine and its HTTP API in
//!   the foreground
//! - **Client mode**: every other command sends requests to a running daemon
//! - **Detection**: HTTP health check against `--host`/`--port`
//!
//! ## Commands
//!
//! - `hive daemon run|status` - Run or check the daemon
//! - `hive swarm|agent|task|memory` - Swarm coordination
//! - `hive sandbox` - Project sandboxes
//! - `hive config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use hive_core::domain::engine_config::EngineConfigManifest;
use hive_orchestrator::commands::{
    self, AgentCommand, ConfigCommand, DaemonCommand, MemoryCommand, SandboxCommand, SwarmCommand,
    Target, TaskCommand,
};

const DEFAULT_PORT: u16 = 8000;

/// Hive - multi-agent swarm coordination and project sandboxes
#[derive(Parser)]
#[command(name = "hive")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "HIVE_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// HTTP API port (default: 8000, or the configured port for `daemon run`)
    #[arg(long, global = true, env = "HIVE_PORT")]
    port: Option<u16>,

    /// HTTP API host (default: 127.0.0.1)
    #[arg(long, global = true, env = "HIVE_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "HIVE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Print raw JSON responses
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run or check the daemon
    #[command(name = "daemon")]
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Swarm lifecycle
    #[command(name = "swarm")]
    Swarm {
        #[command(subcommand)]
        command: SwarmCommand,
    },

    /// Agent management
    #[command(name = "agent")]
    Agent {
        #[command(subcommand)]
        command: AgentCommand,
    },

    /// Task submission and results
    #[command(name = "task")]
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },

    /// Shared swarm memory
    #[command(name = "memory")]
    Memory {
        #[command(subcommand)]
        command: MemoryCommand,
    },

    /// Project sandboxes
    #[command(name = "sandbox")]
    Sandbox {
        #[command(subcommand)]
        command: SandboxCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The daemon takes its log format and level from the config file
    let logging = match &cli.command {
        Some(Commands::Daemon {
            command: DaemonCommand::Run,
        }) => EngineConfigManifest::load_or_default(cli.config.clone())
            .ok()
            .and_then(|config| config.spec.observability)
            .and_then(|observability| observability.logging),
        _ => None,
    };
    let level = cli
        .log_level
        .clone()
        .or_else(|| logging.as_ref().map(|l| l.level.clone()))
        .unwrap_or_else(|| "info".to_string());
    let json = logging.as_ref().map(|l| l.format == "json").unwrap_or(false);
    init_logging(&level, json)?;

    let target = Target {
        host: cli.host.clone(),
        port: cli.port.unwrap_or(DEFAULT_PORT),
        json: cli.json,
    };

    match cli.command {
        Some(Commands::Daemon { command }) => {
            commands::daemon::handle_command(command, cli.config, cli.port, &target).await
        }
        Some(Commands::Swarm { command }) => {
            commands::swarm::handle_command(command, &target).await
        }
        Some(Commands::Agent { command }) => {
            commands::agent::handle_command(command, &target).await
        }
        Some(Commands::Task { command }) => commands::task::handle_command(command, &target).await,
        Some(Commands::Memory { command }) => {
            commands::memory::handle_command(command, &target).await
        }
        Some(Commands::Sandbox { command }) => {
            commands::sandbox::handle_command(command, &target).await
        }
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging. `RUST_LOG` wins over `level`.
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .init();
    }

    Ok(())
}
