// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Daemon mode implementation
//!
//! Handles:
//! - Engine wiring and background loops
//! - HTTP command API
//! - HTTP client used by the CLI subcommands
//! - Health checks

use anyhow::Result;
use std::time::Duration;

pub mod client;
pub mod engine;
pub mod server;

pub use client::DaemonClient;
pub use engine::Engine;
pub use server::run;

#[derive(Debug, Clone)]
pub enum DaemonStatus {
    Running { version: Option<String>, uptime: Option<u64> },
    Stopped,
    Unhealthy { error: String },
}

/// Check if the daemon answers its HTTP health check
pub async fn check_daemon_running(host: &str, port: u16) -> Result<DaemonStatus> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(500)) // Fast timeout for local checks
        .build()?;

    let base_url = if host.starts_with("http://") || host.starts_with("https://") {
        format!("{}:{}", host, port)
    } else {
        format!("http://{}:{}", host, port)
    };

    match client.get(format!("{}/health", base_url)).send().await {
        Ok(resp) if resp.status().is_success() => {
            let body = resp.json::<serde_json::Value>().await.ok();
            let uptime = body.as_ref().and_then(|v| v["uptime_seconds"].as_u64());
            let version = body
                .as_ref()
                .and_then(|v| v["version"].as_str())
                .map(str::to_string);
            Ok(DaemonStatus::Running { version, uptime })
        }
        Ok(resp) => Ok(DaemonStatus::Unhealthy {
            error: format!("HTTP {}", resp.status()),
        }),
        Err(e) if e.is_connect() || e.is_timeout() => Ok(DaemonStatus::Stopped),
        Err(e) => Ok(DaemonStatus::Unhealthy { error: e.to_string() }),
    }
}

/// Fail unless the daemon is up; used by every command that talks to it.
pub async fn require_daemon(host: &str, port: u16) -> Result<DaemonClient> {
    match check_daemon_running(host, port).await? {
        DaemonStatus::Running { .. } => DaemonClient::new(host, port),
        DaemonStatus::Unhealthy { error } => {
            anyhow::bail!("Daemon at {}:{} is unhealthy: {}", host, port, error)
        }
        DaemonStatus::Stopped => anyhow::bail!(
            "Daemon is not running at {}:{}. Start it with 'hive daemon run'.",
            host,
            port
        ),
    }
}
