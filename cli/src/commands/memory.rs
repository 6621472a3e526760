// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Swarm memory commands
//!
//! Commands: put, get, delete, list

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use uuid::Uuid;

use hive_core::SwarmId;
use hive_swarm::domain::{MemoryEntry, DEFAULT_NAMESPACE};

use super::{print_json, Target};
use crate::daemon::require_daemon;

#[derive(Subcommand)]
pub enum MemoryCommand {
    /// Store a value under a key
    Put {
        #[arg(value_name = "SWARM_ID")]
        swarm_id: Uuid,

        #[arg(value_name = "KEY")]
        key: String,

        /// JSON value; anything that does not parse is stored as a string
        #[arg(value_name = "VALUE")]
        value: String,

        #[arg(short, long, default_value = DEFAULT_NAMESPACE)]
        namespace: String,

        /// Expire the entry after this many seconds
        #[arg(long)]
        ttl: Option<u64>,
    },

    /// Read a value
    Get {
        #[arg(value_name = "SWARM_ID")]
        swarm_id: Uuid,

        #[arg(value_name = "KEY")]
        key: String,

        #[arg(short, long, default_value = DEFAULT_NAMESPACE)]
        namespace: String,
    },

    /// Delete a value
    Delete {
        #[arg(value_name = "SWARM_ID")]
        swarm_id: Uuid,

        #[arg(value_name = "KEY")]
        key: String,

        #[arg(short, long, default_value = DEFAULT_NAMESPACE)]
        namespace: String,
    },

    /// List the live entries of a namespace
    List {
        #[arg(value_name = "SWARM_ID")]
        swarm_id: Uuid,

        #[arg(short, long, default_value = DEFAULT_NAMESPACE)]
        namespace: String,
    },
}

pub async fn handle_command(command: MemoryCommand, target: &Target) -> Result<()> {
    let client = require_daemon(&target.host, target.port).await?;

    match command {
        MemoryCommand::Put {
            swarm_id,
            key,
            value,
            namespace,
            ttl,
        } => {
            let entry = client
                .put_memory(SwarmId(swarm_id), &namespace, &key, parse_value(&value), ttl)
                .await?;
            if target.json {
                return print_json(&entry);
            }
            println!("{}", format!("✓ Stored {}/{}", entry.namespace, entry.key).green());
        }
        MemoryCommand::Get {
            swarm_id,
            key,
            namespace,
        } => {
            let entry = client.get_memory(SwarmId(swarm_id), &namespace, &key).await?;
            if target.json {
                return print_json(&entry);
            }
            print_entry(&entry);
        }
        MemoryCommand::Delete {
            swarm_id,
            key,
            namespace,
        } => {
            let deleted = client.delete_memory(SwarmId(swarm_id), &namespace, &key).await?;
            if target.json {
                return print_json(&serde_json::json!({ "deleted": deleted }));
            }
            if deleted {
                println!("{}", format!("✓ Deleted {}/{}", namespace, key).green());
            } else {
                println!("{}", format!("No entry {}/{}", namespace, key).yellow());
            }
        }
        MemoryCommand::List { swarm_id, namespace } => {
            let entries = client.list_memory(SwarmId(swarm_id), &namespace).await?;
            if target.json {
                return print_json(&entries);
            }
            if entries.is_empty() {
                println!("{}", format!("Namespace '{}' is empty", namespace).yellow());
                return Ok(());
            }
            println!("{:<32} {:<8} {:<10} {}", "KEY", "READS", "TTL", "VALUE");
            for entry in entries {
                println!(
                    "{:<32} {:<8} {:<10} {}",
                    entry.key,
                    entry.access_count,
                    entry
                        .ttl_seconds
                        .map(|ttl| format!("{}s", ttl))
                        .unwrap_or_else(|| "-".to_string()),
                    entry.value
                );
            }
        }
    }

    Ok(())
}

fn parse_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

fn print_entry(entry: &MemoryEntry) {
    println!("{}", format!("{}/{}", entry.namespace, entry.key).bold());
    println!("  Value: {}", entry.value);
    println!("  Reads: {}", entry.access_count);
    println!("  Updated: {}", entry.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(expires_at) = entry.expires_at() {
        println!("  Expires: {}", expires_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
}
