// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Memory Sweeper - Background task bounding memory growth
//!
//! Runs [`MemoryStore::sweep`] on a fixed interval. The sweep only deletes,
//! one entry at a time, so foreground reads and writes are never held up for
//! longer than a single removal.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Periodic TTL eviction for the memory store

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::memory_store::MemoryStore;

#[derive(Debug, Clone)]
pub struct MemorySweeperConfig {
    /// How often to run the sweep (in seconds)
    pub interval_seconds: u64,

    pub enabled: bool,
}

impl Default for MemorySweeperConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 60,
            enabled: true,
        }
    }
}

pub struct MemorySweeper {
    memory_store: Arc<MemoryStore>,
    config: MemorySweeperConfig,
    shutdown_token: CancellationToken,
}

impl MemorySweeper {
    pub fn new(memory_store: Arc<MemoryStore>, config: MemorySweeperConfig) -> Self {
        Self {
            memory_store,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Get a handle to trigger shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Start the sweeper background task
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        if !self.config.enabled {
            info!("Memory sweeper is disabled");
            return;
        }

        info!(
            interval_seconds = self.config.interval_seconds,
            "Starting memory sweeper background task"
        );

        let mut tick = interval(Duration::from_secs(self.config.interval_seconds.max(1)));

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    debug!("Running memory sweep cycle");
                    if let Err(e) = self.memory_store.sweep().await {
                        warn!("Memory sweep cycle failed: {}", e);
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping memory sweeper");
                    break;
                }
            }
        }

        info!("Memory sweeper background task stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::memory::MemoryKey;
    use crate::infrastructure::InMemoryMemoryRepository;
    use hive_core::infrastructure::event_bus::EventBus;
    use hive_core::{ManualClock, SwarmId};

    #[tokio::test]
    async fn test_sweeper_evicts_in_background_and_stops() {
        let clock = Arc::new(ManualClock::default());
        let repository = Arc::new(InMemoryMemoryRepository::new());
        let store = Arc::new(MemoryStore::new(
            repository.clone(),
            clock.clone(),
            Arc::new(EventBus::with_default_capacity()),
        ));
        store
            .put(MemoryKey::new(SwarmId::new(), None, "k"), serde_json::json!(1), Some(1))
            .await
            .unwrap();
        clock.advance(chrono::Duration::seconds(2));

        let sweeper = Arc::new(MemorySweeper::new(store, MemorySweeperConfig::default()));
        let token = sweeper.shutdown_token();
        let handle = sweeper.start();

        // The first tick fires immediately
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(repository.is_empty());

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_disabled_sweeper_exits_immediately() {
        let store = Arc::new(MemoryStore::new(
            Arc::new(InMemoryMemoryRepository::new()),
            Arc::new(ManualClock::default()),
            Arc::new(EventBus::with_default_capacity()),
        ));
        let config = MemorySweeperConfig {
            enabled: false,
            ..Default::default()
        };
        let handle = Arc::new(MemorySweeper::new(store, config)).start();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
