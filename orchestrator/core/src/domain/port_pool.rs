// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Port Pool Allocator
//!
//! Hands out host ports from the closed range `[base, base + size)`.
//!
//! The free set lives behind a single `parking_lot::Mutex`; acquisition pops
//! the lowest free port under that lock, so choosing a port and marking it as
//! used is one atomic step. No runtime call is ever made while the lock is
//! held.

use std::collections::BTreeSet;

use metrics::gauge;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::domain::error::{OrchestratorError, OrchestratorResult};

/// Default first port of the pool (offset 10 from 8000).
pub const DEFAULT_PORT_BASE: u16 = 8010;
/// Default number of ports in the pool (offsets 10..=89).
pub const DEFAULT_PORT_POOL_SIZE: u16 = 80;

#[derive(Debug)]
pub struct PortPool {
    base: u16,
    size: u16,
    free: Mutex<BTreeSet<u16>>,
}

impl PortPool {
    pub fn new(base: u16, size: u16) -> OrchestratorResult<Self> {
        if size == 0 {
            return Err(OrchestratorError::InvalidConfiguration(
                "port pool size must be greater than zero".to_string(),
            ));
        }
        if base as u32 + size as u32 > u16::MAX as u32 + 1 {
            return Err(OrchestratorError::InvalidConfiguration(format!(
                "port pool of {} ports from {} exceeds the u16 port range",
                size, base
            )));
        }

        let free = (0..size).map(|offset| base + offset).collect();
        Ok(Self {
            base,
            size,
            free: Mutex::new(free),
        })
    }

    pub fn base(&self) -> u16 {
        self.base
    }

    pub fn size(&self) -> u16 {
        self.size
    }

    pub fn contains(&self, port: u16) -> bool {
        port >= self.base && (port as u32) < self.base as u32 + self.size as u32
    }

    /// Take the lowest-numbered free port.
    pub fn acquire(&self) -> OrchestratorResult<u16> {
        let mut free = self.free.lock();
        match free.pop_first() {
            Some(port) => {
                let in_use = self.size as usize - free.len();
                drop(free);
                gauge!("hive_port_pool_in_use").set(in_use as f64);
                debug!(port, in_use, "Acquired sandbox port");
                Ok(port)
            }
            None => {
                warn!(base = self.base, size = self.size, "Port pool exhausted");
                Err(OrchestratorError::PoolExhausted {
                    base: self.base,
                    size: self.size,
                })
            }
        }
    }

    /// Return a port to the free set. Releasing a port that is already free is
    /// a no-op.
    pub fn release(&self, port: u16) -> OrchestratorResult<()> {
        if !self.contains(port) {
            return Err(OrchestratorError::InvalidPort {
                port,
                base: self.base,
                size: self.size,
            });
        }

        let mut free = self.free.lock();
        if free.insert(port) {
            let in_use = self.size as usize - free.len();
            drop(free);
            gauge!("hive_port_pool_in_use").set(in_use as f64);
            debug!(port, in_use, "Released sandbox port");
        }
        Ok(())
    }

    /// Whether `port` is currently held by a caller.
    pub fn lookup(&self, port: u16) -> bool {
        self.contains(port) && !self.free.lock().contains(&port)
    }

    pub fn in_use(&self) -> usize {
        self.size as usize - self.free.lock().len()
    }

    pub fn available(&self) -> usize {
        self.free.lock().len()
    }
}

impl Default for PortPool {
    fn default() -> Self {
        let free = (0..DEFAULT_PORT_POOL_SIZE)
            .map(|offset| DEFAULT_PORT_BASE + offset)
            .collect();
        Self {
            base: DEFAULT_PORT_BASE,
            size: DEFAULT_PORT_POOL_SIZE,
            free: Mutex::new(free),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_exhaust_then_recover() {
        let pool = PortPool::default();
        assert_eq!(pool.size(), 80);

        let mut held = Vec::new();
        for _ in 0..80 {
            held.push(pool.acquire().expect("pool should have capacity"));
        }
        assert_eq!(held.first(), Some(&8010));
        assert_eq!(held.last(), Some(&8089));

        let err = pool.acquire().unwrap_err();
        assert!(matches!(err, OrchestratorError::PoolExhausted { .. }));

        pool.release(8042).unwrap();
        assert_eq!(pool.acquire().unwrap(), 8042);
    }

    #[test]
    fn test_acquire_returns_lowest_free_port() {
        let pool = PortPool::new(9000, 5).unwrap();
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        let c = pool.acquire().unwrap();
        assert_eq!((a, b, c), (9000, 9001, 9002));

        pool.release(b).unwrap();
        assert_eq!(pool.acquire().unwrap(), 9001);
    }

    #[test]
    fn test_release_is_idempotent_and_range_checked() {
        let pool = PortPool::new(9000, 2).unwrap();
        let port = pool.acquire().unwrap();
        assert!(pool.lookup(port));

        pool.release(port).unwrap();
        pool.release(port).unwrap();
        assert!(!pool.lookup(port));
        assert_eq!(pool.available(), 2);

        let err = pool.release(9002).unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidPort { port: 9002, .. }));
        assert!(!pool.lookup(8999));
    }

    #[test]
    fn test_rejects_invalid_ranges() {
        assert!(PortPool::new(9000, 0).is_err());
        assert!(PortPool::new(65500, 100).is_err());
        assert!(PortPool::new(65436, 100).is_ok());
    }

    #[test]
    fn test_concurrent_acquire_never_duplicates() {
        let pool = Arc::new(PortPool::new(20000, 64).unwrap());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    let mut mine = Vec::new();
                    for _ in 0..8 {
                        let port = pool.acquire().unwrap();
                        assert!(pool.contains(port));
                        mine.push(port);
                    }
                    // churn half of them back
                    for port in mine.drain(..4) {
                        pool.release(port).unwrap();
                    }
                    mine
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for port in handle.join().unwrap() {
                assert!(seen.insert(port), "port {} handed out twice", port);
            }
        }
        assert_eq!(pool.in_use(), seen.len());
    }
}
