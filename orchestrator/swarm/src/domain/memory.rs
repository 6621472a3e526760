// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Duration, Utc};
use hive_core::SwarmId;
use serde::{Deserialize, Serialize};

pub const DEFAULT_NAMESPACE: &str = "default";

/// Identity of a memory entry: the latest write for a key wins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemoryKey {
    pub swarm_id: SwarmId,
    pub namespace: String,
    pub key: String,
}

impl MemoryKey {
    pub fn new(swarm_id: SwarmId, namespace: Option<&str>, key: impl Into<String>) -> Self {
        let namespace = namespace
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
            .unwrap_or(DEFAULT_NAMESPACE);
        Self {
            swarm_id,
            namespace: namespace.to_string(),
            key: key.into(),
        }
    }
}

impl std::fmt::Display for MemoryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.swarm_id, self.namespace, self.key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub swarm_id: SwarmId,
    pub namespace: String,
    pub key: String,
    pub value: serde_json::Value,
    /// `None` never expires
    pub ttl_seconds: Option<u64>,
    /// Time of the write holding the current value; the TTL runs from here
    pub created_at: DateTime<Utc>,
    /// Last write or successful read
    pub updated_at: DateTime<Utc>,
    pub access_count: u64,
}

impl MemoryEntry {
    pub fn new(
        key: MemoryKey,
        value: serde_json::Value,
        ttl_seconds: Option<u64>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            swarm_id: key.swarm_id,
            namespace: key.namespace,
            key: key.key,
            value,
            ttl_seconds,
            created_at: now,
            updated_at: now,
            access_count: 0,
        }
    }

    pub fn memory_key(&self) -> MemoryKey {
        MemoryKey {
            swarm_id: self.swarm_id,
            namespace: self.namespace.clone(),
            key: self.key.clone(),
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.ttl_seconds.map(|ttl| {
            i64::try_from(ttl)
                .ok()
                .and_then(Duration::try_seconds)
                .and_then(|ttl| self.created_at.checked_add_signed(ttl))
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        })
    }

    /// Expired once strictly more than `ttl_seconds` have elapsed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|expires_at| now > expires_at)
    }
}
