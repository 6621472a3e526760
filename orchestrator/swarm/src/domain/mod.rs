// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Domain Layer
//!
//! Pure domain types for swarm coordination. No I/O dependencies.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`swarm`] | `Swarm`, `SwarmTopology`, `SwarmStrategy`, `SwarmStatus` |
//! | [`agent`] | `Agent`, `AgentStatus`, `AgentMetrics` |
//! | [`task`] | `Task`, `NewTask`, `TaskPriority`, `TaskStrategy`, `TaskStatus` |
//! | [`memory`] | `MemoryEntry`, `MemoryKey` |
//! | [`repository`] | store interfaces for all of the above |

/// Closed string enums: wire name, `Display`, and `FromStr` failing with
/// `InvalidConfiguration` for anything outside the set.
macro_rules! string_enum {
    ($name:ident, $label:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.pad(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = hive_core::OrchestratorError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(hive_core::OrchestratorError::InvalidConfiguration(format!(
                        "unknown {} '{}' (expected one of: {})",
                        $label,
                        other,
                        [$($text),+].join(", ")
                    ))),
                }
            }
        }
    };
}

pub mod agent;
pub mod memory;
pub mod repository;
pub mod swarm;
pub mod task;

pub use agent::*;
pub use memory::*;
pub use swarm::*;
pub use task::*;
