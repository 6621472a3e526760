// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Aggregate
//!
//! A swarm is a named group of agents sharing a topology, a coordination
//! strategy and a task queue. It exclusively owns its agents and tasks.
//!
//! ```text
//! initializing ──▶ active ──▶ draining ──▶ terminated
//! ```
//!
//! `initializing` is never persisted: [`Swarm::new`] validates and activates
//! in one step.

use chrono::{DateTime, Utc};
use hive_core::{OrchestratorError, OrchestratorResult, SwarmId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwarmTopology {
    Mesh,
    Hierarchical,
    Star,
    Ring,
}

string_enum!(SwarmTopology, "topology" {
    Mesh => "mesh",
    Hierarchical => "hierarchical",
    Star => "star",
    Ring => "ring",
});

/// How the scheduler picks among eligible idle agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwarmStrategy {
    /// Least-loaded agent first
    #[default]
    Balanced,
    /// Narrowest capability set that still covers the task
    Specialized,
    /// Best success rate first
    Adaptive,
}

string_enum!(SwarmStrategy, "swarm strategy" {
    Balanced => "balanced",
    Specialized => "specialized",
    Adaptive => "adaptive",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwarmStatus {
    Initializing,
    Active,
    Draining,
    Terminated,
}

string_enum!(SwarmStatus, "swarm status" {
    Initializing => "initializing",
    Active => "active",
    Draining => "draining",
    Terminated => "terminated",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Swarm {
    pub id: SwarmId,
    pub name: String,
    pub topology: SwarmTopology,
    pub strategy: SwarmStrategy,
    pub max_agents: u32,
    pub status: SwarmStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Swarm {
    pub fn new(
        name: Option<String>,
        topology: SwarmTopology,
        strategy: SwarmStrategy,
        max_agents: u32,
        now: DateTime<Utc>,
    ) -> OrchestratorResult<Self> {
        if max_agents == 0 {
            return Err(OrchestratorError::InvalidConfiguration(
                "max_agents must be greater than zero".to_string(),
            ));
        }

        let id = SwarmId::new();
        let name = match name.map(|n| n.trim().to_string()) {
            Some(n) if !n.is_empty() => n,
            _ => format!("swarm-{}", &id.to_string()[..8]),
        };

        Ok(Self {
            id,
            name,
            topology,
            strategy,
            max_agents,
            status: SwarmStatus::Active,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == SwarmStatus::Active
    }

    fn require_active(&self, operation: &'static str) -> OrchestratorResult<()> {
        if !self.is_active() {
            return Err(OrchestratorError::InvalidState {
                entity: "Swarm",
                id: self.id.to_string(),
                state: self.status.to_string(),
                operation,
            });
        }
        Ok(())
    }

    /// Change the agent cap. Returns the previous cap.
    pub fn scale(
        &mut self,
        max_agents: u32,
        active_agents: u32,
        now: DateTime<Utc>,
    ) -> OrchestratorResult<u32> {
        self.require_active("scale")?;
        if max_agents == 0 {
            return Err(OrchestratorError::InvalidConfiguration(
                "max_agents must be greater than zero".to_string(),
            ));
        }
        if max_agents < active_agents {
            return Err(OrchestratorError::InvalidConfiguration(format!(
                "swarm {} has {} active agents; cannot scale down to {}",
                self.id, active_agents, max_agents
            )));
        }
        let previous = self.max_agents;
        self.max_agents = max_agents;
        self.updated_at = now;
        Ok(previous)
    }

    pub fn begin_draining(&mut self, now: DateTime<Utc>) -> OrchestratorResult<()> {
        if self.status != SwarmStatus::Active {
            return Err(OrchestratorError::InvalidTransition {
                entity: "Swarm",
                id: self.id.to_string(),
                from: self.status.to_string(),
                to: SwarmStatus::Draining.to_string(),
            });
        }
        self.status = SwarmStatus::Draining;
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_terminated(&mut self, now: DateTime<Utc>) -> OrchestratorResult<()> {
        if self.status != SwarmStatus::Draining {
            return Err(OrchestratorError::InvalidTransition {
                entity: "Swarm",
                id: self.id.to_string(),
                from: self.status.to_string(),
                to: SwarmStatus::Terminated.to_string(),
            });
        }
        self.status = SwarmStatus::Terminated;
        self.updated_at = now;
        Ok(())
    }

    /// `SubmitTask` and friends require an active swarm.
    pub fn ensure_accepting_work(&self) -> OrchestratorResult<()> {
        self.require_active("submit")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_swarm_is_active_with_default_name() {
        let swarm = Swarm::new(None, SwarmTopology::Mesh, SwarmStrategy::Balanced, 3, Utc::now())
            .unwrap();
        assert_eq!(swarm.status, SwarmStatus::Active);
        assert!(swarm.name.starts_with("swarm-"));
        assert_eq!(swarm.name.len(), "swarm-".len() + 8);
    }

    #[test]
    fn test_zero_agents_is_invalid_configuration() {
        let err = Swarm::new(None, SwarmTopology::Star, SwarmStrategy::Adaptive, 0, Utc::now())
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_configuration");
    }

    #[test]
    fn test_enum_parsing_rejects_unknown_values() {
        assert_eq!("Ring".parse::<SwarmTopology>().unwrap(), SwarmTopology::Ring);
        assert_eq!("specialized".parse::<SwarmStrategy>().unwrap(), SwarmStrategy::Specialized);
        let err = "galaxy".parse::<SwarmTopology>().unwrap_err();
        assert!(err.to_string().contains("mesh, hierarchical, star, ring"));
    }

    #[test]
    fn test_scale_rejects_caps_below_active_agents() {
        let mut swarm =
            Swarm::new(None, SwarmTopology::Mesh, SwarmStrategy::Balanced, 4, Utc::now()).unwrap();
        assert!(swarm.scale(2, 3, Utc::now()).is_err());
        assert_eq!(swarm.scale(6, 3, Utc::now()).unwrap(), 4);
        assert_eq!(swarm.max_agents, 6);
    }

    #[test]
    fn test_lifecycle_only_moves_forward() {
        let mut swarm =
            Swarm::new(None, SwarmTopology::Mesh, SwarmStrategy::Balanced, 1, Utc::now()).unwrap();
        assert!(swarm.mark_terminated(Utc::now()).is_err());
        swarm.begin_draining(Utc::now()).unwrap();
        assert!(swarm.ensure_accepting_work().is_err());
        swarm.mark_terminated(Utc::now()).unwrap();
        assert!(swarm.begin_draining(Utc::now()).is_err());
    }
}
