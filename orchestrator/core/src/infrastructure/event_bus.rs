// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Domain Events
//
// In-memory notification sink built on tokio broadcast channels. Publishing
// never blocks the engine; slow subscribers lag and lose the oldest events.

use crate::domain::events::{AgentEvent, MemoryEvent, SandboxEvent, SwarmEvent, TaskEvent};
use crate::domain::ids::SwarmId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Unified domain event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Swarm(SwarmEvent),
    Agent(AgentEvent),
    Task(TaskEvent),
    Sandbox(SandboxEvent),
    Memory(MemoryEvent),
}

impl DomainEvent {
    /// Owning swarm, for events scoped to one.
    pub fn swarm_id(&self) -> Option<SwarmId> {
        match self {
            DomainEvent::Swarm(e) => Some(e.swarm_id()),
            DomainEvent::Agent(e) => Some(e.swarm_id()),
            DomainEvent::Task(e) => Some(e.swarm_id()),
            DomainEvent::Sandbox(_) | DomainEvent::Memory(_) => None,
        }
    }
}

/// Event bus for publishing and subscribing to domain events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before dropping old ones
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish_swarm_event(&self, event: SwarmEvent) {
        self.publish(DomainEvent::Swarm(event));
    }

    pub fn publish_agent_event(&self, event: AgentEvent) {
        self.publish(DomainEvent::Agent(event));
    }

    pub fn publish_task_event(&self, event: TaskEvent) {
        self.publish(DomainEvent::Task(event));
    }

    pub fn publish_sandbox_event(&self, event: SandboxEvent) {
        self.publish(DomainEvent::Sandbox(event));
    }

    pub fn publish_memory_event(&self, event: MemoryEvent) {
        self.publish(DomainEvent::Memory(event));
    }

    /// Publish a domain event to all subscribers
    fn publish(&self, event: DomainEvent) {
        debug!("Publishing event: {:?}", event);

        // send() only fails when nobody is subscribed
        let receiver_count = self.sender.send(event).unwrap_or(0);

        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all domain events
    pub fn subscribe(&self) -> EventReceiver {
        let receiver = self.sender.subscribe();
        EventReceiver { receiver }
    }

    /// Subscribe to swarm, agent and task events of a single swarm
    pub fn subscribe_swarm(&self, swarm_id: SwarmId) -> SwarmEventReceiver {
        let receiver = self.sender.subscribe();
        SwarmEventReceiver { receiver, swarm_id }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all domain events
pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver filtered to one swarm
pub struct SwarmEventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
    swarm_id: SwarmId,
}

impl SwarmEventReceiver {
    /// Receive the next event belonging to the subscribed swarm
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if event.swarm_id() == Some(self.swarm_id) {
                return Ok(event);
            }
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
