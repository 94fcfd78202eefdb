//! Monitor events.
//!
//! Emitted by the monitor service for observers such as dashboards and tests.
//! Notifications themselves go through the dispatcher, not through here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::domain::{ConditionKind, ConditionStatus, ResourceClass};

/// Events emitted by the monitor service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MonitorEvent {
    /// A non-baseline condition was notified.
    ConditionDetected {
        resource_id: String,
        owner_id: String,
        kind: ConditionKind,
        status: ConditionStatus,
        timestamp: DateTime<Utc>,
    },
    /// An open condition returned to baseline.
    ConditionCleared {
        resource_id: String,
        kind: ConditionKind,
        timestamp: DateTime<Utc>,
    },
    /// An automatic order was created.
    AutoActionPlaced {
        resource_id: String,
        order_id: String,
        quantity: f64,
        timestamp: DateTime<Utc>,
    },
    /// An automatic order attempt failed.
    AutoActionFailed {
        resource_id: String,
        reason: String,
        /// Rejections are terminal for the cycle and notified; transient
        /// failures are only logged.
        rejected: bool,
        timestamp: DateTime<Utc>,
    },
    /// The resource could not be evaluated and was skipped.
    ResourceSkipped {
        resource_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// A full evaluation pass over one owner's class finished.
    CycleCompleted {
        owner_id: String,
        class: ResourceClass,
        cycle: u64,
        evaluated: usize,
        failed: usize,
        timestamp: DateTime<Utc>,
    },
}

impl MonitorEvent {
    /// Get a human-readable description of the event.
    pub fn description(&self) -> String {
        match self {
            MonitorEvent::ConditionDetected {
                resource_id,
                kind,
                status,
                ..
            } => format!("{}: {} is {}", resource_id, kind, status),
            MonitorEvent::ConditionCleared {
                resource_id, kind, ..
            } => format!("{}: {} cleared", resource_id, kind),
            MonitorEvent::AutoActionPlaced {
                resource_id,
                order_id,
                quantity,
                ..
            } => format!("{}: reorder {} placed for {}", resource_id, order_id, quantity),
            MonitorEvent::AutoActionFailed {
                resource_id,
                reason,
                ..
            } => format!("{}: reorder failed - {}", resource_id, reason),
            MonitorEvent::ResourceSkipped {
                resource_id,
                reason,
                ..
            } => format!("{}: skipped - {}", resource_id, reason),
            MonitorEvent::CycleCompleted {
                owner_id,
                class,
                cycle,
                evaluated,
                failed,
                ..
            } => format!(
                "{}/{} cycle {}: {} evaluated, {} failed",
                owner_id, class, cycle, evaluated, failed
            ),
        }
    }

    pub fn resource_id(&self) -> Option<&str> {
        match self {
            MonitorEvent::ConditionDetected { resource_id, .. }
            | MonitorEvent::ConditionCleared { resource_id, .. }
            | MonitorEvent::AutoActionPlaced { resource_id, .. }
            | MonitorEvent::AutoActionFailed { resource_id, .. }
            | MonitorEvent::ResourceSkipped { resource_id, .. } => Some(resource_id),
            MonitorEvent::CycleCompleted { .. } => None,
        }
    }
}

/// Broadcaster for monitor events.
pub struct MonitorEventBroadcaster {
    sender: broadcast::Sender<MonitorEvent>,
}

impl MonitorEventBroadcaster {
    /// Create a new broadcaster with default capacity (256).
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: MonitorEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for MonitorEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MonitorEventBroadcaster {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}
