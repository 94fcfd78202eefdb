//! Threshold configuration update events.

use tokio::sync::broadcast;

use crate::domain::ResourceClass;

/// Events broadcast when an owner's thresholds change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigUpdateEvent {
    /// Settings for one class were created or replaced.
    ThresholdsUpdated {
        owner_id: String,
        class: ResourceClass,
    },
    /// Settings for one class were removed; defaults apply again.
    ThresholdsReset {
        owner_id: String,
        class: ResourceClass,
    },
}

impl ConfigUpdateEvent {
    pub fn owner_id(&self) -> &str {
        match self {
            Self::ThresholdsUpdated { owner_id, .. } | Self::ThresholdsReset { owner_id, .. } => {
                owner_id
            }
        }
    }

    pub fn class(&self) -> ResourceClass {
        match self {
            Self::ThresholdsUpdated { class, .. } | Self::ThresholdsReset { class, .. } => *class,
        }
    }
}

/// Broadcaster for configuration update events.
#[derive(Clone)]
pub struct ConfigEventBroadcaster {
    sender: broadcast::Sender<ConfigUpdateEvent>,
}

impl ConfigEventBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfigUpdateEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: ConfigUpdateEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("No subscribers for config update event");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ConfigEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
