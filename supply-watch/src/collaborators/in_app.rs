//! In-app toasts over a broadcast channel, with session presence.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;

use super::{InAppNotifier, Toast};

/// A toast addressed to one owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InAppMessage {
    pub owner_id: String,
    pub toast: Toast,
}

/// Broadcast-based in-app delivery.
///
/// UI sessions call [`BroadcastInAppNotifier::connect`] and keep the returned
/// guard for as long as they are open. An owner is active while at least one
/// guard is alive.
#[derive(Clone)]
pub struct BroadcastInAppNotifier {
    sender: broadcast::Sender<InAppMessage>,
    sessions: Arc<DashMap<String, usize>>,
}

impl BroadcastInAppNotifier {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// Open a session for an owner.
    pub fn connect(&self, owner_id: &str) -> (PresenceGuard, broadcast::Receiver<InAppMessage>) {
        *self.sessions.entry(owner_id.to_string()).or_insert(0) += 1;
        let guard = PresenceGuard {
            owner_id: owner_id.to_string(),
            sessions: self.sessions.clone(),
        };
        (guard, self.sender.subscribe())
    }

    pub fn active_sessions(&self, owner_id: &str) -> usize {
        self.sessions.get(owner_id).map(|c| *c).unwrap_or(0)
    }
}

impl Default for BroadcastInAppNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl InAppNotifier for BroadcastInAppNotifier {
    fn is_active(&self, owner_id: &str) -> bool {
        self.active_sessions(owner_id) > 0
    }

    fn show(&self, owner_id: &str, toast: Toast) -> bool {
        if !self.is_active(owner_id) {
            return false;
        }
        self.sender
            .send(InAppMessage {
                owner_id: owner_id.to_string(),
                toast,
            })
            .is_ok()
    }
}

/// Keeps an owner marked active until dropped.
pub struct PresenceGuard {
    owner_id: String,
    sessions: Arc<DashMap<String, usize>>,
}

impl Drop for PresenceGuard {
    fn drop(&mut self) {
        self.sessions
            .remove_if_mut(&self.owner_id, |_, count| {
                *count = count.saturating_sub(1);
                *count == 0
            });
    }
}
