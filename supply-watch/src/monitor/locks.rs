//! Per-resource evaluation locks.
//!
//! Evaluations of the same resource are serialized so two triggers (a poll
//! and a change event, say) never interleave their read-classify-act
//! sequences. Different resources proceed in parallel.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A resource's mutex plus the number of holders and waiters.
#[derive(Default)]
struct LockSlot {
    mutex: Arc<Mutex<()>>,
    users: AtomicUsize,
}

#[derive(Default)]
pub struct ResourceLocks {
    locks: DashMap<String, Arc<LockSlot>>,
}

/// Held for the duration of one evaluation. Also created while waiting, so a
/// caller that gives up before the lock is granted still releases its slot.
pub struct ResourceLockGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    resource_id: String,
    owner: &'a ResourceLocks,
}

impl ResourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, resource_id: &str) -> ResourceLockGuard<'_> {
        let mutex = {
            let slot = self.locks.entry(resource_id.to_string()).or_default();
            slot.users.fetch_add(1, Ordering::AcqRel);
            slot.mutex.clone()
        };

        let mut guard = ResourceLockGuard {
            guard: None,
            resource_id: resource_id.to_string(),
            owner: self,
        };
        guard.guard = Some(mutex.lock_owned().await);
        guard
    }

    /// Number of resources with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for ResourceLockGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // The count only rises under the entry lock, so a slot seen at zero
        // here has no other user.
        self.owner.locks.remove_if(&self.resource_id, |_, slot| {
            slot.users.fetch_sub(1, Ordering::AcqRel) == 1
        });
    }
}
