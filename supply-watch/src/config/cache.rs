//! Threshold configuration cache.
//!
//! Thread-safe TTL cache keyed by `(owner_id, resource_class)`.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::domain::{ResourceClass, ThresholdConfig};

/// Default TTL for cached configurations (5 minutes).
const DEFAULT_TTL: Duration = Duration::from_secs(300);

type CacheKey = (String, ResourceClass);

#[derive(Clone)]
struct CacheEntry {
    config: Arc<ThresholdConfig>,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(config: Arc<ThresholdConfig>, ttl: Duration) -> Self {
        Self {
            config,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Cache of resolved threshold configurations.
#[derive(Clone)]
pub struct ThresholdCache {
    entries: Arc<DashMap<CacheKey, CacheEntry>>,
    ttl: Duration,
}

impl ThresholdCache {
    /// Create a new cache with default TTL.
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    /// Create a new cache with specified TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Returns None if not cached or expired.
    pub fn get(&self, owner_id: &str, class: ResourceClass) -> Option<Arc<ThresholdConfig>> {
        let key = (owner_id.to_string(), class);
        let entry = self.entries.get(&key)?;

        if entry.is_expired() {
            drop(entry); // release the shard lock before removing
            self.entries.remove(&key);
            return None;
        }

        Some(entry.config.clone())
    }

    pub fn insert(&self, owner_id: &str, class: ResourceClass, config: Arc<ThresholdConfig>) {
        self.entries
            .insert((owner_id.to_string(), class), CacheEntry::new(config, self.ttl));
    }

    pub fn invalidate(&self, owner_id: &str, class: ResourceClass) {
        self.entries.remove(&(owner_id.to_string(), class));
    }

    /// Invalidate every class of one owner.
    pub fn invalidate_owner(&self, owner_id: &str) {
        self.entries.retain(|(owner, _), _| owner != owner_id);
    }

    pub fn invalidate_all(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove all expired entries from the cache.
    pub fn cleanup_expired(&self) -> usize {
        let before = self.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        before - self.len()
    }
}

impl Default for ThresholdCache {
    fn default() -> Self {
        Self::new()
    }
}
