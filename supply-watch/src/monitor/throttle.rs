//! Auto-action throttling.
//!
//! An action may fire when it is enabled, the resource did not already fail
//! during the current cycle, and the cooldown since the last action has
//! elapsed. The durable check-and-set lives in the repository claim; this
//! type answers the read-only question and keeps the per-cycle failure
//! markers. A marker is dropped once its resource is checked in a later
//! cycle, or when it outlives [`FAILURE_MARK_TTL`].

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::Result;
use crate::database::repositories::AutoActionRepository;
use crate::domain::ThresholdConfig;

/// Longer than any polling interval, so a marker never expires mid-cycle.
pub const FAILURE_MARK_TTL: Duration = Duration::hours(1);

#[derive(Debug, Clone, Copy)]
struct FailureMark {
    cycle: u64,
    marked_at: DateTime<Utc>,
}

pub struct ActionThrottler {
    repo: Arc<dyn AutoActionRepository>,
    /// resource id -> the cycle in which its last action attempt failed.
    failed_in_cycle: DashMap<String, FailureMark>,
}

impl ActionThrottler {
    pub fn new(repo: Arc<dyn AutoActionRepository>) -> Self {
        Self {
            repo,
            failed_in_cycle: DashMap::new(),
        }
    }

    pub async fn can_act(
        &self,
        resource_id: &str,
        config: &ThresholdConfig,
        now: DateTime<Utc>,
        cycle: u64,
    ) -> Result<bool> {
        if !config.auto_action_enabled {
            return Ok(false);
        }
        if self.failed_in(resource_id, cycle) {
            return Ok(false);
        }
        self.failed_in_cycle
            .remove_if(resource_id, |_, mark| mark.cycle != cycle);

        let last = self
            .repo
            .get(resource_id)
            .await?
            .and_then(|record| record.last_triggered_at());

        Ok(match last {
            None => true,
            Some(last) => now - last >= config.cooldown(),
        })
    }

    /// Remember a failed attempt so the same cycle does not retry it.
    pub fn mark_failed(&self, resource_id: &str, cycle: u64, now: DateTime<Utc>) {
        self.failed_in_cycle
            .retain(|_, mark| now - mark.marked_at < FAILURE_MARK_TTL);
        self.failed_in_cycle.insert(
            resource_id.to_string(),
            FailureMark {
                cycle,
                marked_at: now,
            },
        );
    }

    pub fn clear_failure(&self, resource_id: &str) {
        self.failed_in_cycle.remove(resource_id);
    }

    pub fn failed_in(&self, resource_id: &str, cycle: u64) -> bool {
        self.failed_in_cycle
            .get(resource_id)
            .is_some_and(|mark| mark.cycle == cycle)
    }

    /// Number of live failure markers.
    pub fn failure_count(&self) -> usize {
        self.failed_in_cycle.len()
    }
}
