//! Resource monitor.
//!
//! The monitor is responsible for:
//! - Classifying resource snapshots against owner thresholds
//! - Deduplicating notifications per resource and condition
//! - Throttled automatic replenishment orders
//! - Timer and change-feed triggers with per-resource serialization
//! - Emitting events for observers

mod alert_state;
mod classifier;
mod events;
mod executor;
mod locks;
mod service;
mod throttle;

pub use alert_state::{AlertStateStore, InMemoryAlertRecordRepository};
pub use classifier::classify;
pub use events::{MonitorEvent, MonitorEventBroadcaster};
pub use executor::{ActionExecutor, ActionOutcome};
pub use locks::{ResourceLockGuard, ResourceLocks};
pub use service::{CycleSummary, Evaluation, MonitorDeps, MonitorService, MonitorServiceConfig};
pub use throttle::ActionThrottler;
