//! Configuration.
//!
//! Process settings come from the environment; owner thresholds come from the
//! database through [`ThresholdConfigService`], with an in-memory TTL cache and
//! update events.

pub mod app;
pub mod cache;
pub mod events;
pub mod service;

pub use app::AppConfig;
pub use cache::ThresholdCache;
pub use events::{ConfigEventBroadcaster, ConfigUpdateEvent};
pub use service::ThresholdConfigService;
