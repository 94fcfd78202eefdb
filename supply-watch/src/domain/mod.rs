//! Domain types shared by the monitor and notification layers.

pub mod resource;
pub mod status;
pub mod threshold;

pub use resource::{MonitoredResource, Packaging, ResourceClass, ResourceMetric, ResourceThresholds};
pub use status::{ConditionKind, ConditionStatus, Severity};
pub use threshold::{ChannelPreferences, ThresholdConfig, Tone};
