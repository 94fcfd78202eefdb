//! Database models for supply-watch.
//!
//! These models map directly to the database schema. Enum-valued columns are
//! stored as their `as_str()` form and exposed through typed accessors.

pub mod alert_record;
pub mod auto_action;
pub mod notification_event;
pub mod threshold_config;

pub use alert_record::*;
pub use auto_action::*;
pub use notification_event::*;
pub use threshold_config::*;
