//! Repository layer for database access.
//!
//! Each repository is a trait plus a `Sqlx*` implementation so the monitor
//! can be driven by in-memory stores in tests.

pub mod alert_record;
pub mod auto_action;
pub mod notification_event;
pub mod threshold_config;

pub use alert_record::*;
pub use auto_action::*;
pub use notification_event::*;
pub use threshold_config::*;
