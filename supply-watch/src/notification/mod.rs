//! Notification delivery.
//!
//! Renders condition messages and fans them out to in-app, sound, push and
//! email channels, writing one audit row per attempted channel.

pub mod dispatcher;
pub mod templates;

pub use dispatcher::{
    ChannelOutcome, DispatchReport, DispatchTarget, NotificationDispatcher, should_mark_notified,
};
pub use templates::{Audience, NotificationPayload, TemplateContext};
