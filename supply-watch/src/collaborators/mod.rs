//! External collaborators.
//!
//! The engine talks to the outside world only through these traits:
//! - resource snapshots and their change feed
//! - owner threshold configuration
//! - the ordering service used by automatic replenishment
//! - push, email, sound and in-app delivery

pub mod http;
pub mod in_app;
pub mod memory;
pub mod sound;

pub use http::{HttpEmailSender, HttpOrderingService, HttpPushSender, HttpResourceProvider};
pub use in_app::{BroadcastInAppNotifier, PresenceGuard};
pub use memory::{InMemoryOrderingService, InMemoryResourceStore};
pub use sound::TracingSoundPlayer;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::domain::{MonitoredResource, ResourceClass, Severity, ThresholdConfig, Tone};

/// Reads resource snapshots. Pure read.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    async fn fetch_resources(
        &self,
        owner_id: &str,
        class: ResourceClass,
    ) -> Result<Vec<MonitoredResource>>;

    /// Fetch one resource; `None` when it no longer exists.
    async fn fetch_resource(&self, resource_id: &str) -> Result<Option<MonitoredResource>>;
}

/// Reads owner threshold configuration. `None` means defaults apply.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    async fn fetch_config(
        &self,
        owner_id: &str,
        class: ResourceClass,
    ) -> Result<Option<ThresholdConfig>>;
}

/// Kind of change reported by a [`ChangeFeed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Inserted,
    Updated,
    Deleted,
}

/// A change to a monitored resource. Delivered at least once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub resource_id: String,
    pub owner_id: String,
    pub class: ResourceClass,
    pub kind: ChangeKind,
}

/// Push-based notification of resource changes.
pub trait ChangeFeed: Send + Sync {
    /// Subscribe to changes of one class, optionally for a single owner.
    fn subscribe(
        &self,
        class: ResourceClass,
        owner_filter: Option<&str>,
    ) -> BoxStream<'static, ChangeEvent>;
}

/// A replenishment order placed on the owner's behalf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub buyer_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier_id: Option<String>,
    pub resource_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_ref: Option<String>,
    pub quantity: f64,
    pub unit: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
    pub note: String,
    /// Stable per claim so a retried submission cannot create a second order.
    pub idempotency_key: String,
}

/// Places orders.
#[async_trait]
pub trait OrderingService: Send + Sync {
    /// Returns the id of the created order. Business refusals surface as
    /// `Error::ActionRejected`.
    async fn create_order(&self, request: &OrderRequest) -> Result<String>;
}

/// A push notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
    pub owner_id: String,
    pub title: String,
    pub body: String,
    /// Replaces an earlier push with the same tag on the device.
    pub tag: String,
    pub deep_link: String,
}

#[async_trait]
pub trait PushSender: Send + Sync {
    async fn has_permission(&self, owner_id: &str) -> Result<bool>;
    async fn send_push(&self, message: &PushMessage) -> Result<()>;
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, html: &str) -> Result<()>;
}

/// Best-effort audible alert. Must return immediately.
pub trait SoundPlayer: Send + Sync {
    fn play(&self, tone: Tone, volume: f32);
}

/// A transient in-app message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toast {
    pub title: String,
    pub body: String,
    pub severity: Severity,
    pub deep_link: String,
}

/// In-app delivery to owners with an active session.
pub trait InAppNotifier: Send + Sync {
    fn is_active(&self, owner_id: &str) -> bool;
    /// Fire-and-forget. Returns whether any session received the toast.
    fn show(&self, owner_id: &str, toast: Toast) -> bool;
}
