//! Notification audit database model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::{datetime_to_ms, ms_to_datetime};
use crate::domain::{ConditionKind, ConditionStatus};

/// Delivery channels recorded in the audit log.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannelKind {
    InApp,
    Sound,
    Push,
    Email,
    /// Marks a dispatch that attempted no channel.
    #[strum(to_string = "none")]
    #[serde(rename = "none")]
    NoChannel,
}

impl NotificationChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InApp => "in_app",
            Self::Sound => "sound",
            Self::Push => "push",
            Self::Email => "email",
            Self::NoChannel => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_app" => Some(Self::InApp),
            "sound" => Some(Self::Sound),
            "push" => Some(Self::Push),
            "email" => Some(Self::Email),
            "none" => Some(Self::NoChannel),
            _ => None,
        }
    }
}

/// One immutable audit row per channel outcome.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct NotificationEventDbModel {
    pub id: String,
    pub resource_id: String,
    pub condition_kind: String,
    pub recipient_id: String,
    pub channel: String,
    /// Status label at dispatch time.
    pub status: String,
    pub success: bool,
    pub error: Option<String>,
    pub created_at: i64,
}

impl NotificationEventDbModel {
    pub fn new(
        resource_id: impl Into<String>,
        kind: ConditionKind,
        recipient_id: impl Into<String>,
        channel: NotificationChannelKind,
        status: ConditionStatus,
        error: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            resource_id: resource_id.into(),
            condition_kind: kind.as_str().to_string(),
            recipient_id: recipient_id.into(),
            channel: channel.as_str().to_string(),
            status: status.label(),
            success: error.is_none(),
            error,
            created_at: datetime_to_ms(created_at),
        }
    }

    pub fn channel(&self) -> Option<NotificationChannelKind> {
        NotificationChannelKind::parse(&self.channel)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        ms_to_datetime(self.created_at)
    }
}
