//! Alert record database model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::{datetime_to_ms, ms_to_datetime};
use crate::domain::{ConditionKind, ConditionStatus, Severity};

/// The open alert for one `(resource_id, condition_kind)` pair.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct AlertRecordDbModel {
    pub resource_id: String,
    pub condition_kind: String,
    /// Status label, see `ConditionStatus::label`.
    pub last_status: String,
    /// Severity rank of `last_status`.
    pub severity: i64,
    /// Unix epoch milliseconds.
    pub notified_at: i64,
}

impl AlertRecordDbModel {
    pub fn new(
        resource_id: impl Into<String>,
        kind: ConditionKind,
        status: ConditionStatus,
        notified_at: DateTime<Utc>,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            condition_kind: kind.as_str().to_string(),
            last_status: status.label(),
            severity: status.severity().rank(),
            notified_at: datetime_to_ms(notified_at),
        }
    }

    pub fn kind(&self) -> Option<ConditionKind> {
        ConditionKind::parse(&self.condition_kind)
    }

    pub fn status(&self) -> Option<ConditionStatus> {
        ConditionStatus::parse_label(&self.last_status)
    }

    pub fn severity(&self) -> Severity {
        Severity::from_rank(self.severity)
    }

    pub fn notified_at(&self) -> DateTime<Utc> {
        ms_to_datetime(self.notified_at)
    }
}
