//! Auto-action record database model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::ms_to_datetime;

/// Durable trace of the last automatic action taken for a resource.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct AutoActionRecordDbModel {
    pub resource_id: String,
    /// Unix epoch milliseconds of the current claim, if any.
    pub last_triggered_at: Option<i64>,
    /// Value of `last_triggered_at` before the current claim.
    pub previous_triggered_at: Option<i64>,
    pub last_order_id: Option<String>,
    /// Value of `last_order_id` before the current claim.
    pub previous_order_id: Option<String>,
    pub updated_at: i64,
}

impl AutoActionRecordDbModel {
    pub fn last_triggered_at(&self) -> Option<DateTime<Utc>> {
        self.last_triggered_at.map(ms_to_datetime)
    }
}
