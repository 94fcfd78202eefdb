//! Threshold configuration database model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::Result;
use crate::database::time::datetime_to_ms;
use crate::domain::{ResourceClass, ThresholdConfig};

/// Owner settings for one resource class.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ThresholdConfigDbModel {
    pub owner_id: String,
    pub resource_class: String,
    /// JSON blob of `ThresholdConfig`; missing fields take defaults.
    pub settings: String,
    pub updated_at: i64,
}

impl ThresholdConfigDbModel {
    pub fn new(
        owner_id: impl Into<String>,
        class: ResourceClass,
        config: &ThresholdConfig,
        updated_at: DateTime<Utc>,
    ) -> Result<Self> {
        Ok(Self {
            owner_id: owner_id.into(),
            resource_class: class.as_str().to_string(),
            settings: serde_json::to_string(config)?,
            updated_at: datetime_to_ms(updated_at),
        })
    }

    /// Parse the stored settings.
    pub fn config(&self) -> Result<ThresholdConfig> {
        Ok(serde_json::from_str(&self.settings)?)
    }
}
