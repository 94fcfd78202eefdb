//! Per-owner, per-class threshold configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::resource::{MonitoredResource, ResourceClass};
use crate::{Error, Result};

/// Alert tones available to the sound channel.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Tone {
    #[default]
    Chime,
    Bell,
    Beep,
    Alarm,
}

/// Where and how an owner wants to be told about a condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelPreferences {
    pub in_app: bool,
    pub sound: bool,
    pub tone: Tone,
    /// Playback volume in `0.0..=1.0`.
    pub volume: f32,
    pub push: bool,
    pub email: bool,
    pub email_address: Option<String>,
}

impl Default for ChannelPreferences {
    fn default() -> Self {
        Self {
            in_app: true,
            sound: true,
            tone: Tone::default(),
            volume: 0.7,
            push: false,
            email: false,
            email_address: None,
        }
    }
}

impl ChannelPreferences {
    /// The address to email, if email is enabled and one is configured.
    pub fn email_target(&self) -> Option<&str> {
        if !self.email {
            return None;
        }
        self.email_address
            .as_deref()
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
    }
}

/// Threshold configuration for one owner and resource class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Monitoring on/off for this class.
    pub enabled: bool,
    /// Remaining quantity at or below which stock is critical.
    pub min_quantity: f64,
    /// Remaining quantity at or below which stock is low.
    pub warn_quantity: f64,
    /// Days of lead (offers) or lateness (shipments) that trigger an alert.
    pub lead_days: i64,
    /// Automatic replenishment on/off.
    pub auto_action_enabled: bool,
    /// Quantity ordered by an automatic replenishment.
    pub auto_action_quantity: f64,
    /// Minimum time between two automatic actions for one resource.
    pub cooldown_secs: i64,
    pub channels: ChannelPreferences,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_quantity: 5.0,
            warn_quantity: 20.0,
            lead_days: 3,
            auto_action_enabled: false,
            auto_action_quantity: 0.0,
            cooldown_secs: 24 * 60 * 60,
            channels: ChannelPreferences::default(),
        }
    }
}

impl ThresholdConfig {
    /// Defaults used when an owner has not configured a class.
    pub fn defaults_for(class: ResourceClass) -> Self {
        let lead_days = match class {
            ResourceClass::Shipment => 1,
            ResourceClass::FavoriteOffer => 3,
            _ => 0,
        };
        Self {
            lead_days,
            ..Self::default()
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::seconds(self.cooldown_secs)
    }

    /// Apply per-resource overrides on top of this config.
    pub fn effective_for(&self, resource: &MonitoredResource) -> Self {
        let overrides = &resource.thresholds;
        let mut effective = self.clone();
        if let Some(min) = overrides.min_quantity {
            effective.min_quantity = min;
        }
        if let Some(warn) = overrides.warn_quantity {
            effective.warn_quantity = warn;
        }
        if let Some(lead) = overrides.lead_days {
            effective.lead_days = lead;
        }
        effective
    }

    pub fn validate(&self) -> Result<()> {
        if !self.min_quantity.is_finite() || self.min_quantity < 0.0 {
            return Err(Error::validation("min_quantity must be a non-negative number"));
        }
        if !self.warn_quantity.is_finite() || self.warn_quantity < 0.0 {
            return Err(Error::validation("warn_quantity must be a non-negative number"));
        }
        if self.min_quantity > self.warn_quantity {
            return Err(Error::validation(format!(
                "min_quantity ({}) must not exceed warn_quantity ({})",
                self.min_quantity, self.warn_quantity
            )));
        }
        if self.lead_days < 0 {
            return Err(Error::validation("lead_days must not be negative"));
        }
        if self.cooldown_secs <= 0 {
            return Err(Error::validation("cooldown must be positive"));
        }
        if self.auto_action_enabled
            && (!self.auto_action_quantity.is_finite() || self.auto_action_quantity <= 0.0)
        {
            return Err(Error::validation(
                "auto_action_quantity must be positive when auto-action is enabled",
            ));
        }
        if !(0.0..=1.0).contains(&self.channels.volume) {
            return Err(Error::validation("volume must be between 0.0 and 1.0"));
        }
        Ok(())
    }
}
