//! Condition kinds, derived statuses and their severity ordering.

use serde::{Deserialize, Serialize};

/// Category of breach tracked for a resource.
///
/// Alert records are keyed by `(resource_id, ConditionKind)`.
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConditionKind {
    LowStock,
    ShipmentDelay,
    OfferExpiry,
    NewOrder,
    /// An automatic reorder was refused by the ordering service.
    AutoReorderFailed,
}

impl ConditionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LowStock => "low_stock",
            Self::ShipmentDelay => "shipment_delay",
            Self::OfferExpiry => "offer_expiry",
            Self::NewOrder => "new_order",
            Self::AutoReorderFailed => "auto_reorder_failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low_stock" => Some(Self::LowStock),
            "shipment_delay" => Some(Self::ShipmentDelay),
            "offer_expiry" => Some(Self::OfferExpiry),
            "new_order" => Some(Self::NewOrder),
            "auto_reorder_failed" => Some(Self::AutoReorderFailed),
            _ => None,
        }
    }
}

/// Ordered severity of a status. Only increases re-notify.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Baseline = 0,
    Warning = 1,
    Urgent = 2,
    Critical = 3,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Warning => "warning",
            Self::Urgent => "urgent",
            Self::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "baseline" => Some(Self::Baseline),
            "warning" => Some(Self::Warning),
            "urgent" => Some(Self::Urgent),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    pub fn rank(&self) -> i64 {
        *self as i64
    }

    pub fn from_rank(rank: i64) -> Self {
        match rank {
            i64::MIN..=0 => Self::Baseline,
            1 => Self::Warning,
            2 => Self::Urgent,
            _ => Self::Critical,
        }
    }
}

/// Status derived for a resource on one evaluation. Never persisted on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "status", content = "days", rename_all = "snake_case")]
pub enum ConditionStatus {
    Healthy,
    Warning,
    Critical,
    None,
    ExpiringSoon(i64),
    ExpiringToday,
    Expired,
    Delayed(i64),
    NewOrder,
    ActionFailed,
}

impl ConditionStatus {
    pub fn severity(&self) -> Severity {
        match self {
            Self::Healthy | Self::None => Severity::Baseline,
            Self::Warning | Self::ExpiringSoon(_) | Self::NewOrder => Severity::Warning,
            Self::ExpiringToday | Self::Delayed(_) => Severity::Urgent,
            Self::Critical | Self::Expired | Self::ActionFailed => Severity::Critical,
        }
    }

    pub fn is_baseline(&self) -> bool {
        self.severity() == Severity::Baseline
    }

    /// Stable label stored in alert records and audit rows.
    pub fn label(&self) -> String {
        match self {
            Self::Healthy => "healthy".to_string(),
            Self::Warning => "warning".to_string(),
            Self::Critical => "critical".to_string(),
            Self::None => "none".to_string(),
            Self::ExpiringSoon(days) => format!("expiring_soon:{days}"),
            Self::ExpiringToday => "expiring_today".to_string(),
            Self::Expired => "expired".to_string(),
            Self::Delayed(days) => format!("delayed:{days}"),
            Self::NewOrder => "new_order".to_string(),
            Self::ActionFailed => "action_failed".to_string(),
        }
    }

    /// Inverse of [`ConditionStatus::label`].
    pub fn parse_label(s: &str) -> Option<Self> {
        if let Some((name, days)) = s.split_once(':') {
            let days: i64 = days.parse().ok()?;
            return match name {
                "expiring_soon" => Some(Self::ExpiringSoon(days)),
                "delayed" => Some(Self::Delayed(days)),
                _ => None,
            };
        }
        match s {
            "healthy" => Some(Self::Healthy),
            "warning" => Some(Self::Warning),
            "critical" => Some(Self::Critical),
            "none" => Some(Self::None),
            "expiring_today" => Some(Self::ExpiringToday),
            "expired" => Some(Self::Expired),
            "new_order" => Some(Self::NewOrder),
            "action_failed" => Some(Self::ActionFailed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}
