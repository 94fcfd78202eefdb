//! Status classification.
//!
//! Pure mapping from a resource snapshot and its thresholds to a
//! [`ConditionStatus`]. Boundary values always fall into the more severe
//! bucket.

use chrono::{DateTime, Utc};

use crate::domain::{ConditionStatus, MonitoredResource, ResourceMetric, ThresholdConfig};
use crate::{Error, Result};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Whole days from `from` to `to`, rounded towards negative infinity.
fn floor_days(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_milliseconds().div_euclid(DAY_MS)
}

/// Classify a resource at `now`.
///
/// Per-resource threshold overrides take precedence over `config`.
pub fn classify(
    resource: &MonitoredResource,
    config: &ThresholdConfig,
    now: DateTime<Utc>,
) -> Result<ConditionStatus> {
    if !resource.metric.fits(resource.class) {
        return Err(Error::invalid_state(
            &resource.id,
            format!(
                "{} metric does not apply to {} resources",
                resource.metric.kind_name(),
                resource.class
            ),
        ));
    }

    let overrides = &resource.thresholds;
    let lead_days = overrides.lead_days.unwrap_or(config.lead_days);

    match resource.metric {
        ResourceMetric::Quantity { total, consumed } => {
            let min = overrides.min_quantity.unwrap_or(config.min_quantity);
            let warn = overrides.warn_quantity.unwrap_or(config.warn_quantity);
            classify_quantity(&resource.id, total, consumed, min, warn)
        }
        ResourceMetric::Deadline { due_at } => Ok(classify_deadline(due_at, lead_days, now)),
        ResourceMetric::Delivery {
            expected_at,
            delivered,
        } => {
            if delivered {
                return Ok(ConditionStatus::None);
            }
            let late = floor_days(expected_at, now);
            if late >= lead_days {
                Ok(ConditionStatus::Delayed(late))
            } else {
                Ok(ConditionStatus::None)
            }
        }
        ResourceMetric::Order { acknowledged, .. } => {
            if acknowledged {
                Ok(ConditionStatus::None)
            } else {
                Ok(ConditionStatus::NewOrder)
            }
        }
    }
}

fn classify_quantity(
    resource_id: &str,
    total: f64,
    consumed: f64,
    min: f64,
    warn: f64,
) -> Result<ConditionStatus> {
    if !total.is_finite() || !consumed.is_finite() {
        return Err(Error::invalid_state(resource_id, "quantity is not a finite number"));
    }
    if total < 0.0 || consumed < 0.0 {
        return Err(Error::invalid_state(
            resource_id,
            format!("negative quantity (total {total}, consumed {consumed})"),
        ));
    }
    if consumed > total {
        return Err(Error::invalid_state(
            resource_id,
            format!("consumed {consumed} exceeds total {total}"),
        ));
    }

    let remaining = total - consumed;
    if remaining <= min {
        Ok(ConditionStatus::Critical)
    } else if remaining <= warn {
        Ok(ConditionStatus::Warning)
    } else {
        Ok(ConditionStatus::Healthy)
    }
}

fn classify_deadline(due_at: DateTime<Utc>, lead_days: i64, now: DateTime<Utc>) -> ConditionStatus {
    if due_at <= now {
        return ConditionStatus::Expired;
    }
    match floor_days(now, due_at) {
        0 => ConditionStatus::ExpiringToday,
        days if days <= lead_days => ConditionStatus::ExpiringSoon(days),
        _ => ConditionStatus::None,
    }
}
