//! Monitored resources.
//!
//! A resource is any externally owned entity the engine watches: an inventory
//! row, a supplier stock row, a shipment, a favorited offer or an incoming
//! order. The engine only ever reads snapshots of these.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::ConditionKind;

/// The class of a monitored resource.
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
pub enum ResourceClass {
    /// Green/roasted coffee held by a buyer (cafe, roaster).
    Inventory,
    /// Stock a supplier offers for sale.
    SupplierStock,
    /// An order that is on its way to the buyer.
    Shipment,
    /// An offer the buyer marked as favorite.
    FavoriteOffer,
    /// An order a supplier has received but not acknowledged yet.
    IncomingOrder,
}

impl ResourceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inventory => "inventory",
            Self::SupplierStock => "supplier_stock",
            Self::Shipment => "shipment",
            Self::FavoriteOffer => "favorite_offer",
            Self::IncomingOrder => "incoming_order",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inventory" => Some(Self::Inventory),
            "supplier_stock" => Some(Self::SupplierStock),
            "shipment" => Some(Self::Shipment),
            "favorite_offer" => Some(Self::FavoriteOffer),
            "incoming_order" => Some(Self::IncomingOrder),
            _ => None,
        }
    }

    /// The condition tracked for resources of this class.
    pub fn condition_kind(&self) -> ConditionKind {
        match self {
            Self::Inventory | Self::SupplierStock => ConditionKind::LowStock,
            Self::Shipment => ConditionKind::ShipmentDelay,
            Self::FavoriteOffer => ConditionKind::OfferExpiry,
            Self::IncomingOrder => ConditionKind::NewOrder,
        }
    }

    /// Only buyer inventory can be replenished automatically.
    pub fn supports_auto_action(&self) -> bool {
        matches!(self, Self::Inventory)
    }

    /// Whether the counterparty is told about the condition as well.
    pub fn notifies_counterparty(&self) -> bool {
        matches!(self, Self::Shipment)
    }

    /// Default polling interval in seconds.
    pub fn default_interval_secs(&self) -> u64 {
        match self {
            Self::Inventory | Self::SupplierStock | Self::IncomingOrder => 5 * 60,
            Self::Shipment | Self::FavoriteOffer => 10 * 60,
        }
    }
}

/// The measurable part of a resource snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceMetric {
    /// Stock level; remaining is `total - consumed`.
    Quantity { total: f64, consumed: f64 },
    /// A point in time after which the resource is no longer valid.
    Deadline { due_at: DateTime<Utc> },
    /// An expected delivery.
    Delivery {
        expected_at: DateTime<Utc>,
        delivered: bool,
    },
    /// A received order waiting for acknowledgement.
    Order {
        placed_at: DateTime<Utc>,
        acknowledged: bool,
    },
}

impl ResourceMetric {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Quantity { .. } => "quantity",
            Self::Deadline { .. } => "deadline",
            Self::Delivery { .. } => "delivery",
            Self::Order { .. } => "order",
        }
    }

    /// Whether this metric shape is meaningful for the given class.
    pub fn fits(&self, class: ResourceClass) -> bool {
        matches!(
            (self, class),
            (
                Self::Quantity { .. },
                ResourceClass::Inventory | ResourceClass::SupplierStock
            ) | (Self::Deadline { .. }, ResourceClass::FavoriteOffer)
                | (Self::Delivery { .. }, ResourceClass::Shipment)
                | (Self::Order { .. }, ResourceClass::IncomingOrder)
        )
    }
}

/// Discrete packaging a resource is sold in (e.g. 60 kg jute bags).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packaging {
    /// Quantity contained in one unit, in the resource's base unit.
    pub unit_size: f64,
    /// Human label for one unit ("bag", "box").
    pub unit_label: String,
}

impl Packaging {
    /// Round a quantity up to whole packaging units.
    pub fn round_up(&self, quantity: f64) -> f64 {
        if self.unit_size <= 0.0 || !self.unit_size.is_finite() {
            return quantity;
        }
        (quantity / self.unit_size).ceil() * self.unit_size
    }

    /// Number of whole units needed for a quantity.
    pub fn units_for(&self, quantity: f64) -> u64 {
        if self.unit_size <= 0.0 || !self.unit_size.is_finite() {
            return 0;
        }
        (quantity / self.unit_size).ceil().max(0.0) as u64
    }
}

/// Per-resource threshold overrides. Unset fields fall back to the owner's config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceThresholds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warn_quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_days: Option<i64>,
}

/// A snapshot of a monitored resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredResource {
    pub id: String,
    pub owner_id: String,
    pub class: ResourceClass,
    /// Display label used in notifications.
    pub name: String,
    /// The other party of the relation: supplier for inventory and shipments,
    /// buyer for incoming orders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty_id: Option<String>,
    pub metric: ResourceMetric,
    /// Unit of measure for quantities ("kg").
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packaging: Option<Packaging>,
    #[serde(default)]
    pub thresholds: ResourceThresholds,
    /// Reference of the catalog item used when ordering more.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_ref: Option<String>,
}

fn default_unit() -> String {
    "kg".to_string()
}

impl MonitoredResource {
    /// Create a resource with no optional attributes set.
    pub fn new(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        class: ResourceClass,
        name: impl Into<String>,
        metric: ResourceMetric,
    ) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            class,
            name: name.into(),
            counterparty_id: None,
            metric,
            unit: default_unit(),
            unit_price: None,
            packaging: None,
            thresholds: ResourceThresholds::default(),
            product_ref: None,
        }
    }

    pub fn with_counterparty(mut self, counterparty_id: impl Into<String>) -> Self {
        self.counterparty_id = Some(counterparty_id.into());
        self
    }

    pub fn with_unit_price(mut self, unit_price: f64) -> Self {
        self.unit_price = Some(unit_price);
        self
    }

    pub fn with_packaging(mut self, packaging: Packaging) -> Self {
        self.packaging = Some(packaging);
        self
    }

    pub fn with_thresholds(mut self, thresholds: ResourceThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Remaining quantity for quantity-based resources.
    pub fn remaining(&self) -> Option<f64> {
        match self.metric {
            ResourceMetric::Quantity { total, consumed } => Some(total - consumed),
            _ => None,
        }
    }

    pub fn condition_kind(&self) -> ConditionKind {
        self.class.condition_kind()
    }
}
