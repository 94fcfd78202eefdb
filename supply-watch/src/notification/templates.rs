//! Notification message templates.
//!
//! Every message says what happened and what the recipient can do next.

use serde::{Deserialize, Serialize};

use crate::domain::{
    ConditionKind, ConditionStatus, MonitoredResource, ResourceClass, ResourceMetric, Severity,
};
use crate::monitor::ActionOutcome;
use crate::utils::http_client::join_url;

/// Who a message is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    /// The resource owner.
    Owner,
    /// The other party of the relation (the supplier of a shipment).
    Counterparty,
}

/// Inputs for rendering one notification.
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    pub resource: &'a MonitoredResource,
    pub kind: ConditionKind,
    pub status: ConditionStatus,
    pub audience: Audience,
    /// Set when an automatic order was placed in the same evaluation.
    pub action: Option<&'a ActionOutcome>,
    /// Reason given by the ordering service when an automatic order failed.
    pub failure_reason: Option<&'a str>,
    pub base_url: &'a str,
}

/// A rendered notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub email_subject: String,
    pub email_html: String,
    pub deep_link: String,
    pub severity: Severity,
}

impl NotificationPayload {
    pub fn render(ctx: &TemplateContext<'_>) -> Self {
        let (title, mut body) = headline(ctx);
        if let Some(note) = ctx.action.and_then(action_note) {
            body.push(' ');
            body.push_str(&note);
        }

        let deep_link = deep_link(ctx.base_url, ctx.resource);
        let severity = ctx.status.severity();
        let email_html = build_email_html(&title, &body, &deep_link, severity);

        Self {
            email_subject: format!("[supply-watch] {}", title),
            title,
            body,
            email_html,
            deep_link,
            severity,
        }
    }
}

/// In-app path of a resource.
pub fn resource_path(resource: &MonitoredResource) -> String {
    match resource.class {
        ResourceClass::Inventory => format!("inventory/{}", resource.id),
        ResourceClass::SupplierStock => format!("stock/{}", resource.id),
        ResourceClass::Shipment => format!("orders/{}", resource.id),
        ResourceClass::FavoriteOffer => format!("offers/{}", resource.id),
        ResourceClass::IncomingOrder => format!("orders/incoming/{}", resource.id),
    }
}

fn deep_link(base_url: &str, resource: &MonitoredResource) -> String {
    join_url(base_url, &resource_path(resource))
}

fn fmt_quantity(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.1}", value)
    }
}

fn days(n: i64) -> String {
    if n == 1 {
        "1 day".to_string()
    } else {
        format!("{} days", n)
    }
}

fn headline(ctx: &TemplateContext<'_>) -> (String, String) {
    let r = ctx.resource;
    let remaining = r
        .remaining()
        .map(|q| format!("{} {}", fmt_quantity(q), r.unit))
        .unwrap_or_default();

    match (ctx.kind, ctx.status) {
        (ConditionKind::AutoReorderFailed, _) => (
            format!("Automatic reorder failed: {}", r.name),
            format!(
                "We could not place the automatic reorder for {}{}. Stock is still low ({} left). \
                 We will retry on the next check; you can also order manually now.",
                r.name,
                ctx.failure_reason
                    .map(|reason| format!(" ({})", reason))
                    .unwrap_or_default(),
                remaining
            ),
        ),
        (ConditionKind::LowStock, ConditionStatus::Critical) => (
            format!("Critical stock: {}", r.name),
            format!(
                "Only {} of {} left, at or below your minimum level. Reorder now to avoid running out.",
                remaining, r.name
            ),
        ),
        (ConditionKind::LowStock, _) => (
            format!("Low stock: {}", r.name),
            format!(
                "{} is running low with {} left. Plan a reorder soon.",
                r.name, remaining
            ),
        ),
        (ConditionKind::OfferExpiry, ConditionStatus::Expired) => (
            format!("Offer expired: {}", r.name),
            format!(
                "Your favorite offer {} has expired. Browse current offers from this supplier.",
                r.name
            ),
        ),
        (ConditionKind::OfferExpiry, ConditionStatus::ExpiringToday) => (
            format!("Offer expires today: {}", r.name),
            format!(
                "Your favorite offer {} expires today. Order now to secure it.",
                r.name
            ),
        ),
        (ConditionKind::OfferExpiry, status) => {
            let left = match status {
                ConditionStatus::ExpiringSoon(n) => days(n),
                _ => "a few days".to_string(),
            };
            (
                format!("Offer expiring soon: {}", r.name),
                format!(
                    "Your favorite offer {} expires in {}. Order before it is gone.",
                    r.name, left
                ),
            )
        }
        (ConditionKind::ShipmentDelay, status) => {
            let late = match status {
                ConditionStatus::Delayed(n) => days(n),
                _ => "some time".to_string(),
            };
            match ctx.audience {
                Audience::Owner => (
                    format!("Shipment delayed: {}", r.name),
                    format!(
                        "{} is {} past its expected delivery. Contact the supplier for an update.",
                        r.name, late
                    ),
                ),
                Audience::Counterparty => (
                    format!("Late delivery: {}", r.name),
                    format!(
                        "{} is {} past the delivery date promised to your buyer. Update the tracking or \
                         contact the buyer.",
                        r.name, late
                    ),
                ),
            }
        }
        (ConditionKind::NewOrder, _) => {
            let placed = match &r.metric {
                ResourceMetric::Order { placed_at, .. } => {
                    format!(" placed {}", placed_at.format("%Y-%m-%d %H:%M UTC"))
                }
                _ => String::new(),
            };
            (
                format!("New order: {}", r.name),
                format!(
                    "You received a new order {}{}. Review and acknowledge it.",
                    r.name, placed
                ),
            )
        }
    }
}

fn action_note(outcome: &ActionOutcome) -> Option<String> {
    match outcome {
        ActionOutcome::Placed {
            order_id,
            quantity,
            unit,
            total_cost,
        } => {
            let cost = total_cost
                .map(|c| format!(" for {:.2}", c))
                .unwrap_or_default();
            Some(format!(
                "An automatic reorder of {} {}{} was placed (order {}).",
                fmt_quantity(*quantity),
                unit,
                cost,
                order_id
            ))
        }
        ActionOutcome::AlreadyActed => None,
    }
}

/// Minimal escaping for text interpolated into HTML.
fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn build_email_html(title: &str, body: &str, link: &str, severity: Severity) -> String {
    let color = match severity {
        Severity::Baseline => "#808080",
        Severity::Warning => "#f39c12",
        Severity::Urgent => "#e67e22",
        Severity::Critical => "#e74c3c",
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 20px; }}
        .header {{ background-color: {}; color: white; padding: 15px; border-radius: 5px; }}
        .content {{ padding: 20px; background-color: #f9f9f9; border-radius: 5px; margin-top: 10px; }}
        .footer {{ color: #666; font-size: 12px; margin-top: 20px; }}
    </style>
</head>
<body>
    <div class="header">
        <h2>{}</h2>
    </div>
    <div class="content">
        <p>{}</p>
        <p><a href="{}">Open in supply-watch</a></p>
    </div>
    <div class="footer">
        <p>Severity: {}</p>
    </div>
</body>
</html>"#,
        color,
        escape_html(title),
        escape_html(body),
        escape_html(link),
        severity.as_str()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn stock() -> MonitoredResource {
        MonitoredResource::new(
            "inv-1",
            "cafe-1",
            ResourceClass::Inventory,
            "Guji <natural>",
            ResourceMetric::Quantity {
                total: 100.0,
                consumed: 96.0,
            },
        )
    }

    fn ctx<'a>(
        resource: &'a MonitoredResource,
        kind: ConditionKind,
        status: ConditionStatus,
    ) -> TemplateContext<'a> {
        TemplateContext {
            resource,
            kind,
            status,
            audience: Audience::Owner,
            action: None,
            failure_reason: None,
            base_url: "https://app.example.com/",
        }
    }

    #[test]
    fn test_critical_stock_message() {
        let resource = stock();
        let payload =
            NotificationPayload::render(&ctx(&resource, ConditionKind::LowStock, ConditionStatus::Critical));

        assert_eq!(payload.title, "Critical stock: Guji <natural>");
        assert!(payload.body.contains("Only 4 kg"));
        assert_eq!(payload.deep_link, "https://app.example.com/inventory/inv-1");
        assert_eq!(payload.severity, Severity::Critical);
        assert!(payload.email_subject.starts_with("[supply-watch]"));
        assert!(payload.email_html.contains("Guji &lt;natural&gt;"));
        assert!(!payload.email_html.contains("<natural>"));
    }

    #[test]
    fn test_placed_order_is_mentioned() {
        let resource = stock();
        let outcome = ActionOutcome::Placed {
            order_id: "order-9".to_string(),
            quantity: 120.0,
            unit: "kg".to_string(),
            total_cost: Some(1020.0),
        };
        let mut context = ctx(&resource, ConditionKind::LowStock, ConditionStatus::Critical);
        context.action = Some(&outcome);

        let payload = NotificationPayload::render(&context);
        assert!(payload.body.contains("automatic reorder of 120 kg for 1020.00"));
        assert!(payload.body.contains("order-9"));
    }

    #[test]
    fn test_failed_action_is_actionable() {
        let resource = stock();
        let mut context = ctx(
            &resource,
            ConditionKind::AutoReorderFailed,
            ConditionStatus::ActionFailed,
        );
        context.failure_reason = Some("supplier inactive");

        let payload = NotificationPayload::render(&context);
        assert!(payload.title.starts_with("Automatic reorder failed"));
        assert!(payload.body.contains("supplier inactive"));
        assert!(payload.body.contains("retry on the next check"));
    }

    #[test]
    fn test_offer_expiry_messages() {
        let offer = MonitoredResource::new(
            "offer-1",
            "cafe-1",
            ResourceClass::FavoriteOffer,
            "Kenya AA",
            ResourceMetric::Deadline {
                due_at: Utc.with_ymd_and_hms(2026, 5, 13, 9, 0, 0).unwrap(),
            },
        );

        let payload = NotificationPayload::render(&ctx(
            &offer,
            ConditionKind::OfferExpiry,
            ConditionStatus::ExpiringSoon(1),
        ));
        assert!(payload.body.contains("expires in 1 day."));
        assert_eq!(payload.deep_link, "https://app.example.com/offers/offer-1");

        let payload = NotificationPayload::render(&ctx(
            &offer,
            ConditionKind::OfferExpiry,
            ConditionStatus::Expired,
        ));
        assert_eq!(payload.title, "Offer expired: Kenya AA");
    }

    #[test]
    fn test_shipment_delay_differs_per_audience() {
        let shipment = MonitoredResource::new(
            "ship-1",
            "cafe-1",
            ResourceClass::Shipment,
            "Order #1001",
            ResourceMetric::Delivery {
                expected_at: Utc.with_ymd_and_hms(2026, 5, 9, 9, 0, 0).unwrap(),
                delivered: false,
            },
        )
        .with_counterparty("supplier-1");

        let mut context = ctx(&shipment, ConditionKind::ShipmentDelay, ConditionStatus::Delayed(3));
        let buyer = NotificationPayload::render(&context);
        context.audience = Audience::Counterparty;
        let supplier = NotificationPayload::render(&context);

        assert!(buyer.body.contains("3 days past its expected delivery"));
        assert!(supplier.body.contains("promised to your buyer"));
        assert_eq!(buyer.severity, Severity::Urgent);
    }
}
