//! Auto-action execution: automatic replenishment orders.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::collaborators::{OrderRequest, OrderingService};
use crate::database::repositories::{ActionClaim, AutoActionRepository};
use crate::domain::{MonitoredResource, ThresholdConfig};
use crate::utils::with_timeout;
use crate::{Error, Result};

/// Result of a successful execution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    /// An order was created.
    Placed {
        order_id: String,
        quantity: f64,
        unit: String,
        total_cost: Option<f64>,
    },
    /// Another evaluation already acted within the cooldown.
    AlreadyActed,
}

/// Releases a claim that was neither confirmed nor released, which happens
/// when the executing future is dropped mid-order.
struct ClaimGuard {
    repo: Arc<dyn AutoActionRepository>,
    claim: ActionClaim,
    armed: bool,
}

impl ClaimGuard {
    fn new(repo: Arc<dyn AutoActionRepository>, claim: ActionClaim) -> Self {
        Self {
            repo,
            claim,
            armed: true,
        }
    }

    fn disarm(&mut self) -> &ActionClaim {
        self.armed = false;
        &self.claim
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let resource_id = self.claim.resource_id.clone();
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(resource_id = %resource_id, "Abandoned action claim left in place, no runtime to release it");
            return;
        };
        let repo = self.repo.clone();
        let claim = self.claim.clone();
        handle.spawn(async move {
            match repo.release(&claim).await {
                Ok(_) => warn!(resource_id = %resource_id, "Released abandoned action claim"),
                Err(e) => {
                    warn!(resource_id = %resource_id, error = %e, "Failed to release abandoned action claim")
                }
            }
        });
    }
}

/// Places replenishment orders and records them durably.
pub struct ActionExecutor {
    ordering: Arc<dyn OrderingService>,
    repo: Arc<dyn AutoActionRepository>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl ActionExecutor {
    pub fn new(
        ordering: Arc<dyn OrderingService>,
        repo: Arc<dyn AutoActionRepository>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Self {
        Self {
            ordering,
            repo,
            clock,
            timeout,
        }
    }

    /// Order quantity: the configured amount, rounded up to whole packaging units.
    pub fn order_quantity(resource: &MonitoredResource, config: &ThresholdConfig) -> f64 {
        match &resource.packaging {
            Some(packaging) => packaging.round_up(config.auto_action_quantity),
            None => config.auto_action_quantity,
        }
    }

    fn build_request(
        resource: &MonitoredResource,
        quantity: f64,
        claimed_at: i64,
    ) -> OrderRequest {
        let total_cost = resource.unit_price.map(|price| quantity * price);
        let remaining = resource
            .remaining()
            .map(|r| format!("{} {}", r, resource.unit))
            .unwrap_or_else(|| "unknown".to_string());
        let packaging = resource
            .packaging
            .as_ref()
            .map(|p| format!(" ({} x {})", p.units_for(quantity), p.unit_label))
            .unwrap_or_default();

        OrderRequest {
            buyer_id: resource.owner_id.clone(),
            supplier_id: resource.counterparty_id.clone(),
            resource_id: resource.id.clone(),
            product_ref: resource.product_ref.clone(),
            quantity,
            unit: resource.unit.clone(),
            total_cost,
            note: format!(
                "Automatic reorder of {} {}{} for {}: stock fell to {}, at or below the minimum level.",
                quantity, resource.unit, packaging, resource.name, remaining
            ),
            idempotency_key: format!("{}:{}", resource.id, claimed_at),
        }
    }

    /// Claim the cooldown slot, place the order and confirm it.
    ///
    /// On failure the claim is released so a later cycle may retry.
    pub async fn execute(
        &self,
        resource: &MonitoredResource,
        config: &ThresholdConfig,
    ) -> Result<ActionOutcome> {
        let quantity = Self::order_quantity(resource, config);
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(Error::validation(format!(
                "auto-action quantity must be positive, got {}",
                quantity
            )));
        }

        let now = self.clock.now();
        let Some(claim) = self.repo.try_claim(&resource.id, now, config.cooldown()).await? else {
            return Ok(ActionOutcome::AlreadyActed);
        };

        let request = Self::build_request(resource, quantity, claim.claimed_at);
        let mut guard = ClaimGuard::new(self.repo.clone(), claim);
        let result =
            with_timeout("create_order", self.timeout, self.ordering.create_order(&request)).await;

        match result {
            Ok(order_id) => {
                let claim = guard.disarm();
                if let Err(e) = self.repo.confirm(claim, &order_id).await {
                    // The timestamp is already held by the claim.
                    warn!(resource_id = %resource.id, order_id = %order_id, error = %e, "Failed to record order id");
                }
                info!(
                    resource_id = %resource.id,
                    order_id = %order_id,
                    quantity,
                    "Automatic reorder placed"
                );
                Ok(ActionOutcome::Placed {
                    order_id,
                    quantity,
                    unit: resource.unit.clone(),
                    total_cost: request.total_cost,
                })
            }
            Err(e) => {
                let claim = guard.disarm();
                match self.repo.release(claim).await {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!(resource_id = %resource.id, "Claim was superseded before release")
                    }
                    Err(release_err) => {
                        warn!(resource_id = %resource.id, error = %release_err, "Failed to release action claim")
                    }
                }
                Err(e)
            }
        }
    }
}
