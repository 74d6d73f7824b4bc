//! Webhook order materialization.
//!
//! A completed payment becomes exactly one order. The insert is keyed by the
//! payment session id, so a redelivered or duplicated event returns the
//! existing order and skips the side effects. Side effects (clearing the
//! persisted cart, the confirmation email) run in a spawned task after the
//! insert; each is isolated and only logged on failure.

use std::sync::Arc;

use tokio::task::JoinHandle;

use tierline_core::cart::CartIdentity;
use tierline_core::order::{CompletedCheckout, Order, derive_order};

use crate::db::{CartStore, OrderStore, RepositoryError};
use crate::services::notifier::OrderNotifier;

/// Outcome of materializing one completed checkout.
#[derive(Debug)]
pub struct Materialized {
    pub order: Order,
    /// `false` when the order already existed.
    pub created: bool,
    /// Post-insert side effects; `None` for a duplicate.
    pub side_effects: Option<JoinHandle<()>>,
}

/// Creates orders from completed checkouts.
#[derive(Clone)]
pub struct OrderMaterializer {
    orders: Arc<dyn OrderStore>,
    carts: Arc<dyn CartStore>,
    notifier: Arc<dyn OrderNotifier>,
}

impl OrderMaterializer {
    #[must_use]
    pub fn new(
        orders: Arc<dyn OrderStore>,
        carts: Arc<dyn CartStore>,
        notifier: Arc<dyn OrderNotifier>,
    ) -> Self {
        Self {
            orders,
            carts,
            notifier,
        }
    }

    /// Derive and store the order for `checkout`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the order cannot be stored.
    #[tracing::instrument(skip(self, checkout), fields(session_id = %checkout.session_id))]
    pub async fn materialize(
        &self,
        checkout: &CompletedCheckout,
    ) -> Result<Materialized, RepositoryError> {
        let derived = derive_order(checkout);
        for warning in &derived.warnings {
            tracing::warn!(warning = %warning, "Order derived with fallback");
        }
        tracing::debug!(
            shipping_origin = ?derived.shipping_origin,
            billing_origin = ?derived.billing_origin,
            "Resolved order addresses"
        );

        let cart_owner = derived.order.cart_owner.clone();
        let inserted = self.orders.insert_if_absent(&derived.order).await?;

        if !inserted.created {
            tracing::info!(order_id = %inserted.order.id, "Order already exists for session");
            return Ok(Materialized {
                order: inserted.order,
                created: false,
                side_effects: None,
            });
        }

        tracing::info!(
            order_id = %inserted.order.id,
            total = %inserted.order.totals.total,
            "Order created"
        );

        let side_effects = tokio::spawn(run_side_effects(
            self.carts.clone(),
            self.notifier.clone(),
            cart_owner,
            inserted.order.clone(),
        ));

        Ok(Materialized {
            order: inserted.order,
            created: true,
            side_effects: Some(side_effects),
        })
    }
}

async fn run_side_effects(
    carts: Arc<dyn CartStore>,
    notifier: Arc<dyn OrderNotifier>,
    cart_owner: Option<CartIdentity>,
    order: Order,
) {
    if let Some(owner) = cart_owner {
        match carts.delete(&owner).await {
            Ok(()) => tracing::debug!(owner = %owner, "Cleared cart after order"),
            Err(e) => tracing::warn!(owner = %owner, error = %e, "Failed to clear cart after order"),
        }
    }

    if let Err(e) = notifier.order_confirmed(&order).await {
        tracing::warn!(order_id = %order.id, error = %e, "Failed to send order confirmation");
    }
}
