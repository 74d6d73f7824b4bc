//! Orders: the durable record of a completed payment.
//!
//! An order is written once, from a completed checkout session, and after
//! that only its fulfillment fields (status, tracking number, notes) change.
//! Items, addresses and totals are a snapshot and never recomputed.

mod address;
mod derive;
pub mod metadata;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use address::{
    Address, AddressOrigin, AddressSource, ResolvedAddress, billing_sources, resolve_address,
    shipping_sources,
};
pub use derive::{CompletedCheckout, DerivedOrder, ProcessorAmounts, ProcessorLineItem, derive_order};
pub use metadata::{CartSnapshotItem, CheckoutMetadata};

use crate::cart::CartIdentity;
use crate::types::{Email, Money, OrderId, OrderStatus, PaymentSessionId, ProductId, UserId, VariantId};

/// Errors from order mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}

/// One purchased line, frozen at payment time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    /// Missing when the cart snapshot could not be matched to this line.
    pub product_id: Option<ProductId>,
    pub variant_id: Option<VariantId>,
    pub name: String,
    pub variant_title: Option<String>,
    pub image_url: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
}

/// Monetary totals as reported by the payment processor.
///
/// `subtotal` is derived: `total - shipping - tax + discount`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub shipping: Money,
    pub tax: Money,
    pub total: Money,
}

/// An order ready to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub payment_session_id: PaymentSessionId,
    pub payment_intent_id: Option<String>,
    pub user_id: Option<UserId>,
    pub customer_email: Option<Email>,
    pub customer_name: Option<String>,
    pub items: Vec<OrderItem>,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub totals: OrderTotals,
    /// Cart to clear once the order exists. Not persisted.
    pub cart_owner: Option<CartIdentity>,
}

/// A stored order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    #[serde(rename = "stripeSessionId")]
    pub payment_session_id: PaymentSessionId,
    pub payment_intent_id: Option<String>,
    pub user_id: Option<UserId>,
    pub customer_email: Option<Email>,
    pub customer_name: Option<String>,
    pub items: Vec<OrderItem>,
    pub shipping_address: Address,
    pub billing_address: Address,
    #[serde(flatten)]
    pub totals: OrderTotals,
    pub status: OrderStatus,
    pub tracking_number: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Materialize a stored order from an insert.
    #[must_use]
    pub fn from_new(id: OrderId, new: NewOrder, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            payment_session_id: new.payment_session_id,
            payment_intent_id: new.payment_intent_id,
            user_id: new.user_id,
            customer_email: new.customer_email,
            customer_name: new.customer_name,
            items: new.items,
            shipping_address: new.shipping_address,
            billing_address: new.billing_address,
            totals: new.totals,
            status: OrderStatus::default(),
            tracking_number: None,
            notes: None,
            created_at,
            updated_at: created_at,
        }
    }

    /// Apply a back-office fulfillment update.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::InvalidTransition`] if the status change is not
    /// allowed from the current status.
    pub fn apply_fulfillment(
        &mut self,
        update: FulfillmentUpdate,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if !self.status.can_transition_to(update.status) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: update.status,
            });
        }
        self.status = update.status;
        if update.tracking_number.is_some() {
            self.tracking_number = update.tracking_number;
        }
        if update.notes.is_some() {
            self.notes = update.notes;
        }
        self.updated_at = now;
        Ok(())
    }
}

/// The only mutation an order accepts after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentUpdate {
    pub status: OrderStatus,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}
