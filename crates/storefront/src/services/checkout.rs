//! Checkout session initiation.
//!
//! Converts the shopper's cart into a processor checkout session. The cart
//! snapshot, its owner and any pre-entered addresses ride along as session
//! metadata so the webhook can build the order without the cart.

use std::sync::Arc;

use thiserror::Error;

use tierline_core::api::{CheckoutRequest, CheckoutStarted};
use tierline_core::cart::{Cart, CartIdentity, ShippingRule};
use tierline_core::order::{Address, CartSnapshotItem, CheckoutMetadata};
use tierline_core::Email;

use crate::payments::{CheckoutLine, CheckoutSessionRequest, GatewayError, PaymentGateway};

/// Placeholder the processor replaces with the real session id.
const SESSION_ID_TEMPLATE: &str = "{CHECKOUT_SESSION_ID}";

/// Errors from starting a checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,

    #[error("{0} address is incomplete")]
    IncompleteAddress(&'static str),

    #[error("failed to encode session metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Starts hosted checkout sessions.
#[derive(Clone)]
pub struct CheckoutInitiator {
    gateway: Arc<dyn PaymentGateway>,
    base_url: String,
    shipping: ShippingRule,
}

impl CheckoutInitiator {
    #[must_use]
    pub fn new(gateway: Arc<dyn PaymentGateway>, base_url: String, shipping: ShippingRule) -> Self {
        Self {
            gateway,
            base_url,
            shipping,
        }
    }

    /// Build the processor request for `cart`.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty cart, an incomplete pre-entered address,
    /// or metadata that fails to encode.
    pub fn build_request(
        &self,
        cart: &Cart,
        owner: &CartIdentity,
        customer_email: Option<Email>,
        request: CheckoutRequest,
    ) -> Result<CheckoutSessionRequest, CheckoutError> {
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let shipping_address = complete(request.shipping_address, "shipping")?;
        let billing_address = complete(request.billing_address, "billing")?;

        let metadata = CheckoutMetadata {
            items: cart.items().iter().map(CartSnapshotItem::from).collect(),
            owner: Some(owner.clone()),
            shipping_address,
            billing_address,
        }
        .encode()?;

        let lines = cart
            .items()
            .iter()
            .map(|item| CheckoutLine {
                name: item.name.clone(),
                description: item.variant_title.clone(),
                image_url: item.image_url.clone(),
                unit_amount: item.unit_price(),
                quantity: item.quantity.get(),
            })
            .collect();

        Ok(CheckoutSessionRequest {
            lines,
            shipping: cart.summary_with(&self.shipping).shipping,
            customer_email,
            metadata,
            success_url: format!(
                "{}/checkout/success?session_id={SESSION_ID_TEMPLATE}",
                self.base_url
            ),
            cancel_url: format!("{}/cart", self.base_url),
        })
    }

    /// Create a checkout session for `cart`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be built or the processor
    /// rejects it.
    #[tracing::instrument(skip(self, cart, customer_email, request), fields(owner = %owner))]
    pub async fn start(
        &self,
        cart: &Cart,
        owner: &CartIdentity,
        customer_email: Option<Email>,
        request: CheckoutRequest,
    ) -> Result<CheckoutStarted, CheckoutError> {
        let session_request = self.build_request(cart, owner, customer_email, request)?;
        let session = self.gateway.create_checkout_session(&session_request).await?;

        Ok(CheckoutStarted {
            session_id: session.id,
            url: session.url,
        })
    }
}

fn complete(address: Option<Address>, which: &'static str) -> Result<Option<Address>, CheckoutError> {
    match address {
        Some(address) if !address.is_complete() => Err(CheckoutError::IncompleteAddress(which)),
        other => Ok(other),
    }
}
