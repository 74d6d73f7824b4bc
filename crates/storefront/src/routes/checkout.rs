//! Checkout route handler.

use axum::{Json, extract::State};
use tracing::instrument;

use tierline_core::api::{CheckoutRequest, CheckoutStarted};

use crate::error::{Result, add_breadcrumb};
use crate::middleware::Shopper;
use crate::routes::cart::open_cart;
use crate::state::AppState;

/// Create a hosted checkout session for the shopper's cart.
///
/// The cart itself is not cleared here; that happens once the order exists.
#[instrument(skip(state, shopper, req))]
pub async fn start(
    State(state): State<AppState>,
    mut shopper: Shopper,
    req: Option<Json<CheckoutRequest>>,
) -> Result<Json<CheckoutStarted>> {
    let cart = open_cart(&state, &mut shopper).await?;
    let owner = cart.identity();
    let customer_email = shopper.user.as_ref().and_then(|u| u.email.clone());
    let req = req.map(|Json(req)| req).unwrap_or_default();

    let started = state
        .checkout()
        .start(cart.cart(), &owner, customer_email, req)
        .await?;

    add_breadcrumb(
        "checkout",
        "Checkout session created",
        &[("session_id", started.session_id.as_str())],
    );
    tracing::info!(session_id = %started.session_id, owner = %owner, "Checkout started");

    Ok(Json(started))
}
