//! Session handlers.

use axum::{Json, extract::State};
use tracing::instrument;

use tierline_core::api::CartView;

use crate::error::Result;
use crate::middleware::{Shopper, sign_out_session};
use crate::services::CartService;
use crate::state::AppState;

/// Sign the user out and start a fresh, empty guest cart.
///
/// The user's stored cart is kept for their next sign-in.
#[instrument(skip(state, shopper))]
pub async fn sign_out(State(state): State<AppState>, shopper: Shopper) -> Result<Json<CartView>> {
    let user = shopper.user_id();
    let guest = sign_out_session(&shopper.session).await?;

    let mut cart = CartService::open(
        state.carts(),
        state.shipping(),
        shopper.guest,
        user,
        shopper.merged_for,
    )
    .await?;
    cart.sign_out(guest);

    Ok(Json(cart.view()))
}
