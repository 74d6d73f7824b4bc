//! Cart route handlers.
//!
//! Every handler loads the cart of the resolved shopper identity, applies
//! one mutation and answers with the full cart view. The first cart request
//! after sign-in folds the guest cart into the user's cart.

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::instrument;

use tierline_core::api::{AddItemRequest, CartView, UpdateItemRequest};
use tierline_core::cart::{LineKey, LineKeyError};

use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::Shopper;
use crate::services::CartService;
use crate::state::AppState;

/// Open the shopper's cart, running the pending guest merge first.
pub(crate) async fn open_cart(state: &AppState, shopper: &mut Shopper) -> Result<CartService> {
    if !shopper.needs_merge() {
        return Ok(CartService::open(
            state.carts(),
            state.shipping(),
            shopper.guest.clone(),
            shopper.user_id(),
            shopper.merged_for,
        )
        .await?);
    }

    let Some(user) = shopper.user_id() else {
        return Err(AppError::Internal("merge without user".to_string()));
    };

    let mut cart = CartService::open(
        state.carts(),
        state.shipping(),
        shopper.guest.clone(),
        None,
        shopper.merged_for,
    )
    .await?;
    if cart.sign_in(user).await? {
        tracing::info!(user_id = %user, guest = %shopper.guest, "Merged guest cart");
    }
    shopper.record_merge(user).await?;

    Ok(cart)
}

fn line_key(item_id: &str) -> Result<LineKey> {
    item_id
        .parse()
        .map_err(|e: LineKeyError| AppError::BadRequest(e.to_string()))
}

/// Show the cart.
#[instrument(skip(state, shopper))]
pub async fn show(State(state): State<AppState>, mut shopper: Shopper) -> Result<Json<CartView>> {
    let cart = open_cart(&state, &mut shopper).await?;
    Ok(Json(cart.view()))
}

/// Add a catalog item; an existing line for the same item grows instead.
#[instrument(skip(state, shopper), fields(product_id = %req.product_id))]
pub async fn add_item(
    State(state): State<AppState>,
    mut shopper: Shopper,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<CartView>> {
    let entry = state
        .catalog()
        .product(&req.product_id, req.variant_id.as_ref())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {}", req.product_id)))?;

    let mut cart = open_cart(&state, &mut shopper).await?;
    let line = entry.line_item(req.quantity);
    add_breadcrumb(
        "cart",
        "Added item",
        &[
            ("line", &line.key().to_string()),
            ("quantity", &req.quantity.get().to_string()),
        ],
    );
    cart.add_item(line).await;

    Ok(Json(cart.view()))
}

/// Apply an edit of a line's quantity field.
///
/// Blank or unparsable text while typing leaves the line alone; on commit it
/// falls back to one. Zero removes the line.
#[instrument(skip(state, shopper, req))]
pub async fn update_item(
    State(state): State<AppState>,
    mut shopper: Shopper,
    Path(item_id): Path<String>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<CartView>> {
    let key = line_key(&item_id)?;
    let mut cart = open_cart(&state, &mut shopper).await?;
    cart.apply_edit(&key, req.edit()).await;
    Ok(Json(cart.view()))
}

/// Remove a line. Unknown lines are a no-op.
#[instrument(skip(state, shopper))]
pub async fn remove_item(
    State(state): State<AppState>,
    mut shopper: Shopper,
    Path(item_id): Path<String>,
) -> Result<Json<CartView>> {
    let key = line_key(&item_id)?;
    let mut cart = open_cart(&state, &mut shopper).await?;
    cart.remove_item(&key).await;
    Ok(Json(cart.view()))
}

/// Empty the cart.
#[instrument(skip(state, shopper))]
pub async fn clear(State(state): State<AppState>, mut shopper: Shopper) -> Result<Json<CartView>> {
    let mut cart = open_cart(&state, &mut shopper).await?;
    cart.clear().await;
    Ok(Json(cart.view()))
}
