//! Payment verification and order lookup handlers.
//!
//! These back the success page: the browser first asks whether the session
//! was paid, then polls for the order the webhook creates.

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::instrument;

use tierline_core::api::PaymentVerification;
use tierline_core::order::Order;
use tierline_core::PaymentSessionId;

use crate::error::{AppError, Result};
use crate::state::AppState;

/// Ask the payment processor whether a checkout session was paid.
#[instrument(skip(state), fields(session_id = %session_id))]
pub async fn verify_payment(
    State(state): State<AppState>,
    Path(session_id): Path<PaymentSessionId>,
) -> Result<Json<PaymentVerification>> {
    let details = state
        .gateway()
        .retrieve_session(&session_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("checkout session {session_id}")))?;

    Ok(Json(PaymentVerification::from(details.payment_status)))
}

/// Find the order created for a checkout session.
///
/// A 404 is expected while the webhook is still in flight.
#[instrument(skip(state), fields(session_id = %session_id))]
pub async fn by_session(
    State(state): State<AppState>,
    Path(session_id): Path<PaymentSessionId>,
) -> Result<Json<Order>> {
    state
        .orders()
        .get_by_session(&session_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("order for session {session_id}")))
}
