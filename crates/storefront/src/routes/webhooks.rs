//! Payment processor webhook handler.
//!
//! The signature is checked against the raw body before anything is parsed.
//! A completed checkout is re-read from the processor to get its line items;
//! if that read fails the event's own copy of the session is used.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use serde::Serialize;
use tracing::instrument;

use tierline_core::OrderId;

use crate::error::Result;
use crate::payments::{SessionDetails, WebhookEvent};
use crate::state::AppState;

/// Header carrying `t=…,v1=…`.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Acknowledgement body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
}

impl WebhookAck {
    const fn ignored() -> Self {
        Self {
            received: true,
            order_id: None,
        }
    }
}

/// Receive a signed Stripe event.
///
/// Anything other than a missing or bad signature is acknowledged with 200
/// so the processor does not keep redelivering events the storefront cannot
/// act on.
#[instrument(skip_all)]
pub async fn stripe(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let event = state
        .gateway()
        .verify_webhook(&body, signature)
        .inspect_err(|e| tracing::warn!(error = %e, "Rejected webhook delivery"))?;

    match event {
        WebhookEvent::Ignored {
            event_id,
            event_type,
        } => {
            tracing::debug!(event_id = %event_id, event_type = %event_type, "Ignoring webhook event");
            Ok(Json(WebhookAck::ignored()))
        }
        WebhookEvent::CheckoutCompleted { event_id, session } => {
            let session_id = session.checkout.session_id.clone();
            tracing::info!(event_id = %event_id, session_id = %session_id, "Checkout completed");

            if !session.payment_status.is_settled() {
                tracing::info!(
                    session_id = %session_id,
                    payment_status = session.payment_status.as_str(),
                    "Payment not settled yet; waiting for a later event"
                );
                return Ok(Json(WebhookAck::ignored()));
            }

            let details = full_session(&state, *session).await;
            let materialized = state.materializer().materialize(&details.checkout).await?;

            Ok(Json(WebhookAck {
                received: true,
                order_id: Some(materialized.order.id),
            }))
        }
    }
}

/// Re-read the session with its line items, falling back to the event copy.
async fn full_session(state: &AppState, from_event: SessionDetails) -> SessionDetails {
    let session_id = &from_event.checkout.session_id;
    match state.gateway().retrieve_session(session_id).await {
        Ok(Some(details)) => details,
        Ok(None) => {
            tracing::warn!(session_id = %session_id, "Session unknown to processor; using event payload");
            from_event
        }
        Err(e) => {
            tracing::warn!(session_id = %session_id, error = %e, "Failed to retrieve session; using event payload");
            from_event
        }
    }
}
