//! Order management commands.
//!
//! # Usage
//!
//! ```bash
//! # Wait for the order of a paid checkout session to appear
//! tl-cli order reconcile cs_test_123 --base-url http://127.0.0.1:3000
//!
//! # Mark an order shipped
//! tl-cli order set-status 42 shipped --tracking 1Z999AA10123456784
//! ```

use thiserror::Error;

use tierline_client::{ApiError, HttpStorefrontApi, ReconcileFailure, Reconciler, RetryPolicy};
use tierline_core::order::{FulfillmentUpdate, Order};
use tierline_core::{OrderId, OrderStatus, PaymentSessionId};
use tierline_storefront::db::{OrderStore, PgOrderStore, RepositoryError, create_pool};

/// Errors that can occur during order commands.
#[derive(Debug, Error)]
pub enum OrderCommandError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Order {0} not found")]
    NotFound(OrderId),

    #[error("{0}")]
    Repository(#[from] RepositoryError),

    #[error("Storefront API error: {0}")]
    Api(#[from] ApiError),

    #[error("{}", .0.message())]
    Reconcile(#[from] ReconcileFailure),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reconcile a paid checkout session against the storefront API and print
/// the order as JSON.
///
/// # Errors
///
/// Returns the reconciliation failure if the order never appears.
pub async fn reconcile(session_id: &str, base_url: &str) -> Result<(), OrderCommandError> {
    let api = HttpStorefrontApi::new(base_url)?;
    let reconciler = Reconciler::new(api, RetryPolicy::order_reconciliation());

    let mut states = reconciler.subscribe();
    let progress = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            tracing::info!(state = ?state, "Reconciliation progress");
            if state.is_terminal() {
                break;
            }
        }
    });

    let outcome = reconciler.run(&PaymentSessionId::new(session_id)).await;
    let _ = progress.await;

    print_order(&outcome?)
}

/// Move an order to a new fulfillment status.
///
/// # Errors
///
/// Returns an error for an unknown order or a transition the current status
/// does not allow.
pub async fn set_status(
    id: i32,
    status: OrderStatus,
    tracking_number: Option<String>,
    notes: Option<String>,
) -> Result<(), OrderCommandError> {
    let database_url = super::storefront_database_url()
        .ok_or(OrderCommandError::MissingEnvVar("STOREFRONT_DATABASE_URL"))?;
    let store = PgOrderStore::new(create_pool(&database_url).await?);
    let id = OrderId::new(id);

    let order = store
        .update_fulfillment(
            id,
            FulfillmentUpdate {
                status,
                tracking_number,
                notes,
            },
        )
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => OrderCommandError::NotFound(id),
            other => OrderCommandError::Repository(other),
        })?;

    tracing::info!(order_id = %order.id, status = %order.status, "Order updated");
    print_order(&order)
}

fn print_order(order: &Order) -> Result<(), OrderCommandError> {
    let json = serde_json::to_string_pretty(order)?;
    #[allow(clippy::print_stdout)]
    {
        println!("{json}");
    }
    Ok(())
}
