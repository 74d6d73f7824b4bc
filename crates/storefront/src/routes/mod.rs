//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                          - Liveness check
//! GET    /health/ready                    - Readiness check (database ping)
//!
//! # Cart (JSON, session-cookie identity)
//! GET    /api/cart                        - Cart lines and summary
//! POST   /api/cart/items                  - Add a catalog item
//! PATCH  /api/cart/items/{itemId}         - Edit a line's quantity field
//! DELETE /api/cart/items/{itemId}         - Remove a line
//! POST   /api/cart/clear                  - Empty the cart
//!
//! # Checkout
//! POST   /api/checkout                    - Create a hosted checkout session
//! GET    /api/verify-payment/{sessionId}  - Payment status of a session
//! GET    /api/orders/by-session/{sessionId} - Order created for a session
//!
//! # Session
//! POST   /api/session/sign-out            - Drop the user, start a new guest cart
//!
//! # Webhooks
//! POST   /api/webhooks/stripe             - Signed payment processor events
//! ```

pub mod cart;
pub mod checkout;
pub mod health;
pub mod orders;
pub mod session;
pub mod webhooks;

use axum::{
    Router,
    routing::{get, patch, post},
};

use crate::state::AppState;

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/items", post(cart::add_item))
        .route(
            "/items/{item_id}",
            patch(cart::update_item).delete(cart::remove_item),
        )
        .route("/clear", post(cart::clear))
}

/// Create the checkout and order lookup routes router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(checkout::start))
        .route("/verify-payment/{session_id}", get(orders::verify_payment))
        .route("/orders/by-session/{session_id}", get(orders::by_session))
}

/// Create all API routes.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/cart", cart_routes())
        .merge(checkout_routes())
        .route("/session/sign-out", post(session::sign_out))
        .route("/webhooks/stripe", post(webhooks::stripe))
}

/// Create the main application router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api", api_routes())
}
