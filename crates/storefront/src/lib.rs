//! Tierline Storefront library.
//!
//! Cart API, hosted checkout and the payment webhook that turns completed
//! checkouts into orders. Exposed as a library so the binary, the CLI and
//! the integration tests assemble the same router.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod routes;
pub mod services;
pub mod state;

use axum::{Router, http::Request, middleware as axum_middleware};
use tower_http::trace::TraceLayer;
use tower_sessions::{SessionManagerLayer, SessionStore};

use crate::state::AppState;

/// Assemble the storefront router with its middleware stack.
///
/// The session layer is passed in so tests can use an in-memory store.
pub fn build_app<S>(state: AppState, session_layer: SessionManagerLayer<S>) -> Router
where
    S: SessionStore + Clone,
{
    build_app_with(routes::routes(), state, session_layer)
}

/// Like [`build_app`], over an arbitrary route set.
pub fn build_app_with<S>(
    routes: Router<AppState>,
    state: AppState,
    session_layer: SessionManagerLayer<S>,
) -> Router
where
    S: SessionStore + Clone,
{
    routes
        .layer(session_layer)
        .layer(axum_middleware::from_fn(middleware::request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}
