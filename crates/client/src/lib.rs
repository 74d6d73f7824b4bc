//! Tierline Client - storefront API client and order reconciliation.
//!
//! # Modules
//!
//! - [`api`] - Typed HTTP client for the storefront JSON API
//! - [`retry`] - Fixed-delay polling with an attempt cap and a deadline
//! - [`reconcile`] - The post-payment wait for the webhook-created order

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod reconcile;
pub mod retry;

pub use api::{ApiError, HttpStorefrontApi, StorefrontApi};
pub use reconcile::{ReconcileFailure, ReconcileState, Reconciler};
pub use retry::{PollError, RetryError, RetryPolicy};
