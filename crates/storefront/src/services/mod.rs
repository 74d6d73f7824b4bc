//! Business logic services for storefront.
//!
//! # Services
//!
//! - [`cart`] - Cart for one browsing identity, persisted on every mutation
//! - [`checkout`] - Turns a cart into a hosted payment session
//! - [`materializer`] - Creates the order for a completed payment, once
//! - [`notifier`] - Order confirmation delivery (email)

pub mod cart;
pub mod checkout;
pub mod materializer;
pub mod notifier;

pub use cart::CartService;
pub use checkout::{CheckoutError, CheckoutInitiator};
pub use materializer::{Materialized, OrderMaterializer};
pub use notifier::{EmailNotifier, LogNotifier, NotifyError, OrderNotifier};
