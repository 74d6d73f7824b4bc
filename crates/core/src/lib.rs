//! Tierline Core - pricing, cart and order domain.
//!
//! This crate holds the rules shared by every Tierline component:
//! - `storefront` - cart API, checkout and payment webhook server
//! - `client` - storefront API client and order-confirmation poller
//! - `cli` - migrations and back-office order commands
//!
//! # Architecture
//!
//! No I/O lives here: no database access, no HTTP clients, no clocks except
//! where a caller passes one in. Everything is plain data and pure functions
//! so it can be tested without infrastructure.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, money, quantities, emails, and statuses
//! - [`pricing`] - Tier and quantity-pack unit price resolution
//! - [`cart`] - The cart aggregate, its summary, and guest/user merging
//! - [`order`] - Orders and their derivation from a completed payment
//! - [`api`] - JSON bodies shared by the storefront API and its clients

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod order;
pub mod pricing;
pub mod types;

pub use types::*;
