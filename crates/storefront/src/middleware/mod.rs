//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Session layer (tower-sessions)
//!
//! The [`Shopper`] extractor reads the session inside handlers.

pub mod identity;
pub mod request_id;
pub mod session;

pub use identity::{Shopper, sign_in_session, sign_out_session};
pub use request_id::request_id_middleware;
pub use session::{create_session_layer, session_layer};
