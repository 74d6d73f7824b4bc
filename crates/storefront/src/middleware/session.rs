//! Session middleware configuration.
//!
//! Production uses `PostgreSQL`-backed sessions; tests plug in any other
//! `tower-sessions` store.

use sqlx::PgPool;
use tower_sessions::{Expiry, SessionManagerLayer, SessionStore};
use tower_sessions_sqlx_store::PostgresStore;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "tl_session";

/// Session expiry time in seconds (30 days), so a guest cart outlives a
/// browser restart.
const SESSION_EXPIRY_SECONDS: i64 = 30 * 24 * 60 * 60;

/// Create the session layer over any store.
#[must_use]
pub fn session_layer<S: SessionStore + Clone>(store: S, secure: bool) -> SessionManagerLayer<S> {
    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(secure)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}

/// Create the session layer with `PostgreSQL` store.
///
/// The sessions table is created by `PostgresStore::migrate` (run from the
/// CLI `migrate` command).
#[must_use]
pub fn create_session_layer(pool: &PgPool, secure: bool) -> SessionManagerLayer<PostgresStore> {
    session_layer(PostgresStore::new(pool.clone()), secure)
}
