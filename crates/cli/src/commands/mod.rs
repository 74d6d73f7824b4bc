//! CLI command implementations.

pub mod migrate;
pub mod order;

use secrecy::SecretString;

/// Database URL for the storefront database.
///
/// Reads `STOREFRONT_DATABASE_URL`, falling back to `DATABASE_URL`.
pub(crate) fn storefront_database_url() -> Option<SecretString> {
    dotenvy::dotenv().ok();

    std::env::var("STOREFRONT_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()
        .map(SecretString::from)
}
