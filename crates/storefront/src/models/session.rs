//! Session-related types.
//!
//! Types stored in the session for shopper identity.

use serde::{Deserialize, Serialize};

use tierline_core::{Email, UserId};

/// Session-stored user identity.
///
/// Written by the authentication provider once a shopper signs in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    /// User's database ID.
    pub id: UserId,
    /// User's email address, if the provider shared it.
    #[serde(default)]
    pub email: Option<Email>,
}

/// Session keys.
pub mod keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for the durable guest cart token.
    pub const GUEST_CART_TOKEN: &str = "guest_cart_token";

    /// Key for the user id the guest cart was last merged into.
    pub const MERGED_GUEST_FOR: &str = "merged_guest_for";
}
