//! Who owns a cart.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{GuestSessionId, UserId};

/// The owner of a cart record.
///
/// A browsing session is either anonymous, keyed by a durable guest token, or
/// authenticated, keyed by the user id. When both are known the user wins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CartIdentity {
    Guest(GuestSessionId),
    User(UserId),
}

impl CartIdentity {
    /// Resolve the persistence key: a user id if present, else the guest token.
    #[must_use]
    pub fn resolve(user: Option<UserId>, guest: GuestSessionId) -> Self {
        user.map_or(Self::Guest(guest), Self::User)
    }

    /// The user id, when authenticated.
    #[must_use]
    pub const fn user_id(&self) -> Option<UserId> {
        match self {
            Self::User(id) => Some(*id),
            Self::Guest(_) => None,
        }
    }

    /// The guest token, when anonymous.
    #[must_use]
    pub const fn guest_id(&self) -> Option<&GuestSessionId> {
        match self {
            Self::Guest(id) => Some(id),
            Self::User(_) => None,
        }
    }
}

impl fmt::Display for CartIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Guest(id) => write!(f, "guest:{id}"),
            Self::User(id) => write!(f, "user:{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_wins_over_guest() {
        let guest = GuestSessionId::new("g-1");
        assert_eq!(
            CartIdentity::resolve(Some(UserId::new(9)), guest.clone()),
            CartIdentity::User(UserId::new(9))
        );
        assert_eq!(
            CartIdentity::resolve(None, guest.clone()),
            CartIdentity::Guest(guest)
        );
    }
}
