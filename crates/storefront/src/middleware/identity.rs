//! Shopper identity extractor.
//!
//! Every browsing session carries a durable guest cart token, minted on first
//! contact and kept across sign-in. The authentication provider adds a
//! [`CurrentUser`] to the same session; the cart follows the user id when
//! present and the guest token otherwise.

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;
use uuid::Uuid;

use tierline_core::cart::CartIdentity;
use tierline_core::{GuestSessionId, UserId};

use crate::error::{AppError, clear_sentry_user, set_sentry_user};
use crate::models::{CurrentUser, session_keys};

/// The shopper behind a request.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(shopper: Shopper) -> impl IntoResponse {
///     format!("cart owner: {}", shopper.identity())
/// }
/// ```
pub struct Shopper {
    pub session: Session,
    pub guest: GuestSessionId,
    pub user: Option<CurrentUser>,
    /// User the guest cart was already merged into during this session.
    pub merged_for: Option<UserId>,
}

impl Shopper {
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.user.as_ref().map(|u| u.id)
    }

    /// The key the cart is persisted under.
    #[must_use]
    pub fn identity(&self) -> CartIdentity {
        CartIdentity::resolve(self.user_id(), self.guest.clone())
    }

    /// Whether the guest cart still has to be folded into the user's cart.
    #[must_use]
    pub fn needs_merge(&self) -> bool {
        self.user_id().is_some() && self.merged_for != self.user_id()
    }

    /// Record that the guest cart was merged into `user`.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be modified.
    pub async fn record_merge(&mut self, user: UserId) -> Result<(), AppError> {
        self.session
            .insert(session_keys::MERGED_GUEST_FOR, user)
            .await?;
        self.merged_for = Some(user);
        Ok(())
    }
}

impl<S> FromRequestParts<S> for Shopper
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Get the session from extensions (set by SessionManagerLayer)
        let session = parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| AppError::Internal("session layer missing".to_string()))?;

        let guest = match session
            .get::<GuestSessionId>(session_keys::GUEST_CART_TOKEN)
            .await?
        {
            Some(token) => token,
            None => {
                let token = GuestSessionId::new(Uuid::new_v4().to_string());
                session.insert(session_keys::GUEST_CART_TOKEN, &token).await?;
                token
            }
        };

        let user: Option<CurrentUser> = session.get(session_keys::CURRENT_USER).await?;
        let merged_for: Option<UserId> = session.get(session_keys::MERGED_GUEST_FOR).await?;

        if let Some(user) = &user {
            set_sentry_user(&user.id, user.email.as_ref().map(tierline_core::Email::as_str));
        }

        Ok(Self {
            session,
            guest,
            user,
            merged_for,
        })
    }
}

/// Put a signed-in user into the session.
///
/// The session id is rotated to prevent fixation. The guest cart token is
/// kept so the next cart request can merge it.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn sign_in_session(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(session_keys::CURRENT_USER, user).await
}

/// Remove the signed-in user and start a fresh guest identity.
///
/// Returns the new guest token.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn sign_out_session(
    session: &Session,
) -> Result<GuestSessionId, tower_sessions::session::Error> {
    session
        .remove::<CurrentUser>(session_keys::CURRENT_USER)
        .await?;
    session
        .remove::<UserId>(session_keys::MERGED_GUEST_FOR)
        .await?;
    session.cycle_id().await?;

    let guest = GuestSessionId::new(Uuid::new_v4().to_string());
    session.insert(session_keys::GUEST_CART_TOKEN, &guest).await?;
    clear_sentry_user();
    Ok(guest)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use tower_sessions::MemoryStore;

    use super::*;

    fn session() -> Session {
        Session::new(None, Arc::new(MemoryStore::default()), None)
    }

    async fn shopper(session: Session) -> Shopper {
        let mut parts = axum::http::Request::new(()).into_parts().0;
        parts.extensions.insert(session);
        Shopper::from_request_parts(&mut parts, &()).await.unwrap()
    }

    #[tokio::test]
    async fn test_guest_token_is_stable() {
        let session = session();
        let first = shopper(session.clone()).await;
        let second = shopper(session).await;

        assert_eq!(first.guest, second.guest);
        assert_eq!(first.identity(), CartIdentity::Guest(first.guest.clone()));
        assert!(!first.needs_merge());
    }

    #[tokio::test]
    async fn test_sign_in_requires_merge_once() {
        let session = session();
        let guest = shopper(session.clone()).await.guest;

        let user = CurrentUser {
            id: UserId::new(4),
            email: None,
        };
        sign_in_session(&session, &user).await.unwrap();

        let mut signed_in = shopper(session.clone()).await;
        assert_eq!(signed_in.guest, guest);
        assert_eq!(signed_in.identity(), CartIdentity::User(UserId::new(4)));
        assert!(signed_in.needs_merge());

        signed_in.record_merge(UserId::new(4)).await.unwrap();
        assert!(!shopper(session).await.needs_merge());
    }

    #[tokio::test]
    async fn test_sign_out_mints_new_guest() {
        let session = session();
        let before = shopper(session.clone()).await.guest;
        sign_in_session(
            &session,
            &CurrentUser {
                id: UserId::new(4),
                email: None,
            },
        )
        .await
        .unwrap();

        let after = sign_out_session(&session).await.unwrap();
        let shopper = shopper(session).await;
        assert_ne!(before, after);
        assert_eq!(shopper.guest, after);
        assert!(shopper.user.is_none());
        assert!(shopper.merged_for.is_none());
    }
}
