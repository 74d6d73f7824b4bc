//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::db::RepositoryError;
use crate::payments::{GatewayError, WebhookError};
use crate::services::CheckoutError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Payment processor call failed.
    #[error("Payment error: {0}")]
    Payment(#[from] GatewayError),

    /// Catalog could not be read.
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Webhook delivery failed authentication or parsing.
    #[error("Webhook rejected: {0}")]
    Webhook(#[from] WebhookError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::EmptyCart | CheckoutError::IncompleteAddress(_) => {
                Self::BadRequest(err.to_string())
            }
            CheckoutError::Metadata(e) => Self::Internal(format!("checkout metadata: {e}")),
            CheckoutError::Gateway(e) => Self::Payment(e),
        }
    }
}

impl From<tower_sessions::session::Error> for AppError {
    fn from(err: tower_sessions::session::Error) -> Self {
        Self::Internal(format!("session: {err}"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if matches!(
            self,
            Self::Database(_) | Self::Internal(_) | Self::Payment(_) | Self::Catalog(_)
        ) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let status = match &self {
            Self::Database(RepositoryError::NotFound) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Database(RepositoryError::Conflict(_)) => StatusCode::CONFLICT,
            Self::Database(_) | Self::Internal(_) | Self::Catalog(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Payment(_) => StatusCode::BAD_GATEWAY,
            Self::Webhook(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        };

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Database(RepositoryError::NotFound) => "Not found".to_string(),
            Self::Database(_) | Self::Internal(_) | Self::Catalog(_) => {
                "Internal server error".to_string()
            }
            Self::Payment(_) => "Payment service error".to_string(),
            Self::Webhook(_) => "Invalid webhook".to_string(),
            _ => self.to_string(),
        };

        (status, message).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for shopper actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
pub fn add_breadcrumb(category: &str, message: &str, data: &[(&str, &str)]) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    for (key, value) in data {
        breadcrumb.data.insert(
            (*key).to_string(),
            serde_json::Value::String((*value).to_string()),
        );
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(AppError::NotFound("order".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Database(RepositoryError::NotFound)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Database(RepositoryError::Conflict("x".to_string()))),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(AppError::Webhook(WebhookError::SignatureMismatch)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::Payment(GatewayError::RateLimited(1))),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_checkout_errors_map_to_client_or_gateway() {
        assert_eq!(get_status(CheckoutError::EmptyCart.into()), StatusCode::BAD_REQUEST);
        assert_eq!(
            get_status(CheckoutError::IncompleteAddress("billing").into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(CheckoutError::Gateway(GatewayError::RateLimited(2)).into()),
            StatusCode::BAD_GATEWAY
        );
    }
}
