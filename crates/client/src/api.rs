//! Storefront HTTP API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

use tierline_core::PaymentSessionId;
use tierline_core::api::{
    AddItemRequest, CartView, CheckoutRequest, CheckoutStarted, PaymentVerification,
    UpdateItemRequest,
};
use tierline_core::cart::LineKey;
use tierline_core::order::Order;

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors talking to the storefront API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The base URL cannot carry a path.
    #[error("invalid base URL: {0}")]
    BaseUrl(String),

    /// The storefront answered with a non-success status.
    #[error("storefront returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Rate limited by the storefront.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ApiError {
    /// HTTP status of the response, if there was one.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::RateLimited(_) => Some(429),
            _ => None,
        }
    }
}

/// The storefront endpoints order reconciliation depends on.
#[async_trait]
pub trait StorefrontApi: Send + Sync {
    /// Whether the checkout session was paid.
    async fn verify_payment(
        &self,
        session_id: &PaymentSessionId,
    ) -> Result<PaymentVerification, ApiError>;

    /// The order created for a session; `None` while it does not exist yet.
    async fn order_by_session(&self, session_id: &PaymentSessionId)
    -> Result<Option<Order>, ApiError>;

    /// Empty the shopper's cart.
    async fn clear_cart(&self) -> Result<(), ApiError>;
}

/// [`StorefrontApi`] over HTTP.
///
/// The client keeps a cookie jar, so one instance is one shopper session.
#[derive(Debug, Clone)]
pub struct HttpStorefrontApi {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpStorefrontApi {
    /// Create a client for the storefront at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be
    /// built.
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Self::with_client(client, base_url)
    }

    /// Use an existing `reqwest` client.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url).map_err(|e| ApiError::BaseUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::BaseUrl(base_url.to_string()));
        }
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::BaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Current cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn cart(&self) -> Result<CartView, ApiError> {
        let url = self.endpoint(&["api", "cart"])?;
        read_json(self.client.get(url).send().await?).await
    }

    /// Add an item.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the product is unknown.
    pub async fn add_item(&self, request: &AddItemRequest) -> Result<CartView, ApiError> {
        let url = self.endpoint(&["api", "cart", "items"])?;
        read_json(self.client.post(url).json(request).send().await?).await
    }

    /// Edit a line's quantity field.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn update_item(
        &self,
        line: &LineKey,
        request: &UpdateItemRequest,
    ) -> Result<CartView, ApiError> {
        let line = line.to_string();
        let url = self.endpoint(&["api", "cart", "items", &line])?;
        read_json(self.client.patch(url).json(request).send().await?).await
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn remove_item(&self, line: &LineKey) -> Result<CartView, ApiError> {
        let line = line.to_string();
        let url = self.endpoint(&["api", "cart", "items", &line])?;
        read_json(self.client.delete(url).send().await?).await
    }

    /// Start a hosted checkout for the current cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the cart is empty.
    pub async fn checkout(&self, request: &CheckoutRequest) -> Result<CheckoutStarted, ApiError> {
        let url = self.endpoint(&["api", "checkout"])?;
        read_json(self.client.post(url).json(request).send().await?).await
    }
}

#[async_trait]
impl StorefrontApi for HttpStorefrontApi {
    async fn verify_payment(
        &self,
        session_id: &PaymentSessionId,
    ) -> Result<PaymentVerification, ApiError> {
        let url = self.endpoint(&["api", "verify-payment", session_id.as_str()])?;
        read_json(self.client.get(url).send().await?).await
    }

    async fn order_by_session(
        &self,
        session_id: &PaymentSessionId,
    ) -> Result<Option<Order>, ApiError> {
        let url = self.endpoint(&["api", "orders", "by-session", session_id.as_str()])?;
        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        read_json(response).await.map(Some)
    }

    async fn clear_cart(&self) -> Result<(), ApiError> {
        let url = self.endpoint(&["api", "cart", "clear"])?;
        let _: CartView = read_json(self.client.post(url).send().await?).await?;
        Ok(())
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(1);
        return Err(ApiError::RateLimited(retry_after));
    }

    // Get response body as text first for better error diagnostics
    let body = response.text().await?;

    if !status.is_success() {
        let body = body.chars().take(200).collect::<String>();
        tracing::debug!(status = %status, body = %body, "Storefront returned non-success status");
        return Err(ApiError::Status {
            status: status.as_u16(),
            body,
        });
    }

    Ok(serde_json::from_str(&body)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_escapes_segments() {
        let api = HttpStorefrontApi::new("http://shop.test/base/").unwrap();
        let url = api
            .endpoint(&["api", "cart", "items", "tee:m/1"])
            .unwrap();
        assert_eq!(url.as_str(), "http://shop.test/base/api/cart/items/tee:m%2F1");
    }

    #[test]
    fn test_rejects_non_base_url() {
        assert!(matches!(
            HttpStorefrontApi::new("mailto:shop@example.com"),
            Err(ApiError::BaseUrl(_))
        ));
    }

    #[test]
    fn test_status_accessor() {
        let err = ApiError::Status {
            status: 502,
            body: String::new(),
        };
        assert_eq!(err.status(), Some(502));
        assert_eq!(ApiError::RateLimited(3).status(), Some(429));
    }
}
