//! Payment processor integration.
//!
//! The storefront talks to the processor through [`PaymentGateway`]:
//! create a hosted checkout session, read a session back, and authenticate
//! webhook deliveries. [`StripeGateway`] is the production implementation.

mod stripe;

use async_trait::async_trait;
use thiserror::Error;

use tierline_core::order::CompletedCheckout;
use tierline_core::{Email, Money, MoneyError, PaymentSessionId, PaymentStatus};

pub use stripe::{StripeGateway, sign_payload, verify_signature};

/// Errors from processor API calls.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The processor answered with a non-success status.
    #[error("processor returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Rate limited by the processor.
    #[error("rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Response body did not match the expected shape.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// An amount could not be expressed in minor units.
    #[error("invalid amount: {0}")]
    Amount(#[from] MoneyError),
}

/// Reasons a webhook delivery is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("missing signature header")]
    MissingSignature,

    #[error("malformed signature header")]
    MalformedSignature,

    #[error("timestamp outside tolerance (age {age_secs}s)")]
    StaleTimestamp { age_secs: i64 },

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("invalid event payload: {0}")]
    InvalidPayload(String),
}

/// One line of a checkout session request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutLine {
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub unit_amount: Money,
    pub quantity: u32,
}

/// Everything needed to open a hosted checkout page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionRequest {
    pub lines: Vec<CheckoutLine>,
    /// Flat shipping charge; zero renders as free shipping.
    pub shipping: Money,
    pub customer_email: Option<Email>,
    pub metadata: Vec<(String, String)>,
    pub success_url: String,
    pub cancel_url: String,
}

/// A created checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: PaymentSessionId,
    pub url: String,
}

/// A session read back from the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDetails {
    pub payment_status: PaymentStatus,
    pub checkout: CompletedCheckout,
}

/// An authenticated webhook event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    /// Payment for a checkout session finished (synchronously or after a
    /// delayed payment method settled). Line items are not included in the
    /// event itself.
    CheckoutCompleted {
        event_id: String,
        session: Box<SessionDetails>,
    },
    /// Any event type the storefront does not act on.
    Ignored { event_id: String, event_type: String },
}

/// Port for the payment processor.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a hosted checkout session.
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError>;

    /// Read a session with its line items. `None` if the processor does not
    /// know the id.
    async fn retrieve_session(
        &self,
        session_id: &PaymentSessionId,
    ) -> Result<Option<SessionDetails>, GatewayError>;

    /// Authenticate and parse a webhook delivery.
    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookEvent, WebhookError>;
}
