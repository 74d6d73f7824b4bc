//! Stripe Checkout.
//!
//! Sessions are created with ad-hoc `price_data` per cart line, so the
//! processor never needs to know the catalog. Amounts cross this boundary in
//! minor units (cents).
//!
//! Webhooks carry `Stripe-Signature: t=<unix>,v1=<hex>` where the signature
//! is HMAC-SHA256 over `"{t}.{body}"` keyed by the endpoint secret.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use sha2::Sha256;

use tierline_core::order::{Address, CompletedCheckout, ProcessorAmounts, ProcessorLineItem};
use tierline_core::{Money, PaymentSessionId, PaymentStatus};

use super::{
    CheckoutSession, CheckoutSessionRequest, GatewayError, PaymentGateway, SessionDetails,
    WebhookError, WebhookEvent,
};
use crate::config::StripeConfig;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a webhook timestamp, in seconds.
const TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// Allowed clock skew for timestamps from the future, in seconds.
const FUTURE_SKEW_SECS: i64 = 60;

/// Countries the hosted page collects shipping addresses for.
const SHIPPING_COUNTRIES: &[&str] = &["US", "CA"];

/// Precision Stripe accepts for `unit_amount_decimal`.
const UNIT_AMOUNT_DECIMAL_PLACES: u32 = 12;

const COMPLETED_EVENTS: &[&str] = &[
    "checkout.session.completed",
    "checkout.session.async_payment_succeeded",
];

/// Stripe implementation of [`PaymentGateway`].
#[derive(Clone)]
pub struct StripeGateway {
    inner: Arc<StripeGatewayInner>,
}

struct StripeGatewayInner {
    client: reqwest::Client,
    api_base: String,
    secret_key: SecretString,
    webhook_secret: SecretString,
    currency: String,
}

impl StripeGateway {
    #[must_use]
    pub fn new(config: &StripeConfig) -> Self {
        Self {
            inner: Arc::new(StripeGatewayInner {
                client: reqwest::Client::new(),
                api_base: config.api_base.trim_end_matches('/').to_owned(),
                secret_key: config.secret_key.clone(),
                webhook_secret: config.webhook_secret.clone(),
                currency: config.currency.clone(),
            }),
        }
    }

    /// GET a JSON resource. `None` on 404.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>, GatewayError> {
        let response = self
            .inner
            .client
            .get(format!("{}{path}", self.inner.api_base))
            .basic_auth(self.inner.secret_key.expose_secret(), None::<&str>)
            .query(query)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        read_json(response).await.map(Some)
    }
}

/// Check the status, then parse the body.
async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, GatewayError> {
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(1);
        return Err(GatewayError::RateLimited(retry_after));
    }

    let body = response.text().await?;

    if !status.is_success() {
        tracing::error!(
            status = %status,
            body = %body.chars().take(500).collect::<String>(),
            "Stripe API returned non-success status"
        );
        let message = serde_json::from_str::<StripeErrorBody>(&body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| body.chars().take(200).collect());
        return Err(GatewayError::Api {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(&body).map_err(|e| {
        tracing::error!(
            error = %e,
            body = %body.chars().take(500).collect::<String>(),
            "Failed to parse Stripe response"
        );
        GatewayError::Parse(e)
    })
}

/// Per-unit price in minor units. Prices below a cent go out as
/// `unit_amount_decimal` so the processor's line total matches the cart.
fn unit_amount_field(price: Money) -> Result<(&'static str, String), GatewayError> {
    let cents = price.amount() * Decimal::ONE_HUNDRED;
    if cents.fract().is_zero() {
        return Ok(("unit_amount", price.to_cents()?.to_string()));
    }
    Ok((
        "unit_amount_decimal",
        cents.round_dp(UNIT_AMOUNT_DECIMAL_PLACES).normalize().to_string(),
    ))
}

/// Stripe ids are `[A-Za-z0-9_]`; anything else cannot name a session.
fn is_session_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[tracing::instrument(skip(self, request), fields(lines = request.lines.len()))]
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let form = checkout_form(request, &self.inner.currency)?;

        let response = self
            .inner
            .client
            .post(format!("{}/v1/checkout/sessions", self.inner.api_base))
            .basic_auth(self.inner.secret_key.expose_secret(), None::<&str>)
            .form(&form)
            .send()
            .await?;

        let session: CreatedSession = read_json(response).await?;
        tracing::info!(session_id = %session.id, "Created checkout session");

        Ok(CheckoutSession {
            id: PaymentSessionId::new(session.id),
            url: session.url,
        })
    }

    #[tracing::instrument(skip(self), fields(session_id = %session_id))]
    async fn retrieve_session(
        &self,
        session_id: &PaymentSessionId,
    ) -> Result<Option<SessionDetails>, GatewayError> {
        if !is_session_id(session_id.as_str()) {
            return Ok(None);
        }

        let path = format!("/v1/checkout/sessions/{session_id}");
        let Some(session) = self.get_json::<StripeCheckoutSession>(&path, &[]).await? else {
            return Ok(None);
        };

        let line_items = self
            .get_json::<StripeList<StripeLineItem>>(
                &format!("{path}/line_items"),
                &[("limit", "100")],
            )
            .await?
            .map(|list| list.data)
            .unwrap_or_default();

        Ok(Some(session.into_details(line_items)))
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookEvent, WebhookError> {
        let header = signature.ok_or(WebhookError::MissingSignature)?;
        verify_signature(
            self.inner.webhook_secret.expose_secret(),
            payload,
            header,
            Utc::now().timestamp(),
        )?;
        parse_event(payload)
    }
}

/// Build the form body for `POST /v1/checkout/sessions`.
fn checkout_form(
    request: &CheckoutSessionRequest,
    currency: &str,
) -> Result<Vec<(String, String)>, GatewayError> {
    let mut form: Vec<(String, String)> = vec![
        ("mode".into(), "payment".into()),
        ("success_url".into(), request.success_url.clone()),
        ("cancel_url".into(), request.cancel_url.clone()),
        ("allow_promotion_codes".into(), "true".into()),
        ("billing_address_collection".into(), "required".into()),
    ];

    for (i, country) in SHIPPING_COUNTRIES.iter().enumerate() {
        form.push((
            format!("shipping_address_collection[allowed_countries][{i}]"),
            (*country).to_owned(),
        ));
    }

    for (i, line) in request.lines.iter().enumerate() {
        let prefix = format!("line_items[{i}]");
        form.push((format!("{prefix}[quantity]"), line.quantity.to_string()));
        form.push((format!("{prefix}[price_data][currency]"), currency.to_owned()));
        let (field, amount) = unit_amount_field(line.unit_amount)?;
        form.push((format!("{prefix}[price_data][{field}]"), amount));
        form.push((format!("{prefix}[price_data][product_data][name]"), line.name.clone()));
        if let Some(description) = &line.description {
            form.push((
                format!("{prefix}[price_data][product_data][description]"),
                description.clone(),
            ));
        }
        if let Some(image) = line.image_url.as_ref().filter(|u| u.starts_with("https://")) {
            form.push((
                format!("{prefix}[price_data][product_data][images][0]"),
                image.clone(),
            ));
        }
    }

    let rate = "shipping_options[0][shipping_rate_data]";
    form.push((format!("{rate}[type]"), "fixed_amount".into()));
    form.push((
        format!("{rate}[fixed_amount][amount]"),
        request.shipping.to_cents()?.to_string(),
    ));
    form.push((format!("{rate}[fixed_amount][currency]"), currency.to_owned()));
    let label = if request.shipping.is_positive() {
        "Standard shipping"
    } else {
        "Free shipping"
    };
    form.push((format!("{rate}[display_name]"), label.into()));

    if let Some(email) = &request.customer_email {
        form.push(("customer_email".into(), email.to_string()));
    }

    for (key, value) in &request.metadata {
        form.push((format!("metadata[{key}]"), value.clone()));
    }

    Ok(form)
}

/// Verify a `Stripe-Signature` header against the raw request body.
///
/// `now` is the current unix time. Any `v1` entry may match, which allows
/// for secret rotation.
///
/// # Errors
///
/// Returns a [`WebhookError`] describing why the delivery is not authentic.
pub fn verify_signature(
    secret: &str,
    payload: &[u8],
    header: &str,
    now: i64,
) -> Result<(), WebhookError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        if let Some(t) = part.trim().strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(s) = part.trim().strip_prefix("v1=") {
            signatures.push(s);
        }
    }

    let timestamp_str = timestamp.ok_or(WebhookError::MalformedSignature)?;
    if signatures.is_empty() {
        return Err(WebhookError::MalformedSignature);
    }
    let timestamp: i64 = timestamp_str
        .parse()
        .map_err(|_| WebhookError::MalformedSignature)?;

    let age_secs = now - timestamp;
    if age_secs > TIMESTAMP_TOLERANCE_SECS || age_secs < -FUTURE_SKEW_SECS {
        tracing::warn!(age_secs, "Stripe webhook rejected: timestamp outside tolerance");
        return Err(WebhookError::StaleTimestamp { age_secs });
    }

    let mac = keyed_mac(secret, timestamp_str, payload)
        .map_err(|_| WebhookError::SignatureMismatch)?;

    // verify_slice compares in constant time
    let matched = signatures.iter().any(|s| {
        hex::decode(s).is_ok_and(|bytes| mac.clone().verify_slice(&bytes).is_ok())
    });

    if matched {
        Ok(())
    } else {
        Err(WebhookError::SignatureMismatch)
    }
}

/// Produce a `Stripe-Signature` header value for `payload`.
///
/// # Errors
///
/// Returns an error if the secret cannot key an HMAC.
pub fn sign_payload(
    secret: &str,
    timestamp: i64,
    payload: &[u8],
) -> Result<String, hmac::digest::InvalidLength> {
    let signature = compute_signature(secret, &timestamp.to_string(), payload)?;
    Ok(format!("t={timestamp},v1={signature}"))
}

fn keyed_mac(
    secret: &str,
    timestamp: &str,
    payload: &[u8],
) -> Result<HmacSha256, hmac::digest::InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

fn compute_signature(
    secret: &str,
    timestamp: &str,
    payload: &[u8],
) -> Result<String, hmac::digest::InvalidLength> {
    let mac = keyed_mac(secret, timestamp, payload)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn parse_event(payload: &[u8]) -> Result<WebhookEvent, WebhookError> {
    let event: StripeEvent = serde_json::from_slice(payload)
        .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;

    if !COMPLETED_EVENTS.contains(&event.event_type.as_str()) {
        return Ok(WebhookEvent::Ignored {
            event_id: event.id,
            event_type: event.event_type,
        });
    }

    let session: StripeCheckoutSession = serde_json::from_value(event.data.object)
        .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;

    Ok(WebhookEvent::CheckoutCompleted {
        event_id: event.id,
        session: Box::new(session.into_details(Vec::new())),
    })
}

// ============ Wire types ============

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
struct CreatedSession {
    id: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct StripeEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct StripeList<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct StripeCheckoutSession {
    id: String,
    payment_status: PaymentStatus,
    #[serde(default)]
    payment_intent: Option<String>,
    #[serde(default)]
    customer_email: Option<String>,
    #[serde(default)]
    customer_details: Option<StripeCustomerDetails>,
    /// Older API versions.
    #[serde(default)]
    shipping_details: Option<StripeShippingDetails>,
    #[serde(default)]
    collected_information: Option<StripeCollectedInformation>,
    #[serde(default)]
    amount_total: Option<i64>,
    #[serde(default)]
    total_details: Option<StripeTotalDetails>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct StripeCustomerDetails {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    address: Option<StripeAddress>,
}

#[derive(Debug, Deserialize)]
struct StripeCollectedInformation {
    #[serde(default)]
    shipping_details: Option<StripeShippingDetails>,
}

#[derive(Debug, Deserialize)]
struct StripeShippingDetails {
    #[serde(default)]
    name: Option<String>,
    address: StripeAddress,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StripeAddress {
    line1: Option<String>,
    line2: Option<String>,
    city: Option<String>,
    state: Option<String>,
    postal_code: Option<String>,
    country: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StripeTotalDetails {
    amount_discount: i64,
    amount_shipping: i64,
    amount_tax: i64,
}

#[derive(Debug, Deserialize)]
struct StripeLineItem {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    quantity: Option<u32>,
    amount_total: i64,
    #[serde(default)]
    price: Option<StripePrice>,
}

#[derive(Debug, Deserialize)]
struct StripePrice {
    #[serde(default)]
    unit_amount: Option<i64>,
}

impl StripeAddress {
    /// Missing required parts become empty strings; the address resolver
    /// treats such an address as absent.
    fn into_address(self, name: Option<String>) -> Address {
        Address {
            name,
            line1: self.line1.unwrap_or_default(),
            line2: self.line2.filter(|l| !l.is_empty()),
            city: self.city.unwrap_or_default(),
            state: self.state.filter(|s| !s.is_empty()),
            postal_code: self.postal_code.unwrap_or_default(),
            country: self.country.unwrap_or_default(),
        }
    }
}

impl StripeLineItem {
    fn into_processor_line(self) -> ProcessorLineItem {
        let quantity = self.quantity.unwrap_or(1).max(1);
        let unit_cents = self
            .price
            .and_then(|p| p.unit_amount)
            .unwrap_or_else(|| self.amount_total / i64::from(quantity));
        ProcessorLineItem {
            description: self.description.unwrap_or_default(),
            quantity,
            unit_amount: Money::from_cents(unit_cents),
            amount_total: Money::from_cents(self.amount_total),
        }
    }
}

impl StripeCheckoutSession {
    fn into_details(self, line_items: Vec<StripeLineItem>) -> SessionDetails {
        let totals = self.total_details.unwrap_or_default();
        let shipping = self
            .collected_information
            .and_then(|c| c.shipping_details)
            .or(self.shipping_details)
            .map(|s| s.address.into_address(s.name));

        let (customer_email, customer_name, billing) = match self.customer_details {
            Some(details) => {
                let billing = details
                    .address
                    .map(|a| a.into_address(details.name.clone()));
                (details.email, details.name, billing)
            }
            None => (None, None, None),
        };

        SessionDetails {
            payment_status: self.payment_status,
            checkout: CompletedCheckout {
                session_id: PaymentSessionId::new(self.id),
                payment_intent_id: self.payment_intent,
                customer_email: customer_email.or(self.customer_email),
                customer_name,
                collected_shipping: shipping,
                collected_billing: billing,
                metadata: self.metadata,
                line_items: line_items
                    .into_iter()
                    .map(StripeLineItem::into_processor_line)
                    .collect(),
                amounts: ProcessorAmounts {
                    total: Money::from_cents(self.amount_total.unwrap_or(0)),
                    discount: Money::from_cents(totals.amount_discount),
                    shipping: Money::from_cents(totals.amount_shipping),
                    tax: Money::from_cents(totals.amount_tax),
                },
            },
        }
    }
}
