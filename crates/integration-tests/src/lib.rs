//! End-to-end test harness for Tierline.
//!
//! [`TestApp::spawn`] serves the real storefront router on an ephemeral port
//! with in-memory stores, the sample catalog, a scripted payment processor
//! and a notifier that records what it was asked to send. Tests drive it over
//! HTTP with the same client the CLI uses.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p tierline-integration-tests
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{Json, Router, http::StatusCode, routing::post};
use serde::Deserialize;
use tower_sessions::{MemoryStore, Session};

use tierline_client::HttpStorefrontApi;
use tierline_core::order::{Address, CompletedCheckout, Order, ProcessorAmounts, ProcessorLineItem};
use tierline_core::{Email, Money, PaymentSessionId, PaymentStatus, UserId};
use tierline_storefront::build_app_with;
use tierline_storefront::catalog::StaticCatalog;
use tierline_storefront::db::{MemoryCartStore, MemoryOrderStore};
use tierline_storefront::middleware::{session_layer, sign_in_session};
use tierline_storefront::models::CurrentUser;
use tierline_storefront::payments::{
    CheckoutSession, CheckoutSessionRequest, GatewayError, PaymentGateway, SessionDetails,
    WebhookError, WebhookEvent, sign_payload, verify_signature,
};
use tierline_storefront::routes;
use tierline_storefront::services::{NotifyError, OrderNotifier};
use tierline_storefront::state::{AppState, StateParts};

/// Webhook signing secret shared by the fake processor and the tests.
pub const WEBHOOK_SECRET: &str = "whsec_test_integration_secret";

// =============================================================================
// Fake payment processor
// =============================================================================

/// Payment processor double.
///
/// Checkout sessions are recorded as they are created; [`Self::pay`] turns
/// one into a completed session the way the hosted page would. Webhooks are
/// authenticated with the production signature check.
#[derive(Default)]
pub struct FakeGateway {
    next_id: AtomicU32,
    created: Mutex<Vec<(PaymentSessionId, CheckoutSessionRequest)>>,
    sessions: Mutex<HashMap<PaymentSessionId, SessionDetails>>,
}

impl FakeGateway {
    /// Checkout sessions created so far.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned.
    #[allow(clippy::unwrap_used)]
    pub fn created(&self) -> Vec<(PaymentSessionId, CheckoutSessionRequest)> {
        self.created.lock().unwrap().clone()
    }

    /// Complete payment for a created session, collecting `shipping`.
    ///
    /// # Panics
    ///
    /// Panics if the session was never created.
    #[allow(clippy::unwrap_used)]
    pub fn pay(&self, session_id: &PaymentSessionId, shipping: Option<Address>) -> SessionDetails {
        let request = self
            .created
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| id == session_id)
            .map(|(_, request)| request.clone())
            .unwrap();

        let line_items: Vec<ProcessorLineItem> = request
            .lines
            .iter()
            .map(|line| ProcessorLineItem {
                description: line.name.clone(),
                quantity: line.quantity,
                unit_amount: line.unit_amount,
                amount_total: line.unit_amount * line.quantity,
            })
            .collect();
        let goods: Money = line_items.iter().map(|line| line.amount_total).sum();

        let details = SessionDetails {
            payment_status: PaymentStatus::Paid,
            checkout: CompletedCheckout {
                session_id: session_id.clone(),
                payment_intent_id: Some(format!("pi_{session_id}")),
                customer_email: Some(
                    request
                        .customer_email
                        .as_ref()
                        .map_or("buyer@example.com", Email::as_str)
                        .to_owned(),
                ),
                customer_name: Some("Test Buyer".to_owned()),
                collected_shipping: shipping,
                collected_billing: None,
                metadata: request.metadata.into_iter().collect(),
                line_items,
                amounts: ProcessorAmounts {
                    total: goods + request.shipping,
                    discount: Money::ZERO,
                    shipping: request.shipping,
                    tax: Money::ZERO,
                },
            },
        };
        self.sessions
            .lock()
            .unwrap()
            .insert(session_id.clone(), details.clone());
        details
    }
}

#[derive(Deserialize)]
struct EventEnvelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
}

#[derive(Deserialize)]
struct EventData {
    object: EventObject,
}

#[derive(Deserialize)]
struct EventObject {
    id: PaymentSessionId,
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = PaymentSessionId::new(format!("cs_test_{n}"));
        self.created
            .lock()
            .map_err(|_| GatewayError::RateLimited(1))?
            .push((id.clone(), request.clone()));
        Ok(CheckoutSession {
            url: format!("https://checkout.test/pay/{id}"),
            id,
        })
    }

    async fn retrieve_session(
        &self,
        session_id: &PaymentSessionId,
    ) -> Result<Option<SessionDetails>, GatewayError> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| GatewayError::RateLimited(1))?;
        if let Some(details) = sessions.get(session_id) {
            return Ok(Some(details.clone()));
        }
        drop(sessions);

        let created = self
            .created
            .lock()
            .map_err(|_| GatewayError::RateLimited(1))?;
        Ok(created.iter().find(|(id, _)| id == session_id).map(|_| {
            // Created but not paid yet.
            SessionDetails {
                payment_status: PaymentStatus::Unpaid,
                checkout: CompletedCheckout {
                    session_id: session_id.clone(),
                    payment_intent_id: None,
                    customer_email: None,
                    customer_name: None,
                    collected_shipping: None,
                    collected_billing: None,
                    metadata: HashMap::new(),
                    line_items: Vec::new(),
                    amounts: ProcessorAmounts::default(),
                },
            }
        }))
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookEvent, WebhookError> {
        let header = signature.ok_or(WebhookError::MissingSignature)?;
        verify_signature(WEBHOOK_SECRET, payload, header, chrono::Utc::now().timestamp())?;

        let envelope: EventEnvelope = serde_json::from_slice(payload)
            .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
        if envelope.event_type != "checkout.session.completed" {
            return Ok(WebhookEvent::Ignored {
                event_id: envelope.id,
                event_type: envelope.event_type,
            });
        }

        let session = self
            .sessions
            .lock()
            .map_err(|_| WebhookError::InvalidPayload("lock poisoned".to_owned()))?
            .get(&envelope.data.object.id)
            .cloned()
            .ok_or_else(|| WebhookError::InvalidPayload("unknown session".to_owned()))?;
        Ok(WebhookEvent::CheckoutCompleted {
            event_id: envelope.id,
            session: Box::new(session),
        })
    }
}

// =============================================================================
// Recording notifier
// =============================================================================

/// Remembers every confirmation it was asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Order>>,
}

impl RecordingNotifier {
    /// Orders confirmed so far.
    #[must_use]
    pub fn sent(&self) -> Vec<Order> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl OrderNotifier for RecordingNotifier {
    async fn order_confirmed(&self, order: &Order) -> Result<(), NotifyError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(order.clone());
        }
        Ok(())
    }
}

// =============================================================================
// Test application
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest {
    user_id: i32,
    #[serde(default)]
    email: Option<Email>,
}

/// Stand-in for the authentication provider: puts a user into the session.
async fn test_sign_in(session: Session, Json(req): Json<SignInRequest>) -> StatusCode {
    let user = CurrentUser {
        id: UserId::new(req.user_id),
        email: req.email,
    };
    match sign_in_session(&session, &user).await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// A storefront running in-process.
pub struct TestApp {
    pub base_url: String,
    pub carts: Arc<MemoryCartStore>,
    pub orders: Arc<MemoryOrderStore>,
    pub gateway: Arc<FakeGateway>,
    pub notifier: Arc<RecordingNotifier>,
    http: reqwest::Client,
}

impl TestApp {
    /// Start a storefront on an ephemeral port.
    ///
    /// # Panics
    ///
    /// Panics if the catalog fixture cannot be read or the port cannot be
    /// bound.
    #[allow(clippy::unwrap_used)]
    pub async fn spawn() -> Self {
        let catalog_path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../storefront/catalog.json");
        let catalog = StaticCatalog::load(&catalog_path).unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let carts = Arc::new(MemoryCartStore::new());
        let orders = Arc::new(MemoryOrderStore::new());
        let gateway = Arc::new(FakeGateway::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let state = AppState::new(StateParts {
            pool: None,
            carts: carts.clone(),
            orders: orders.clone(),
            catalog: Arc::new(catalog),
            gateway: gateway.clone(),
            notifier: notifier.clone(),
            shipping: tierline_core::cart::ShippingRule::default(),
            base_url: base_url.clone(),
        });

        let routes = routes::routes().merge(Router::new().route("/test/sign-in", post(test_sign_in)));
        let app = build_app_with(routes, state, session_layer(MemoryStore::default(), false));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            carts,
            orders,
            gateway,
            notifier,
            http: reqwest::Client::new(),
        }
    }

    /// A new shopper: an API client with its own cookie jar.
    ///
    /// # Panics
    ///
    /// Panics if the client cannot be built.
    #[allow(clippy::unwrap_used)]
    pub fn shopper(&self) -> Shopper {
        let http = reqwest::Client::builder().cookie_store(true).build().unwrap();
        Shopper {
            api: HttpStorefrontApi::with_client(http.clone(), &self.base_url).unwrap(),
            http,
            base_url: self.base_url.clone(),
        }
    }

    /// Deliver a webhook signed with `secret`.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be sent.
    #[allow(clippy::unwrap_used)]
    pub async fn deliver_webhook(&self, body: &str, secret: &str) -> reqwest::Response {
        let signature = sign_payload(secret, chrono::Utc::now().timestamp(), body.as_bytes()).unwrap();
        self.http
            .post(format!("{}/api/webhooks/stripe", self.base_url))
            .header("stripe-signature", signature)
            .header("content-type", "application/json")
            .body(body.to_owned())
            .send()
            .await
            .unwrap()
    }

    /// Wait until `done` holds, polling every 10 ms for up to 5 s.
    ///
    /// # Panics
    ///
    /// Panics if the condition never holds.
    pub async fn wait_until(&self, mut done: impl FnMut(&Self) -> bool) {
        for _ in 0..500 {
            if done(self) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within 5s");
    }
}

/// `checkout.session.completed` event body for `session_id`.
#[must_use]
pub fn completed_event(event_id: &str, session_id: &PaymentSessionId) -> String {
    serde_json::json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "data": { "object": { "id": session_id.as_str() } }
    })
    .to_string()
}

/// One browser session against a [`TestApp`].
pub struct Shopper {
    pub api: HttpStorefrontApi,
    http: reqwest::Client,
    base_url: String,
}

impl Shopper {
    /// Sign in through the test authentication route.
    ///
    /// # Panics
    ///
    /// Panics if the request fails.
    #[allow(clippy::unwrap_used)]
    pub async fn sign_in(&self, user_id: i32, email: Option<&str>) {
        let response = self
            .http
            .post(format!("{}/test/sign-in", self.base_url))
            .json(&serde_json::json!({ "userId": user_id, "email": email }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);
    }

    /// Sign out through the storefront.
    ///
    /// # Panics
    ///
    /// Panics if the request fails.
    #[allow(clippy::unwrap_used)]
    pub async fn sign_out(&self) -> serde_json::Value {
        self.http
            .post(format!("{}/api/session/sign-out", self.base_url))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    /// Raw request helper for status-code assertions.
    #[must_use]
    pub fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http.request(method, format!("{}{path}", self.base_url))
    }
}
