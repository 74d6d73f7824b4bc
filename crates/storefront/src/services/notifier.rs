//! Order confirmation notifications.
//!
//! Uses SMTP via lettre for delivery with Askama HTML templates. Delivery is
//! fire-and-forget from the order's point of view: a failure is reported to
//! the caller for logging and never affects the stored order.

use askama::Template;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use tierline_core::order::{Address, Order};

use crate::config::EmailConfig;

/// Errors that can occur when sending a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// Port for order notifications.
#[async_trait]
pub trait OrderNotifier: Send + Sync {
    /// Tell the customer their order was placed.
    async fn order_confirmed(&self, order: &Order) -> Result<(), NotifyError>;
}

struct EmailLine {
    name: String,
    variant_title: Option<String>,
    quantity: u32,
    unit_price: String,
    line_total: String,
}

/// Values shared by the HTML and text bodies, pre-formatted.
struct ConfirmationContext {
    order_number: String,
    greeting_name: String,
    lines: Vec<EmailLine>,
    subtotal: String,
    discount: Option<String>,
    shipping: String,
    tax: Option<String>,
    total: String,
    ship_to: Vec<String>,
}

impl ConfirmationContext {
    fn new(order: &Order) -> Self {
        let totals = order.totals;
        Self {
            order_number: order.id.to_string(),
            greeting_name: order
                .customer_name
                .clone()
                .unwrap_or_else(|| "there".to_owned()),
            lines: order
                .items
                .iter()
                .map(|item| EmailLine {
                    name: item.name.clone(),
                    variant_title: item.variant_title.clone(),
                    quantity: item.quantity,
                    unit_price: item.unit_price.display(),
                    line_total: item.line_total.display(),
                })
                .collect(),
            subtotal: totals.subtotal.display(),
            discount: totals.discount.is_positive().then(|| totals.discount.display()),
            shipping: if totals.shipping.is_positive() {
                totals.shipping.display()
            } else {
                "Free".to_owned()
            },
            tax: totals.tax.is_positive().then(|| totals.tax.display()),
            total: totals.total.display(),
            ship_to: address_lines(&order.shipping_address),
        }
    }
}

fn address_lines(address: &Address) -> Vec<String> {
    let mut lines = Vec::new();
    lines.extend(address.name.clone());
    lines.push(address.line1.clone());
    lines.extend(address.line2.clone());
    let region = address
        .state
        .as_ref()
        .map_or_else(String::new, |state| format!(", {state}"));
    lines.push(format!("{}{region} {}", address.city, address.postal_code));
    lines.push(address.country.clone());
    lines
}

/// HTML template for the order confirmation email.
#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
struct OrderConfirmationHtml<'a> {
    ctx: &'a ConfirmationContext,
}

/// Plain text template for the order confirmation email.
#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationText<'a> {
    ctx: &'a ConfirmationContext,
}

/// Sends order confirmations over SMTP.
#[derive(Clone)]
pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl EmailNotifier {
    /// Create a new email notifier from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(
        &self,
        to: &str,
        subject: &str,
        text_body: String,
        html_body: String,
    ) -> Result<(), NotifyError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| NotifyError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| NotifyError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            )?;

        self.mailer.send(email).await?;

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

#[async_trait]
impl OrderNotifier for EmailNotifier {
    async fn order_confirmed(&self, order: &Order) -> Result<(), NotifyError> {
        let Some(to) = &order.customer_email else {
            tracing::info!(order_id = %order.id, "Order has no customer email; skipping confirmation");
            return Ok(());
        };

        let ctx = ConfirmationContext::new(order);
        let html = OrderConfirmationHtml { ctx: &ctx }.render()?;
        let text = OrderConfirmationText { ctx: &ctx }.render()?;

        self.send_multipart_email(
            to.as_str(),
            &format!("Order #{} confirmed", ctx.order_number),
            text,
            html,
        )
        .await
    }
}

/// Logs confirmations instead of sending them. Used when SMTP is not
/// configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl OrderNotifier for LogNotifier {
    async fn order_confirmed(&self, order: &Order) -> Result<(), NotifyError> {
        tracing::info!(
            order_id = %order.id,
            email = ?order.customer_email.as_ref().map(tierline_core::Email::as_str),
            total = %order.totals.total,
            "Order confirmation (email disabled)"
        );
        Ok(())
    }
}
