//! Post-payment order reconciliation.
//!
//! After the shopper returns from the hosted payment page the order does not
//! exist yet: it is written by the payment webhook, which races the browser.
//! [`Reconciler`] closes that gap:
//!
//! ```text
//! Verifying ──paid──▶ Fetching(1..=N) ──found──▶ Succeeded
//!     │                    │
//!     └──not paid──────────┴──exhausted / error / deadline──▶ Failed
//! ```
//!
//! Verification happens once. A missing order consumes an attempt, any
//! other lookup error ends the run. The policy deadline covers the whole run
//! and cancels whatever request is in flight. Each run reaches exactly one
//! terminal state.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;

use tierline_core::{PaymentSessionId, PaymentStatus};
use tierline_core::order::Order;

use crate::api::StorefrontApi;
use crate::retry::{RetryError, RetryPolicy};

/// Observable progress of a reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileState {
    Verifying,
    Fetching { attempt: u32 },
    Succeeded(Box<Order>),
    Failed(ReconcileFailure),
}

impl ReconcileState {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded(_) | Self::Failed(_))
    }
}

/// Why reconciliation failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileFailure {
    /// The processor does not consider the session paid.
    #[error("payment not completed (status: {status})")]
    NotPaid { status: PaymentStatus },

    /// The verification call itself failed.
    #[error("payment verification failed: {0}")]
    VerificationFailed(String),

    /// The order never appeared within the attempt budget.
    #[error("order not found after {attempts} attempts")]
    Exhausted { attempts: u32 },

    /// The overall deadline passed.
    #[error("reconciliation timed out after {0:?}")]
    TimedOut(Duration),

    /// The order lookup failed with something other than "not found".
    #[error("order lookup failed: {0}")]
    LookupFailed(String),
}

impl ReconcileFailure {
    /// Text to show the shopper.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::NotPaid { status } => match status {
                PaymentStatus::Unpaid => {
                    "Your payment has not been completed. You have not been charged.".to_string()
                }
                other => format!("Your payment could not be confirmed (status: {other})."),
            },
            Self::VerificationFailed(_) => {
                "We could not verify your payment. Please check your email for a receipt."
                    .to_string()
            }
            Self::Exhausted { .. } | Self::TimedOut(_) => {
                "Your payment went through, but your order is taking longer than usual to appear. \
                 You will receive a confirmation email shortly."
                    .to_string()
            }
            Self::LookupFailed(_) => {
                "Your payment went through, but we could not load your order. \
                 You will receive a confirmation email shortly."
                    .to_string()
            }
        }
    }
}

/// One reconciliation run for one checkout session.
pub struct Reconciler<A> {
    api: A,
    policy: RetryPolicy,
    state: watch::Sender<ReconcileState>,
}

impl<A: StorefrontApi> Reconciler<A> {
    #[must_use]
    pub fn new(api: A, policy: RetryPolicy) -> Self {
        let (state, _) = watch::channel(ReconcileState::Verifying);
        Self { api, policy, state }
    }

    /// Follow the run's state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ReconcileState> {
        self.state.subscribe()
    }

    /// Reconcile `session_id`, then clear the cart on success.
    ///
    /// # Errors
    ///
    /// Returns the terminal failure; the same value is published to
    /// subscribers.
    #[tracing::instrument(skip(self), fields(session_id = %session_id))]
    pub async fn run(self, session_id: &PaymentSessionId) -> Result<Order, ReconcileFailure> {
        let deadline = self.policy.deadline;
        let outcome = tokio::time::timeout(deadline, self.reconcile(session_id))
            .await
            .unwrap_or(Err(ReconcileFailure::TimedOut(deadline)));

        match &outcome {
            Ok(order) => {
                tracing::info!(order_id = %order.id, "Order reconciled");
                self.finish(ReconcileState::Succeeded(Box::new(order.clone())));
                if let Err(e) = self.api.clear_cart().await {
                    tracing::debug!(error = %e, "Cart clear after order failed");
                }
            }
            Err(failure) => {
                tracing::warn!(failure = %failure, "Order reconciliation failed");
                self.finish(ReconcileState::Failed(failure.clone()));
            }
        }

        outcome
    }

    async fn reconcile(&self, session_id: &PaymentSessionId) -> Result<Order, ReconcileFailure> {
        let verification = self
            .api
            .verify_payment(session_id)
            .await
            .map_err(|e| ReconcileFailure::VerificationFailed(e.to_string()))?;
        if !verification.paid {
            return Err(ReconcileFailure::NotPaid {
                status: verification.payment_status,
            });
        }

        let api = &self.api;
        let state = &self.state;
        self.policy
            .retry(move |attempt| {
                state.send_replace(ReconcileState::Fetching { attempt });
                api.order_by_session(session_id)
            })
            .await
            .map_err(|e| match e {
                RetryError::Exhausted { attempts } => ReconcileFailure::Exhausted { attempts },
                RetryError::Aborted { source, .. } => {
                    ReconcileFailure::LookupFailed(source.to_string())
                }
            })
    }

    /// Publish a terminal state unless one was already published.
    fn finish(&self, terminal: ReconcileState) {
        self.state.send_if_modified(|current| {
            if current.is_terminal() {
                return false;
            }
            *current = terminal;
            true
        });
    }
}
