//! Status enums for orders and payments.

use serde::{Deserialize, Serialize};

/// Order fulfillment status.
///
/// ```text
/// processing -> shipped -> delivered
///      \            \
///       `-----------`--> cancelled
/// ```
///
/// Back-office actions move an order forward; nothing moves it backwards, and
/// `delivered`/`cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Whether a back-office action may move an order from `self` to `next`.
    ///
    /// Re-applying the current status is allowed so tracking numbers and notes
    /// can be edited without changing state.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Processing, Self::Processing | Self::Shipped | Self::Cancelled)
                | (Self::Shipped, Self::Shipped | Self::Delivered | Self::Cancelled)
                | (Self::Delivered, Self::Delivered)
                | (Self::Cancelled, Self::Cancelled)
        )
    }

    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Processing => write!(f, "processing"),
            Self::Shipped => write!(f, "shipped"),
            Self::Delivered => write!(f, "delivered"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(Self::Processing),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("invalid order status: {s}")),
        }
    }
}

/// Payment status of a checkout session, as reported by the processor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
    /// Any status string this build does not know about.
    #[serde(untagged)]
    Other(String),
}

impl PaymentStatus {
    /// Only `paid` counts as a completed payment.
    #[must_use]
    pub const fn is_paid(&self) -> bool {
        matches!(self, Self::Paid)
    }

    /// Paid, or nothing was owed (e.g. a fully discounted order).
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        matches!(self, Self::Paid | Self::NoPaymentRequired)
    }

    /// The processor's wire name for this status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Paid => "paid",
            Self::Unpaid => "unpaid",
            Self::NoPaymentRequired => "no_payment_required",
            Self::Other(s) => s,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
