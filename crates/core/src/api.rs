//! JSON bodies exchanged between the storefront API and its clients.

use serde::{Deserialize, Serialize};

use crate::cart::{Cart, CartSummary, LineItem, ShippingRule};
use crate::order::Address;
use crate::types::{
    Money, PaymentSessionId, PaymentStatus, ProductId, Quantity, QuantityEdit, QuantityInput,
    VariantId,
};

/// A cart line as shown to a shopper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineView {
    /// `product` or `product:variant`; used in item URLs.
    pub id: String,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub name: String,
    pub variant_title: Option<String>,
    pub image_url: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
    pub list_price: Money,
    pub line_total: Money,
    pub savings: Money,
}

impl From<&LineItem> for CartLineView {
    fn from(line: &LineItem) -> Self {
        Self {
            id: line.key().to_string(),
            product_id: line.product_id.clone(),
            variant_id: line.variant_id.clone(),
            name: line.name.clone(),
            variant_title: line.variant_title.clone(),
            image_url: line.image_url.clone(),
            quantity: line.quantity.get(),
            unit_price: line.unit_price(),
            list_price: line.pricing.list_price(),
            line_total: line.line_total(),
            savings: line.savings(),
        }
    }
}

/// Response body of every cart endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub items: Vec<CartLineView>,
    pub summary: CartSummary,
}

impl CartView {
    #[must_use]
    pub fn new(cart: &Cart, shipping: &ShippingRule) -> Self {
        Self {
            items: cart.items().iter().map(CartLineView::from).collect(),
            summary: cart.summary_with(shipping),
        }
    }
}

/// `POST /api/cart/items`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub product_id: ProductId,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    #[serde(default = "one")]
    pub quantity: Quantity,
}

const fn one() -> Quantity {
    Quantity::ONE
}

/// `PATCH /api/cart/items/{itemId}`
///
/// `quantity` is the raw text of the quantity field; `commit` is set when
/// the field loses focus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemRequest {
    pub quantity: String,
    #[serde(default)]
    pub commit: bool,
}

impl UpdateItemRequest {
    /// The edit this request asks for.
    #[must_use]
    pub fn edit(&self) -> QuantityEdit {
        if self.commit {
            QuantityInput::on_commit(&self.quantity)
        } else {
            QuantityInput::on_change(&self.quantity)
        }
    }
}

/// `POST /api/checkout`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[serde(default)]
    pub shipping_address: Option<Address>,
    #[serde(default)]
    pub billing_address: Option<Address>,
}

/// Response of `POST /api/checkout`: where to send the shopper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutStarted {
    pub session_id: PaymentSessionId,
    pub url: String,
}

/// Response of `GET /api/verify-payment/{sessionId}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentVerification {
    pub paid: bool,
    pub payment_status: PaymentStatus,
}

impl From<PaymentStatus> for PaymentVerification {
    fn from(payment_status: PaymentStatus) -> Self {
        Self {
            paid: payment_status.is_settled(),
            payment_status,
        }
    }
}
