//! Turning a completed checkout session into an order.

use std::collections::HashMap;

use super::address::{Address, AddressOrigin, billing_sources, resolve_address, shipping_sources};
use super::metadata::{CartSnapshotItem, CheckoutMetadata};
use super::{NewOrder, OrderItem, OrderTotals};
use crate::types::{Email, Money, PaymentSessionId};

/// A line as the payment processor reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorLineItem {
    pub description: String,
    pub quantity: u32,
    pub unit_amount: Money,
    pub amount_total: Money,
}

/// Session-level amounts as the payment processor reports them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorAmounts {
    pub total: Money,
    pub discount: Money,
    pub shipping: Money,
    pub tax: Money,
}

/// Processor-neutral view of a paid checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedCheckout {
    pub session_id: PaymentSessionId,
    pub payment_intent_id: Option<String>,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub collected_shipping: Option<Address>,
    pub collected_billing: Option<Address>,
    pub metadata: HashMap<String, String>,
    pub line_items: Vec<ProcessorLineItem>,
    pub amounts: ProcessorAmounts,
}

/// The order to insert plus what was learned while building it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedOrder {
    pub order: NewOrder,
    pub shipping_origin: AddressOrigin,
    pub billing_origin: AddressOrigin,
    /// Non-fatal problems (unreadable metadata, bad email). Callers log these.
    pub warnings: Vec<String>,
}

/// Build an order from a paid checkout session.
///
/// Never fails: every missing or malformed input has a fallback, so a paid
/// session always produces an order. Processor amounts are authoritative;
/// the cart snapshot only contributes catalog ids and images.
#[must_use]
pub fn derive_order(checkout: &CompletedCheckout) -> DerivedOrder {
    let decoded = CheckoutMetadata::decode(&checkout.metadata);
    let mut warnings = decoded.warnings;
    let metadata = decoded.metadata;

    let customer_email = checkout.customer_email.as_deref().and_then(|raw| {
        Email::parse(raw)
            .map_err(|e| warnings.push(format!("customer email {raw:?} rejected: {e}")))
            .ok()
    });

    let shipping = resolve_address(shipping_sources(
        checkout.collected_shipping.clone(),
        metadata.shipping_address,
    ));
    let billing = resolve_address(billing_sources(
        checkout.collected_billing.clone(),
        metadata.billing_address,
        &shipping.address,
    ));

    let items = if checkout.line_items.is_empty() {
        if !metadata.items.is_empty() {
            warnings.push("processor returned no line items; using cart snapshot".to_owned());
        }
        metadata.items.iter().map(snapshot_only).collect()
    } else {
        if metadata.items.len() != checkout.line_items.len() {
            warnings.push(format!(
                "cart snapshot has {} lines, processor has {}",
                metadata.items.len(),
                checkout.line_items.len()
            ));
        }
        checkout
            .line_items
            .iter()
            .enumerate()
            .map(|(index, line)| merge_line(line, metadata.items.get(index)))
            .collect()
    };

    let amounts = checkout.amounts;
    let totals = OrderTotals {
        subtotal: amounts.total - amounts.shipping - amounts.tax + amounts.discount,
        discount: amounts.discount,
        shipping: amounts.shipping,
        tax: amounts.tax,
        total: amounts.total,
    };

    DerivedOrder {
        order: NewOrder {
            payment_session_id: checkout.session_id.clone(),
            payment_intent_id: checkout.payment_intent_id.clone(),
            user_id: metadata.owner.as_ref().and_then(|owner| owner.user_id()),
            customer_email,
            customer_name: checkout.customer_name.clone(),
            items,
            shipping_address: shipping.address,
            billing_address: billing.address,
            totals,
            cart_owner: metadata.owner,
        },
        shipping_origin: shipping.origin,
        billing_origin: billing.origin,
        warnings,
    }
}

/// Processor line for amounts, snapshot line (same position) for identity.
fn merge_line(line: &ProcessorLineItem, snapshot: Option<&CartSnapshotItem>) -> OrderItem {
    OrderItem {
        product_id: snapshot.map(|s| s.product_id.clone()),
        variant_id: snapshot.and_then(|s| s.variant_id.clone()),
        name: snapshot.map_or_else(|| line.description.clone(), |s| s.name.clone()),
        variant_title: snapshot.and_then(|s| s.variant_title.clone()),
        image_url: snapshot.and_then(|s| s.image_url.clone()),
        quantity: line.quantity,
        unit_price: line.unit_amount,
        line_total: line.amount_total,
    }
}

fn snapshot_only(item: &CartSnapshotItem) -> OrderItem {
    OrderItem {
        product_id: Some(item.product_id.clone()),
        variant_id: item.variant_id.clone(),
        name: item.name.clone(),
        variant_title: item.variant_title.clone(),
        image_url: item.image_url.clone(),
        quantity: item.quantity,
        unit_price: item.unit_price,
        line_total: item.unit_price * item.quantity,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cart::CartIdentity;
    use crate::types::{GuestSessionId, ProductId, UserId, VariantId};

    fn address(line1: &str) -> Address {
        Address {
            name: Some("Sam Lee".to_owned()),
            line1: line1.to_owned(),
            line2: None,
            city: "Austin".to_owned(),
            state: Some("TX".to_owned()),
            postal_code: "73301".to_owned(),
            country: "US".to_owned(),
        }
    }

    fn snapshot() -> Vec<CartSnapshotItem> {
        vec![
            CartSnapshotItem {
                product_id: ProductId::new("mug"),
                variant_id: Some(VariantId::new("blue")),
                name: "Mug".to_owned(),
                variant_title: Some("Blue".to_owned()),
                image_url: Some("https://cdn.example.com/mug.jpg".to_owned()),
                quantity: 12,
                unit_price: Money::from_cents(800),
            },
            CartSnapshotItem {
                product_id: ProductId::new("tote"),
                variant_id: None,
                name: "Tote".to_owned(),
                variant_title: None,
                image_url: None,
                quantity: 1,
                unit_price: Money::from_cents(2500),
            },
        ]
    }

    fn checkout(owner: CartIdentity) -> CompletedCheckout {
        let metadata = CheckoutMetadata {
            items: snapshot(),
            owner: Some(owner),
            shipping_address: None,
            billing_address: None,
        };
        CompletedCheckout {
            session_id: PaymentSessionId::new("cs_test_abc"),
            payment_intent_id: Some("pi_123".to_owned()),
            customer_email: Some("Sam@Example.com".to_owned()),
            customer_name: Some("Sam Lee".to_owned()),
            collected_shipping: Some(address("500 Congress Ave")),
            collected_billing: None,
            metadata: metadata.encode().unwrap().into_iter().collect(),
            line_items: vec![
                ProcessorLineItem {
                    description: "Mug - Blue".to_owned(),
                    quantity: 12,
                    unit_amount: Money::from_cents(800),
                    amount_total: Money::from_cents(9600),
                },
                ProcessorLineItem {
                    description: "Tote".to_owned(),
                    quantity: 1,
                    unit_amount: Money::from_cents(2500),
                    amount_total: Money::from_cents(2500),
                },
            ],
            amounts: ProcessorAmounts {
                total: Money::from_cents(11_100),
                discount: Money::from_cents(1000),
                shipping: Money::ZERO,
                tax: Money::ZERO,
            },
        }
    }

    #[test]
    fn test_billing_defaults_to_collected_shipping() {
        let derived = derive_order(&checkout(CartIdentity::User(UserId::new(4))));
        assert_eq!(derived.shipping_origin, AddressOrigin::Collected);
        assert_eq!(derived.billing_origin, AddressOrigin::Copied);
        assert_eq!(derived.order.billing_address, derived.order.shipping_address);
        assert_eq!(derived.order.shipping_address.line1, "500 Congress Ave");
    }

    #[test]
    fn test_metadata_billing_beats_shipping_copy() {
        let mut input = checkout(CartIdentity::User(UserId::new(4)));
        input.metadata.insert(
            "billing_address".to_owned(),
            serde_json::to_string(&address("1 Billing Rd")).unwrap(),
        );
        let derived = derive_order(&input);
        assert_eq!(derived.billing_origin, AddressOrigin::Metadata);
        assert_eq!(derived.order.billing_address.line1, "1 Billing Rd");
    }

    #[test]
    fn test_items_take_amounts_from_processor_and_ids_from_snapshot() {
        let derived = derive_order(&checkout(CartIdentity::User(UserId::new(4))));
        let items = &derived.order.items;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].product_id, Some(ProductId::new("mug")));
        assert_eq!(items[0].image_url.as_deref(), Some("https://cdn.example.com/mug.jpg"));
        assert_eq!(items[0].line_total, Money::from_cents(9600));
        assert_eq!(items[1].name, "Tote");
        assert!(derived.warnings.is_empty());
    }

    #[test]
    fn test_subtotal_is_derived_from_processor_totals() {
        let derived = derive_order(&checkout(CartIdentity::User(UserId::new(4))));
        let totals = derived.order.totals;
        assert_eq!(totals.total, Money::from_cents(11_100));
        assert_eq!(totals.discount, Money::from_cents(1000));
        assert_eq!(totals.subtotal, Money::from_cents(12_100));
    }

    #[test]
    fn test_owner_and_email_are_carried() {
        let derived = derive_order(&checkout(CartIdentity::User(UserId::new(4))));
        assert_eq!(derived.order.user_id, Some(UserId::new(4)));
        assert_eq!(derived.order.customer_email.unwrap().as_str(), "sam@example.com");

        let guest = derive_order(&checkout(CartIdentity::Guest(GuestSessionId::new("g-9"))));
        assert_eq!(guest.order.user_id, None);
        assert_eq!(
            guest.order.cart_owner,
            Some(CartIdentity::Guest(GuestSessionId::new("g-9")))
        );
    }

    #[test]
    fn test_missing_snapshot_falls_back_to_descriptions() {
        let mut input = checkout(CartIdentity::User(UserId::new(4)));
        input.metadata.clear();
        let derived = derive_order(&input);
        assert_eq!(derived.order.items[0].name, "Mug - Blue");
        assert_eq!(derived.order.items[0].product_id, None);
        assert_eq!(derived.order.cart_owner, None);
        assert_eq!(derived.warnings.len(), 1);
    }

    #[test]
    fn test_nothing_collected_uses_placeholder() {
        let mut input = checkout(CartIdentity::User(UserId::new(4)));
        input.collected_shipping = None;
        let derived = derive_order(&input);
        assert_eq!(derived.shipping_origin, AddressOrigin::Placeholder);
        assert_eq!(derived.order.shipping_address, Address::placeholder());
        assert_eq!(derived.order.billing_address, Address::placeholder());
    }

    #[test]
    fn test_bad_email_is_dropped_with_warning() {
        let mut input = checkout(CartIdentity::User(UserId::new(4)));
        input.customer_email = Some("not-an-email".to_owned());
        let derived = derive_order(&input);
        assert!(derived.order.customer_email.is_none());
        assert_eq!(derived.warnings.len(), 1);
    }
}
