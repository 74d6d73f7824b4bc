//! Cart totals.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::LineItem;
use crate::types::Money;

/// Flat-rate shipping with a free-shipping threshold.
///
/// Shipping is free only when the subtotal is strictly above the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingRule {
    pub free_above: Money,
    pub flat_fee: Money,
}

impl Default for ShippingRule {
    fn default() -> Self {
        Self {
            free_above: Money::new(Decimal::ONE_HUNDRED),
            flat_fee: Money::new(Decimal::from(15)),
        }
    }
}

impl ShippingRule {
    /// Shipping charged for a given subtotal.
    #[must_use]
    pub fn charge_for(&self, subtotal: Money) -> Money {
        if subtotal > self.free_above {
            Money::ZERO
        } else {
            self.flat_fee
        }
    }
}

/// Derived cart totals.
///
/// `total == subtotal - discount + shipping` always holds; every field is
/// unrounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSummary {
    /// Sum of line totals at resolved unit prices.
    pub subtotal: Money,
    /// Sum of per-line savings against list price.
    pub discount: Money,
    pub shipping: Money,
    pub total: Money,
    /// Total units across all lines.
    pub item_count: u32,
}

impl CartSummary {
    pub(crate) fn compute(items: &[LineItem], shipping_rule: &ShippingRule) -> Self {
        let subtotal: Money = items.iter().map(LineItem::line_total).sum();
        let discount: Money = items.iter().map(LineItem::savings).sum();
        let shipping = shipping_rule.charge_for(subtotal);
        let item_count = items
            .iter()
            .fold(0u32, |acc, item| acc.saturating_add(item.quantity.get()));

        Self {
            subtotal,
            discount,
            shipping,
            total: subtotal - discount + shipping,
            item_count,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::cart::Cart;
    use crate::pricing::{PriceSchedule, PriceTier, QuantityOption};
    use crate::types::{ProductId, Quantity};

    fn flat_line(product: &str, cents: i64, quantity: u32) -> LineItem {
        LineItem {
            product_id: ProductId::new(product),
            variant_id: None,
            name: product.to_owned(),
            variant_title: None,
            image_url: None,
            quantity: Quantity::new(quantity).unwrap(),
            pricing: PriceSchedule::flat(Money::from_cents(cents)),
        }
    }

    #[test]
    fn test_shipping_boundary_is_exclusive() {
        let at_threshold = Cart::from_items(vec![flat_line("a", 10_000, 1)]);
        assert_eq!(at_threshold.summary().subtotal, Money::from_cents(10_000));
        assert_eq!(at_threshold.summary().shipping, Money::from_cents(1500));

        let just_above = Cart::from_items(vec![flat_line("a", 10_001, 1)]);
        assert_eq!(just_above.summary().shipping, Money::ZERO);
    }

    #[test]
    fn test_empty_cart_pays_flat_shipping() {
        let summary = Cart::new().summary();
        assert_eq!(summary.subtotal, Money::ZERO);
        assert_eq!(summary.shipping, Money::from_cents(1500));
        assert_eq!(summary.item_count, 0);
    }

    #[test]
    fn test_discount_is_savings_against_list_price() {
        let mut line = flat_line("a", 1000, 10);
        line.pricing.tiers.push(PriceTier {
            min_quantity: 10,
            max_quantity: None,
            price_per_unit: Money::from_cents(800),
            label: "Bulk".to_owned(),
        });
        let summary = Cart::from_items(vec![line]).summary();
        assert_eq!(summary.subtotal, Money::from_cents(8000));
        assert_eq!(summary.discount, Money::from_cents(2000));
        assert_eq!(summary.shipping, Money::from_cents(1500));
        assert_eq!(summary.total, Money::from_cents(8000 - 2000 + 1500));
        assert_eq!(summary.item_count, 10);
    }

    fn arb_line() -> impl Strategy<Value = LineItem> {
        (
            "[a-e]",
            1i64..50_000,
            0i64..2_000,
            1u32..200,
            proptest::option::of((1u32..50, 1i64..50_000)),
            proptest::option::of((2u32..100, 1i64..50_000)),
        )
            .prop_map(|(product, base, adjustment, quantity, tier, pack)| {
                let mut pricing = PriceSchedule {
                    base_price: Money::from_cents(base),
                    variant_adjustment: Money::from_cents(adjustment),
                    tiers: Vec::new(),
                    quantity_options: Vec::new(),
                };
                if let Some((min, cents)) = tier {
                    pricing.tiers.push(PriceTier {
                        min_quantity: min,
                        max_quantity: None,
                        price_per_unit: Money::from_cents(cents),
                        label: String::new(),
                    });
                }
                if let Some((size, cents)) = pack {
                    pricing.quantity_options.push(QuantityOption {
                        quantity: size,
                        price_per_unit: Money::from_cents(cents),
                        label: String::new(),
                        is_active: true,
                    });
                }
                LineItem {
                    product_id: ProductId::new(product),
                    variant_id: None,
                    name: String::new(),
                    variant_title: None,
                    image_url: None,
                    quantity: Quantity::new(quantity).unwrap(),
                    pricing,
                }
            })
    }

    proptest! {
        #[test]
        fn prop_total_is_subtotal_minus_discount_plus_shipping(
            lines in proptest::collection::vec(arb_line(), 0..8)
        ) {
            let summary = Cart::from_items(lines).summary();
            prop_assert_eq!(summary.total, summary.subtotal - summary.discount + summary.shipping);
            prop_assert!(summary.discount >= Money::ZERO);
        }

        #[test]
        fn prop_subtotal_is_sum_of_line_totals(
            lines in proptest::collection::vec(arb_line(), 0..8)
        ) {
            let cart = Cart::from_items(lines);
            let expected: Money = cart.items().iter().map(LineItem::line_total).sum();
            prop_assert_eq!(cart.summary().subtotal, expected);
        }
    }
}
