//! Unit-price resolution.
//!
//! A variant is priced in one of three ways, highest priority first:
//!
//! 1. a discrete pack size ([`QuantityOption`]) whose per-unit price applies
//!    to the whole line,
//! 2. a continuous quantity tier ([`PriceTier`]),
//! 3. the base price plus the variant's adjustment.
//!
//! [`PriceSchedule`] bundles the catalog data for one variant so a cart line
//! can be re-priced at any quantity without going back to the catalog.

use serde::{Deserialize, Serialize};

use crate::types::{Money, Quantity};

/// A quantity range with a flat per-unit price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceTier {
    pub min_quantity: u32,
    /// `None` means the tier has no upper bound.
    #[serde(default)]
    pub max_quantity: Option<u32>,
    pub price_per_unit: Money,
    #[serde(default)]
    pub label: String,
}

impl PriceTier {
    /// Whether `quantity` falls inside this tier's inclusive range.
    #[must_use]
    pub fn contains(&self, quantity: Quantity) -> bool {
        let q = quantity.get();
        q >= self.min_quantity && self.max_quantity.is_none_or(|max| q <= max)
    }
}

/// A discrete purchasable pack size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantityOption {
    pub quantity: u32,
    pub price_per_unit: Money,
    #[serde(default)]
    pub label: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

const fn default_active() -> bool {
    true
}

/// Resolve the per-unit price for a line.
///
/// - A positive `quantity_option_price` wins unconditionally.
/// - Otherwise the first tier (in table order) containing `quantity` wins;
///   overlapping tables therefore resolve to the earliest entry.
/// - Otherwise `base_price + variant_adjustment`.
///
/// Nothing is rounded here.
#[must_use]
pub fn resolve_unit_price(
    quantity: Quantity,
    base_price: Money,
    variant_adjustment: Money,
    tiers: &[PriceTier],
    quantity_option_price: Option<Money>,
) -> Money {
    if let Some(price) = quantity_option_price.filter(|p| p.is_positive()) {
        return price;
    }

    tiers
        .iter()
        .find(|tier| tier.contains(quantity))
        .map_or(base_price + variant_adjustment, |tier| tier.price_per_unit)
}

/// Pick the largest active pack size that fits inside `requested`.
///
/// This is a greedy floor match: 75 units against packs of 10/50/100 matches
/// the 50-pack. Finding the cheapest combination of packs is not attempted.
/// Returns `None` when the request is smaller than every active pack.
#[must_use]
pub fn match_best_option(requested: u32, options: &[QuantityOption]) -> Option<&QuantityOption> {
    let mut active: Vec<&QuantityOption> = options.iter().filter(|o| o.is_active).collect();
    active.sort_by(|a, b| b.quantity.cmp(&a.quantity));
    active.into_iter().find(|o| o.quantity <= requested)
}

/// Catalog pricing for a single variant, snapshotted onto cart lines.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSchedule {
    pub base_price: Money,
    #[serde(default)]
    pub variant_adjustment: Money,
    #[serde(default)]
    pub tiers: Vec<PriceTier>,
    #[serde(default)]
    pub quantity_options: Vec<QuantityOption>,
}

impl PriceSchedule {
    /// A schedule with only a base price.
    #[must_use]
    pub const fn flat(base_price: Money) -> Self {
        Self {
            base_price,
            variant_adjustment: Money::ZERO,
            tiers: Vec::new(),
            quantity_options: Vec::new(),
        }
    }

    /// Price before any tier or pack discount.
    #[must_use]
    pub fn list_price(&self) -> Money {
        self.base_price + self.variant_adjustment
    }

    /// Resolve the unit price at `quantity`, consulting pack sizes first.
    #[must_use]
    pub fn unit_price(&self, quantity: Quantity) -> Money {
        let pack_price = match_best_option(quantity.get(), &self.quantity_options)
            .map(|option| option.price_per_unit);
        resolve_unit_price(
            quantity,
            self.base_price,
            self.variant_adjustment,
            &self.tiers,
            pack_price,
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn qty(n: u32) -> Quantity {
        Quantity::new(n).unwrap()
    }

    fn tier(min: u32, max: Option<u32>, cents: i64) -> PriceTier {
        PriceTier {
            min_quantity: min,
            max_quantity: max,
            price_per_unit: Money::from_cents(cents),
            label: format!("{min}+"),
        }
    }

    fn option(quantity: u32, cents: i64, active: bool) -> QuantityOption {
        QuantityOption {
            quantity,
            price_per_unit: Money::from_cents(cents),
            label: format!("{quantity}-pack"),
            is_active: active,
        }
    }

    fn tiers() -> Vec<PriceTier> {
        vec![
            tier(1, Some(9), 1000),
            tier(10, Some(49), 800),
            tier(50, None, 600),
        ]
    }

    #[test]
    fn test_tier_price_is_step_function() {
        let table = tiers();
        let base = Money::from_cents(1200);
        for q in 10..=49 {
            assert_eq!(
                resolve_unit_price(qty(q), base, Money::ZERO, &table, None),
                Money::from_cents(800),
                "quantity {q}"
            );
        }
        assert_eq!(
            resolve_unit_price(qty(9), base, Money::ZERO, &table, None),
            Money::from_cents(1000)
        );
        assert_eq!(
            resolve_unit_price(qty(5000), base, Money::ZERO, &table, None),
            Money::from_cents(600)
        );
    }

    #[test]
    fn test_overlapping_tiers_pick_first_in_table_order() {
        let ambiguous = vec![tier(1, Some(20), 900), tier(10, None, 500)];
        let price = resolve_unit_price(
            qty(15),
            Money::from_cents(1000),
            Money::ZERO,
            &ambiguous,
            None,
        );
        assert_eq!(price, Money::from_cents(900));

        let reversed = vec![tier(10, None, 500), tier(1, Some(20), 900)];
        let price = resolve_unit_price(
            qty(15),
            Money::from_cents(1000),
            Money::ZERO,
            &reversed,
            None,
        );
        assert_eq!(price, Money::from_cents(500));
    }

    #[test]
    fn test_no_matching_tier_falls_back_to_base_plus_adjustment() {
        let gap = vec![tier(10, Some(20), 500)];
        let price = resolve_unit_price(
            qty(3),
            Money::from_cents(1000),
            Money::from_cents(250),
            &gap,
            None,
        );
        assert_eq!(price, Money::from_cents(1250));
    }

    #[test]
    fn test_empty_tiers_use_base_plus_adjustment() {
        let price = resolve_unit_price(
            qty(3),
            Money::from_cents(1000),
            Money::from_cents(-100),
            &[],
            None,
        );
        assert_eq!(price, Money::from_cents(900));
    }

    #[test]
    fn test_pack_price_overrides_tiers() {
        let price = resolve_unit_price(
            qty(15),
            Money::from_cents(1000),
            Money::ZERO,
            &tiers(),
            Some(Money::from_cents(333)),
        );
        assert_eq!(price, Money::from_cents(333));
    }

    #[test]
    fn test_zero_pack_price_is_ignored() {
        let price = resolve_unit_price(
            qty(15),
            Money::from_cents(1000),
            Money::ZERO,
            &tiers(),
            Some(Money::ZERO),
        );
        assert_eq!(price, Money::from_cents(800));
    }

    #[test]
    fn test_match_best_option_floor() {
        let options = vec![option(10, 90, true), option(50, 80, true), option(100, 70, true)];
        assert_eq!(match_best_option(75, &options).unwrap().quantity, 50);
        assert_eq!(match_best_option(100, &options).unwrap().quantity, 100);
        assert_eq!(match_best_option(10, &options).unwrap().quantity, 10);
        assert!(match_best_option(9, &options).is_none());
    }

    #[test]
    fn test_match_best_option_never_exceeds_request() {
        let options = vec![option(100, 70, true), option(10, 90, true), option(50, 80, true)];
        for requested in 0..250 {
            if let Some(found) = match_best_option(requested, &options) {
                assert!(found.quantity <= requested);
            }
        }
    }

    #[test]
    fn test_match_best_option_skips_inactive() {
        let options = vec![option(10, 90, true), option(50, 80, false)];
        assert_eq!(match_best_option(75, &options).unwrap().quantity, 10);
    }

    #[test]
    fn test_schedule_uses_pack_then_tier() {
        let schedule = PriceSchedule {
            base_price: Money::from_cents(1200),
            variant_adjustment: Money::ZERO,
            tiers: tiers(),
            quantity_options: vec![option(100, 450, true)],
        };
        assert_eq!(schedule.unit_price(qty(60)), Money::from_cents(600));
        assert_eq!(schedule.unit_price(qty(120)), Money::from_cents(450));
        assert_eq!(schedule.list_price(), Money::from_cents(1200));
    }

    #[test]
    fn test_tier_deserializes_camel_case() {
        let tier: PriceTier = serde_json::from_str(
            r#"{"minQuantity": 10, "maxQuantity": null, "pricePerUnit": "8.50", "label": "Bulk"}"#,
        )
        .unwrap();
        assert_eq!(tier.max_quantity, None);
        assert_eq!(tier.price_per_unit, Money::from_cents(850));
    }
}
