//! Cart line items.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::pricing::PriceSchedule;
use crate::types::{Money, ProductId, Quantity, VariantId};

/// Identity of a cart line: product plus optional variant.
///
/// Rendered as `product` or `product:variant` when it has to travel as a
/// single string (URLs, form fields).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineKey {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
}

impl LineKey {
    #[must_use]
    pub const fn new(product_id: ProductId, variant_id: Option<VariantId>) -> Self {
        Self {
            product_id,
            variant_id,
        }
    }
}

impl fmt::Display for LineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variant_id {
            Some(variant) => write!(f, "{}:{}", self.product_id, variant),
            None => write!(f, "{}", self.product_id),
        }
    }
}

/// Error parsing a [`LineKey`] from its string form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid line id: {0:?}")]
pub struct LineKeyError(pub String);

impl FromStr for LineKey {
    type Err = LineKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (product, variant) = match s.split_once(':') {
            Some((product, variant)) => (product, Some(variant)),
            None => (s, None),
        };
        if product.is_empty() || variant.is_some_and(str::is_empty) {
            return Err(LineKeyError(s.to_owned()));
        }
        Ok(Self::new(
            ProductId::new(product),
            variant.map(VariantId::new),
        ))
    }
}

/// One line of a cart.
///
/// The unit price is never stored: it is resolved from the snapshotted
/// [`PriceSchedule`] at the line's current quantity every time it is asked
/// for, so crossing a tier boundary re-prices the whole line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: ProductId,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    pub name: String,
    #[serde(default)]
    pub variant_title: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub quantity: Quantity,
    pub pricing: PriceSchedule,
}

impl LineItem {
    /// The line's identity.
    #[must_use]
    pub fn key(&self) -> LineKey {
        LineKey::new(self.product_id.clone(), self.variant_id.clone())
    }

    /// Whether this line has the given identity.
    #[must_use]
    pub fn matches(&self, key: &LineKey) -> bool {
        self.product_id == key.product_id && self.variant_id == key.variant_id
    }

    /// Unit price resolved at the current quantity.
    #[must_use]
    pub fn unit_price(&self) -> Money {
        self.pricing.unit_price(self.quantity)
    }

    /// `unit_price × quantity`, unrounded.
    #[must_use]
    pub fn line_total(&self) -> Money {
        self.unit_price() * self.quantity.get()
    }

    /// Savings against the list price, clamped at zero per line.
    #[must_use]
    pub fn savings(&self) -> Money {
        self.pricing.list_price().saturating_sub(self.unit_price()) * self.quantity.get()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_line_key_roundtrip() {
        let plain: LineKey = "tee".parse().unwrap();
        assert_eq!(plain, LineKey::new(ProductId::new("tee"), None));
        assert_eq!(plain.to_string(), "tee");

        let variant: LineKey = "tee:xl".parse().unwrap();
        assert_eq!(variant.variant_id, Some(VariantId::new("xl")));
        assert_eq!(variant.to_string(), "tee:xl");
    }

    #[test]
    fn test_line_key_rejects_empty_parts() {
        assert!("".parse::<LineKey>().is_err());
        assert!(":xl".parse::<LineKey>().is_err());
        assert!("tee:".parse::<LineKey>().is_err());
    }

    #[test]
    fn test_savings_clamped_when_unit_above_list() {
        let line = LineItem {
            product_id: ProductId::new("mug"),
            variant_id: None,
            name: "Mug".to_owned(),
            variant_title: None,
            image_url: None,
            quantity: Quantity::new(2).unwrap(),
            pricing: PriceSchedule {
                base_price: Money::from_cents(500),
                variant_adjustment: Money::ZERO,
                tiers: vec![crate::pricing::PriceTier {
                    min_quantity: 1,
                    max_quantity: None,
                    price_per_unit: Money::from_cents(700),
                    label: String::new(),
                }],
                quantity_options: Vec::new(),
            },
        };
        assert_eq!(line.line_total(), Money::from_cents(1400));
        assert_eq!(line.savings(), Money::ZERO);
    }
}
