//! The cart aggregate.
//!
//! [`Cart`] is the authoritative, in-memory list of lines for one browsing
//! identity. Every mutation is synchronous and infallible; persisting the
//! result is the caller's job (see the storefront's cart service).
//!
//! Invariant: at most one line per [`LineKey`]. Adding an identity that is
//! already present increases its quantity instead of appending.

mod identity;
mod line;
mod summary;

use serde::{Deserialize, Serialize};

pub use identity::CartIdentity;
pub use line::{LineItem, LineKey, LineKeyError};
pub use summary::{CartSummary, ShippingRule};

use crate::types::{Quantity, QuantityEdit};

/// A shopping cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cart {
    items: Vec<LineItem>,
}

impl Cart {
    /// An empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Build a cart from stored lines, folding any duplicate identities
    /// together so the one-line-per-key invariant holds even for records
    /// written by an older build.
    #[must_use]
    pub fn from_items(items: Vec<LineItem>) -> Self {
        let mut cart = Self::new();
        for item in items {
            cart.add_item(item);
        }
        cart
    }

    /// Lines in insertion order.
    #[must_use]
    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    /// Consume the cart, returning its lines.
    #[must_use]
    pub fn into_items(self) -> Vec<LineItem> {
        self.items
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Find a line by identity.
    #[must_use]
    pub fn get(&self, key: &LineKey) -> Option<&LineItem> {
        self.items.iter().find(|item| item.matches(key))
    }

    /// Add `line.quantity` units of `line`'s identity.
    ///
    /// If the identity is already in the cart its quantity is increased and
    /// it takes the incoming line's catalog data, so the unit price is
    /// re-resolved at the new total.
    pub fn add_item(&mut self, line: LineItem) {
        let key = line.key();
        match self.items.iter_mut().find(|item| item.matches(&key)) {
            Some(existing) => {
                let quantity = existing.quantity.saturating_add(line.quantity);
                *existing = LineItem { quantity, ..line };
            }
            None => self.items.push(line),
        }
    }

    /// Set a line's quantity from an integer; zero or below removes the line.
    ///
    /// Returns `true` if the cart changed.
    pub fn update_quantity(&mut self, key: &LineKey, new_quantity: i64) -> bool {
        let edit = if new_quantity <= 0 {
            QuantityEdit::Remove
        } else {
            u32::try_from(new_quantity)
                .ok()
                .and_then(Quantity::new)
                .map_or(QuantityEdit::Defer, QuantityEdit::Set)
        };
        self.apply_edit(key, edit)
    }

    /// Apply an interpreted quantity edit to a line.
    ///
    /// Returns `true` if the cart changed.
    pub fn apply_edit(&mut self, key: &LineKey, edit: QuantityEdit) -> bool {
        match edit {
            QuantityEdit::Defer => false,
            QuantityEdit::Remove => self.remove_item(key),
            QuantityEdit::Set(quantity) => {
                match self.items.iter_mut().find(|item| item.matches(key)) {
                    Some(item) if item.quantity != quantity => {
                        item.quantity = quantity;
                        true
                    }
                    _ => false,
                }
            }
        }
    }

    /// Remove a line. Removing an absent identity is a no-op.
    ///
    /// Returns `true` if a line was removed.
    pub fn remove_item(&mut self, key: &LineKey) -> bool {
        let before = self.items.len();
        self.items.retain(|item| !item.matches(key));
        self.items.len() != before
    }

    /// Drop every line.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Totals with the default shipping rule.
    #[must_use]
    pub fn summary(&self) -> CartSummary {
        self.summary_with(&ShippingRule::default())
    }

    /// Totals with an explicit shipping rule.
    #[must_use]
    pub fn summary_with(&self, shipping: &ShippingRule) -> CartSummary {
        CartSummary::compute(&self.items, shipping)
    }

    /// Fold a guest cart into a user cart.
    ///
    /// Guest lines whose identity the user cart already has are summed into
    /// the user's line (priced at the summed quantity); the rest are appended
    /// in guest order after the user's lines.
    #[must_use]
    pub fn merge(guest: Self, user: Self) -> Self {
        let mut merged = user;
        for guest_line in guest.items {
            let key = guest_line.key();
            match merged.items.iter_mut().find(|item| item.matches(&key)) {
                Some(existing) => {
                    existing.quantity = existing.quantity.saturating_add(guest_line.quantity);
                }
                None => merged.items.push(guest_line),
            }
        }
        merged
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::pricing::{PriceSchedule, PriceTier};
    use crate::types::{Money, ProductId, VariantId};

    fn qty(n: u32) -> Quantity {
        Quantity::new(n).unwrap()
    }

    fn tiered() -> PriceSchedule {
        PriceSchedule {
            base_price: Money::from_cents(1000),
            variant_adjustment: Money::ZERO,
            tiers: vec![
                PriceTier {
                    min_quantity: 1,
                    max_quantity: Some(4),
                    price_per_unit: Money::from_cents(1000),
                    label: "Single".to_owned(),
                },
                PriceTier {
                    min_quantity: 5,
                    max_quantity: None,
                    price_per_unit: Money::from_cents(700),
                    label: "Bulk".to_owned(),
                },
            ],
            quantity_options: Vec::new(),
        }
    }

    fn line(product: &str, variant: Option<&str>, quantity: u32) -> LineItem {
        LineItem {
            product_id: ProductId::new(product),
            variant_id: variant.map(VariantId::new),
            name: product.to_owned(),
            variant_title: None,
            image_url: None,
            quantity: qty(quantity),
            pricing: tiered(),
        }
    }

    fn key(product: &str, variant: Option<&str>) -> LineKey {
        LineKey::new(ProductId::new(product), variant.map(VariantId::new))
    }

    #[test]
    fn test_add_same_identity_accumulates_and_reprices() {
        let mut cart = Cart::new();
        cart.add_item(line("a", Some("red"), 2));
        cart.add_item(line("a", Some("red"), 3));

        assert_eq!(cart.items().len(), 1);
        let item = &cart.items()[0];
        assert_eq!(item.quantity, qty(5));
        // Priced at 5 (bulk tier), not an average of the 2- and 3-unit prices
        assert_eq!(item.unit_price(), Money::from_cents(700));
        assert_eq!(item.line_total(), Money::from_cents(3500));
    }

    #[test]
    fn test_variants_are_distinct_lines() {
        let mut cart = Cart::new();
        cart.add_item(line("a", Some("red"), 1));
        cart.add_item(line("a", Some("blue"), 1));
        cart.add_item(line("a", None, 1));
        assert_eq!(cart.items().len(), 3);
    }

    #[test]
    fn test_update_quantity_reprices_and_removes() {
        let mut cart = Cart::new();
        cart.add_item(line("a", None, 1));

        assert!(cart.update_quantity(&key("a", None), 6));
        assert_eq!(cart.get(&key("a", None)).unwrap().unit_price(), Money::from_cents(700));

        assert!(cart.update_quantity(&key("a", None), 0));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_negative_quantity_removes() {
        let mut cart = Cart::new();
        cart.add_item(line("a", None, 3));
        assert!(cart.update_quantity(&key("a", None), -1));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_deferred_edit_leaves_cart_untouched() {
        let mut cart = Cart::new();
        cart.add_item(line("a", None, 3));
        assert!(!cart.apply_edit(&key("a", None), QuantityEdit::Defer));
        assert_eq!(cart.items()[0].quantity, qty(3));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut cart = Cart::new();
        cart.add_item(line("a", None, 1));
        assert!(cart.remove_item(&key("a", None)));
        assert!(!cart.remove_item(&key("a", None)));
        assert!(!cart.remove_item(&key("never", None)));
    }

    #[test]
    fn test_from_items_folds_duplicates() {
        let cart = Cart::from_items(vec![line("a", None, 2), line("a", None, 2)]);
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].quantity, qty(4));
    }

    #[test]
    fn test_merge_sums_shared_and_appends_rest() {
        let guest = Cart::from_items(vec![line("A", None, 2)]);
        let user = Cart::from_items(vec![line("A", None, 1), line("B", None, 1)]);

        let merged = Cart::merge(guest, user);
        let items = merged.items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].product_id, ProductId::new("A"));
        assert_eq!(items[0].quantity, qty(3));
        assert_eq!(items[0].unit_price(), Money::from_cents(1000));
        assert_eq!(items[1].product_id, ProductId::new("B"));
        assert_eq!(items[1].quantity, qty(1));
    }

    #[test]
    fn test_merge_reprices_across_tier_boundary() {
        let guest = Cart::from_items(vec![line("A", None, 3)]);
        let user = Cart::from_items(vec![line("A", None, 3)]);
        let merged = Cart::merge(guest, user);
        assert_eq!(merged.items()[0].quantity, qty(6));
        assert_eq!(merged.items()[0].unit_price(), Money::from_cents(700));
    }

    #[test]
    fn test_merge_into_empty_user_cart() {
        let guest = Cart::from_items(vec![line("A", None, 2), line("B", Some("s"), 1)]);
        let merged = Cart::merge(guest.clone(), Cart::new());
        assert_eq!(merged, guest);
    }

    #[test]
    fn test_cart_serializes_as_array() {
        let cart = Cart::from_items(vec![line("A", None, 2)]);
        let json = serde_json::to_value(&cart).unwrap();
        assert!(json.is_array());
        let back: Cart = serde_json::from_value(json).unwrap();
        assert_eq!(back, cart);
    }
}
