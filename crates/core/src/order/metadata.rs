//! Checkout-session metadata shared by checkout and the webhook.
//!
//! The payment processor only knows names and amounts. Everything else the
//! order needs (catalog ids, images, the cart owner, a pre-entered address)
//! travels as string metadata on the checkout session and is read back when
//! the completed-payment event arrives.
//!
//! Processors cap metadata values (Stripe: 500 characters), so the cart
//! snapshot is split across numbered keys `cart_items_0`, `cart_items_1`, ...

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::Address;
use crate::cart::{CartIdentity, LineItem};
use crate::types::{GuestSessionId, Money, ProductId, UserId, VariantId};

/// Metadata keys.
pub mod keys {
    /// Prefix of the chunked cart snapshot keys.
    pub const CART_ITEMS_PREFIX: &str = "cart_items_";
    pub const USER_ID: &str = "user_id";
    pub const GUEST_SESSION_ID: &str = "guest_session_id";
    pub const SHIPPING_ADDRESS: &str = "shipping_address";
    pub const BILLING_ADDRESS: &str = "billing_address";
}

/// Longest value written to a single metadata key.
pub const MAX_VALUE_LEN: usize = 500;

/// Cart line as submitted to checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshotItem {
    pub product_id: ProductId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<VariantId>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
}

impl From<&LineItem> for CartSnapshotItem {
    fn from(line: &LineItem) -> Self {
        Self {
            product_id: line.product_id.clone(),
            variant_id: line.variant_id.clone(),
            name: line.name.clone(),
            variant_title: line.variant_title.clone(),
            image_url: line.image_url.clone(),
            quantity: line.quantity.get(),
            unit_price: line.unit_price(),
        }
    }
}

/// Everything the storefront attaches to a checkout session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckoutMetadata {
    pub items: Vec<CartSnapshotItem>,
    pub owner: Option<CartIdentity>,
    pub shipping_address: Option<Address>,
    pub billing_address: Option<Address>,
}

/// Metadata read back from a session, with any per-field parse problems.
///
/// A malformed field is dropped (and reported) rather than failing the whole
/// read, so one bad value cannot block order creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedMetadata {
    pub metadata: CheckoutMetadata,
    pub warnings: Vec<String>,
}

impl CheckoutMetadata {
    /// Flatten into string key/value pairs.
    ///
    /// # Errors
    ///
    /// Returns an error if a value fails to serialize.
    pub fn encode(&self) -> Result<Vec<(String, String)>, serde_json::Error> {
        let mut pairs = Vec::new();

        let snapshot = serde_json::to_string(&self.items)?;
        for (index, chunk) in chunk_str(&snapshot, MAX_VALUE_LEN).into_iter().enumerate() {
            pairs.push((format!("{}{index}", keys::CART_ITEMS_PREFIX), chunk.to_owned()));
        }

        match &self.owner {
            Some(CartIdentity::User(id)) => pairs.push((keys::USER_ID.to_owned(), id.to_string())),
            Some(CartIdentity::Guest(id)) => {
                pairs.push((keys::GUEST_SESSION_ID.to_owned(), id.to_string()));
            }
            None => {}
        }

        if let Some(address) = &self.shipping_address {
            pairs.push((keys::SHIPPING_ADDRESS.to_owned(), serde_json::to_string(address)?));
        }
        if let Some(address) = &self.billing_address {
            pairs.push((keys::BILLING_ADDRESS.to_owned(), serde_json::to_string(address)?));
        }

        Ok(pairs)
    }

    /// Read metadata back from a session's key/value map.
    #[must_use]
    pub fn decode(map: &HashMap<String, String>) -> DecodedMetadata {
        let mut warnings = Vec::new();

        let mut snapshot = String::new();
        for index in 0.. {
            match map.get(&format!("{}{index}", keys::CART_ITEMS_PREFIX)) {
                Some(chunk) => snapshot.push_str(chunk),
                None => break,
            }
        }
        let items = if snapshot.is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&snapshot).unwrap_or_else(|e| {
                warnings.push(format!("cart snapshot unreadable: {e}"));
                Vec::new()
            })
        };

        let user = map.get(keys::USER_ID).and_then(|raw| {
            raw.parse::<UserId>()
                .map_err(|e| warnings.push(format!("user id {raw:?} unreadable: {e}")))
                .ok()
        });
        let owner = user.map(CartIdentity::User).or_else(|| {
            map.get(keys::GUEST_SESSION_ID)
                .map(|raw| CartIdentity::Guest(GuestSessionId::new(raw.as_str())))
        });

        let mut address = |key: &str| {
            map.get(key).and_then(|raw| {
                serde_json::from_str::<Address>(raw)
                    .map_err(|e| warnings.push(format!("{key} unreadable: {e}")))
                    .ok()
            })
        };
        let shipping_address = address(keys::SHIPPING_ADDRESS);
        let billing_address = address(keys::BILLING_ADDRESS);

        DecodedMetadata {
            metadata: Self {
                items,
                owner,
                shipping_address,
                billing_address,
            },
            warnings,
        }
    }
}

/// Split on char boundaries into pieces of at most `max` bytes.
fn chunk_str(s: &str, max: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = s;
    while !rest.is_empty() {
        let mut end = rest.len().min(max);
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        let (head, tail) = rest.split_at(end);
        chunks.push(head);
        rest = tail;
    }
    chunks
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn item(n: usize) -> CartSnapshotItem {
        CartSnapshotItem {
            product_id: ProductId::new(format!("product-{n}")),
            variant_id: Some(VariantId::new("default")),
            name: format!("Product number {n} with a fairly long display name"),
            variant_title: None,
            image_url: Some(format!("https://cdn.example.com/images/{n}.jpg")),
            quantity: 1,
            unit_price: Money::from_cents(1234),
        }
    }

    #[test]
    fn test_large_snapshot_is_chunked_under_limit() {
        let metadata = CheckoutMetadata {
            items: (0..20).map(item).collect(),
            owner: Some(CartIdentity::User(UserId::new(5))),
            ..CheckoutMetadata::default()
        };
        let pairs = metadata.encode().unwrap();
        let chunks: Vec<_> = pairs
            .iter()
            .filter(|(k, _)| k.starts_with(keys::CART_ITEMS_PREFIX))
            .collect();
        assert!(chunks.len() > 1);
        assert!(pairs.iter().all(|(_, v)| v.len() <= MAX_VALUE_LEN));

        let map: HashMap<_, _> = pairs.into_iter().collect();
        let decoded = CheckoutMetadata::decode(&map);
        assert!(decoded.warnings.is_empty());
        assert_eq!(decoded.metadata, metadata);
    }

    #[test]
    fn test_guest_owner_and_addresses_survive() {
        let metadata = CheckoutMetadata {
            items: vec![item(1)],
            owner: Some(CartIdentity::Guest(GuestSessionId::new("g-77"))),
            shipping_address: Some(Address::placeholder()),
            billing_address: None,
        };
        let map: HashMap<_, _> = metadata.encode().unwrap().into_iter().collect();
        assert_eq!(CheckoutMetadata::decode(&map).metadata, metadata);
    }

    #[test]
    fn test_bad_fields_are_dropped_with_warnings() {
        let map: HashMap<String, String> = [
            ("cart_items_0".to_owned(), "[{not json".to_owned()),
            (keys::USER_ID.to_owned(), "abc".to_owned()),
            (keys::GUEST_SESSION_ID.to_owned(), "g-1".to_owned()),
            (keys::SHIPPING_ADDRESS.to_owned(), "{}".to_owned()),
        ]
        .into_iter()
        .collect();
        let decoded = CheckoutMetadata::decode(&map);
        assert_eq!(decoded.warnings.len(), 3);
        assert!(decoded.metadata.items.is_empty());
        assert_eq!(
            decoded.metadata.owner,
            Some(CartIdentity::Guest(GuestSessionId::new("g-1")))
        );
        assert!(decoded.metadata.shipping_address.is_none());
    }

    #[test]
    fn test_chunk_respects_char_boundaries() {
        let s = "ééééé";
        let chunks = chunk_str(s, 3);
        assert_eq!(chunks.concat(), s);
        assert!(chunks.iter().all(|c| c.len() <= 3));
    }
}
