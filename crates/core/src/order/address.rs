//! Postal addresses and the fallback chain used to pick one.
//!
//! An order's shipping and billing addresses can come from several places:
//! what the payment processor collected, what the storefront stashed in the
//! checkout metadata, or a fallback. Each candidate is an [`AddressSource`];
//! [`resolve_address`] walks an ordered list and takes the first usable one.
//! The two chains the materializer uses are [`shipping_sources`] and
//! [`billing_sources`].

use serde::{Deserialize, Serialize};

/// A postal address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default)]
    pub name: Option<String>,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default)]
    pub state: Option<String>,
    pub postal_code: String,
    pub country: String,
}

impl Address {
    /// Stand-in used when no source produced a shipping address.
    #[must_use]
    pub fn placeholder() -> Self {
        Self {
            name: None,
            line1: "Address not provided".to_owned(),
            line2: None,
            city: "Unknown".to_owned(),
            state: None,
            postal_code: "00000".to_owned(),
            country: "US".to_owned(),
        }
    }

    /// Whether every required field has content.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        [&self.line1, &self.city, &self.postal_code, &self.country]
            .iter()
            .all(|field| !field.trim().is_empty())
    }
}

/// Where a resolved address came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressOrigin {
    Collected,
    Metadata,
    Copied,
    Placeholder,
}

/// One candidate in an address fallback chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressSource {
    /// Collected by the payment processor's hosted checkout.
    Collected(Option<Address>),
    /// Submitted with the cart and carried in checkout metadata.
    Metadata(Option<Address>),
    /// A copy of an address resolved earlier (billing = shipping).
    SameAs(Address),
    /// The fixed placeholder.
    Placeholder,
}

impl AddressSource {
    const fn origin(&self) -> AddressOrigin {
        match self {
            Self::Collected(_) => AddressOrigin::Collected,
            Self::Metadata(_) => AddressOrigin::Metadata,
            Self::SameAs(_) => AddressOrigin::Copied,
            Self::Placeholder => AddressOrigin::Placeholder,
        }
    }

    fn into_address(self) -> Option<Address> {
        match self {
            Self::Collected(address) | Self::Metadata(address) => {
                address.filter(Address::is_complete)
            }
            Self::SameAs(address) => Some(address),
            Self::Placeholder => Some(Address::placeholder()),
        }
    }
}

/// An address together with the source that supplied it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAddress {
    pub address: Address,
    pub origin: AddressOrigin,
}

/// Take the first usable address from `sources`, in order.
///
/// Incomplete addresses are skipped. If nothing usable is found the
/// placeholder is returned, so resolution never fails.
#[must_use]
pub fn resolve_address(sources: impl IntoIterator<Item = AddressSource>) -> ResolvedAddress {
    sources
        .into_iter()
        .find_map(|source| {
            let origin = source.origin();
            source
                .into_address()
                .map(|address| ResolvedAddress { address, origin })
        })
        .unwrap_or_else(|| ResolvedAddress {
            address: Address::placeholder(),
            origin: AddressOrigin::Placeholder,
        })
}

/// Shipping: processor-collected, then metadata, then placeholder.
#[must_use]
pub fn shipping_sources(collected: Option<Address>, metadata: Option<Address>) -> [AddressSource; 3] {
    [
        AddressSource::Collected(collected),
        AddressSource::Metadata(metadata),
        AddressSource::Placeholder,
    ]
}

/// Billing: processor-collected, then metadata, then a copy of shipping.
#[must_use]
pub fn billing_sources(
    collected: Option<Address>,
    metadata: Option<Address>,
    shipping: &Address,
) -> [AddressSource; 3] {
    [
        AddressSource::Collected(collected),
        AddressSource::Metadata(metadata),
        AddressSource::SameAs(shipping.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(line1: &str) -> Address {
        Address {
            name: Some("Pat Doe".to_owned()),
            line1: line1.to_owned(),
            line2: None,
            city: "Portland".to_owned(),
            state: Some("OR".to_owned()),
            postal_code: "97201".to_owned(),
            country: "US".to_owned(),
        }
    }

    #[test]
    fn test_collected_wins() {
        let resolved = resolve_address(shipping_sources(
            Some(address("1 Collected St")),
            Some(address("2 Metadata Ave")),
        ));
        assert_eq!(resolved.origin, AddressOrigin::Collected);
        assert_eq!(resolved.address.line1, "1 Collected St");
    }

    #[test]
    fn test_metadata_used_when_nothing_collected() {
        let resolved = resolve_address(shipping_sources(None, Some(address("2 Metadata Ave"))));
        assert_eq!(resolved.origin, AddressOrigin::Metadata);
    }

    #[test]
    fn test_shipping_placeholder_last() {
        let resolved = resolve_address(shipping_sources(None, None));
        assert_eq!(resolved.origin, AddressOrigin::Placeholder);
        assert_eq!(resolved.address, Address::placeholder());
    }

    #[test]
    fn test_incomplete_address_is_skipped() {
        let mut partial = address("");
        partial.city = String::new();
        let resolved = resolve_address(shipping_sources(Some(partial), Some(address("2 Meta"))));
        assert_eq!(resolved.origin, AddressOrigin::Metadata);
    }

    #[test]
    fn test_billing_falls_back_to_shipping() {
        let shipping = address("1 Collected St");
        let resolved = resolve_address(billing_sources(None, None, &shipping));
        assert_eq!(resolved.origin, AddressOrigin::Copied);
        assert_eq!(resolved.address, shipping);
    }

    #[test]
    fn test_empty_chain_yields_placeholder() {
        let resolved = resolve_address(Vec::new());
        assert_eq!(resolved.origin, AddressOrigin::Placeholder);
    }
}
