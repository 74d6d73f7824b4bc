//! Read-only product catalog.
//!
//! Products, variants, price tiers and quantity packs are loaded from a JSON
//! file at startup and held in memory. The cart only ever asks one question
//! of the catalog: "what is this product/variant, and how is it priced?"
//!
//! # File format
//!
//! ```json
//! {
//!   "products": [{
//!     "id": "tee",
//!     "name": "Logo Tee",
//!     "imageUrl": "/img/tee.jpg",
//!     "basePrice": "20.00",
//!     "priceTiers": [{"minQuantity": 10, "maxQuantity": null, "pricePerUnit": "15.00"}],
//!     "quantityOptions": [],
//!     "variants": [{"id": "xl", "title": "XL", "priceAdjustment": "2.00"}]
//!   }]
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use tierline_core::cart::LineItem;
use tierline_core::pricing::{PriceSchedule, PriceTier, QuantityOption};
use tierline_core::{Money, ProductId, Quantity, VariantId};

/// Catalog errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("product {product}: {reason}")]
    InvalidPrice { product: ProductId, reason: String },
}

/// What the cart needs to know about one product/variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub name: String,
    pub variant_title: Option<String>,
    pub image_url: Option<String>,
    pub pricing: PriceSchedule,
}

impl CatalogEntry {
    /// A cart line for `quantity` units of this entry.
    #[must_use]
    pub fn line_item(&self, quantity: Quantity) -> LineItem {
        LineItem {
            product_id: self.product_id.clone(),
            variant_id: self.variant_id.clone(),
            name: self.name.clone(),
            variant_title: self.variant_title.clone(),
            image_url: self.image_url.clone(),
            quantity,
            pricing: self.pricing.clone(),
        }
    }
}

/// Port for catalog lookups.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Look up a product, optionally narrowed to one variant.
    ///
    /// Returns `None` for an unknown product or a variant the product does
    /// not have.
    async fn product(
        &self,
        product_id: &ProductId,
        variant_id: Option<&VariantId>,
    ) -> Result<Option<CatalogEntry>, CatalogError>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub image_url: Option<String>,
    pub base_price: Money,
    #[serde(default)]
    pub price_tiers: Vec<PriceTier>,
    #[serde(default)]
    pub quantity_options: Vec<QuantityOption>,
    #[serde(default)]
    pub variants: Vec<VariantRecord>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantRecord {
    pub id: VariantId,
    pub title: String,
    #[serde(default)]
    pub price_adjustment: Money,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl ProductRecord {
    /// Reject prices that would resolve to a negative unit price.
    ///
    /// Variant adjustments may be negative as long as the adjusted list
    /// price is not.
    fn validate(&self) -> Result<(), CatalogError> {
        let invalid = |reason: String| CatalogError::InvalidPrice {
            product: self.id.clone(),
            reason,
        };
        let non_negative = |what: &str, price: Money| {
            Money::try_new(price.amount())
                .map(drop)
                .map_err(|e| invalid(format!("{what}: {e}")))
        };

        non_negative("base price", self.base_price)?;
        for variant in &self.variants {
            non_negative(
                &format!("variant {} list price", variant.id),
                self.base_price + variant.price_adjustment,
            )?;
        }
        for tier in &self.price_tiers {
            non_negative(&format!("tier from {}", tier.min_quantity), tier.price_per_unit)?;
        }
        for option in &self.quantity_options {
            non_negative(&format!("pack of {}", option.quantity), option.price_per_unit)?;
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct CatalogFile {
    products: Vec<ProductRecord>,
}

/// In-memory catalog.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    products: Arc<HashMap<ProductId, ProductRecord>>,
}

impl StaticCatalog {
    /// Load the catalog from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or holds a
    /// negative price.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(|e| CatalogError::Io(e.to_string()))?;
        let catalog = Self::from_json(&raw)?;
        tracing::info!(products = catalog.products.len(), path = ?path, "Loaded catalog");
        Ok(catalog)
    }

    /// Parse a catalog document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or holds a negative
    /// price.
    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile =
            serde_json::from_str(raw).map_err(|e| CatalogError::Parse(e.to_string()))?;
        Self::from_products(file.products)
    }

    /// Build a catalog from product records.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidPrice`] for the first product with a
    /// negative price.
    pub fn from_products(
        products: impl IntoIterator<Item = ProductRecord>,
    ) -> Result<Self, CatalogError> {
        let products = products
            .into_iter()
            .map(|product| {
                product.validate()?;
                Ok((product.id.clone(), product))
            })
            .collect::<Result<HashMap<_, _>, CatalogError>>()?;

        Ok(Self {
            products: Arc::new(products),
        })
    }

    fn entry(&self, product_id: &ProductId, variant_id: Option<&VariantId>) -> Option<CatalogEntry> {
        let product = self.products.get(product_id)?;
        let variant = match variant_id {
            Some(id) => Some(product.variants.iter().find(|v| &v.id == id)?),
            None => None,
        };

        Some(CatalogEntry {
            product_id: product.id.clone(),
            variant_id: variant.map(|v| v.id.clone()),
            name: product.name.clone(),
            variant_title: variant.map(|v| v.title.clone()),
            image_url: variant
                .and_then(|v| v.image_url.clone())
                .or_else(|| product.image_url.clone()),
            pricing: PriceSchedule {
                base_price: product.base_price,
                variant_adjustment: variant.map_or(Money::ZERO, |v| v.price_adjustment),
                tiers: product.price_tiers.clone(),
                quantity_options: product.quantity_options.clone(),
            },
        })
    }
}

#[async_trait]
impl Catalog for StaticCatalog {
    async fn product(
        &self,
        product_id: &ProductId,
        variant_id: Option<&VariantId>,
    ) -> Result<Option<CatalogEntry>, CatalogError> {
        Ok(self.entry(product_id, variant_id))
    }
}
