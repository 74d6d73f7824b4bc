//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use tierline_core::cart::ShippingRule;

use crate::catalog::{Catalog, CatalogError, StaticCatalog};
use crate::config::StorefrontConfig;
use crate::db::{CartStore, OrderStore, PgCartStore, PgOrderStore, WriteBackCartStore};
use crate::payments::{PaymentGateway, StripeGateway};
use crate::services::{
    CheckoutInitiator, EmailNotifier, LogNotifier, OrderMaterializer, OrderNotifier,
};

/// Error assembling application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("catalog: {0}")]
    Catalog(#[from] CatalogError),
    #[error("SMTP: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// The collaborators a storefront is built from.
pub struct StateParts {
    /// `None` when running on in-memory stores.
    pub pool: Option<PgPool>,
    pub carts: Arc<dyn CartStore>,
    pub orders: Arc<dyn OrderStore>,
    pub catalog: Arc<dyn Catalog>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn OrderNotifier>,
    pub shipping: ShippingRule,
    /// Public origin, no trailing slash.
    pub base_url: String,
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like stores and the payment gateway.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    pool: Option<PgPool>,
    carts: Arc<dyn CartStore>,
    orders: Arc<dyn OrderStore>,
    catalog: Arc<dyn Catalog>,
    gateway: Arc<dyn PaymentGateway>,
    shipping: ShippingRule,
    checkout: CheckoutInitiator,
    materializer: OrderMaterializer,
}

impl AppState {
    /// Assemble the state. Cart writes go through a [`WriteBackCartStore`]
    /// over `parts.carts`.
    #[must_use]
    pub fn new(parts: StateParts) -> Self {
        let carts: Arc<dyn CartStore> = Arc::new(WriteBackCartStore::new(parts.carts));
        let checkout =
            CheckoutInitiator::new(parts.gateway.clone(), parts.base_url, parts.shipping);
        let materializer =
            OrderMaterializer::new(parts.orders.clone(), carts.clone(), parts.notifier);

        Self {
            inner: Arc::new(AppStateInner {
                pool: parts.pool,
                carts,
                orders: parts.orders,
                catalog: parts.catalog,
                gateway: parts.gateway,
                shipping: parts.shipping,
                checkout,
                materializer,
            }),
        }
    }

    /// Build the production state: `PostgreSQL` stores, Stripe, the JSON
    /// catalog, and SMTP email when configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be loaded or the SMTP relay is
    /// misconfigured.
    pub fn from_config(config: &StorefrontConfig, pool: PgPool) -> Result<Self, StateError> {
        let catalog = StaticCatalog::load(&config.catalog_path)?;
        let notifier: Arc<dyn OrderNotifier> = match &config.email {
            Some(email) => Arc::new(EmailNotifier::new(email)?),
            None => {
                tracing::warn!("SMTP not configured; order confirmations will only be logged");
                Arc::new(LogNotifier)
            }
        };

        Ok(Self::new(StateParts {
            pool: Some(pool.clone()),
            carts: Arc::new(PgCartStore::new(pool.clone())),
            orders: Arc::new(PgOrderStore::new(pool)),
            catalog: Arc::new(catalog),
            gateway: Arc::new(StripeGateway::new(&config.stripe)),
            notifier,
            shipping: ShippingRule::default(),
            base_url: config.base_url.clone(),
        }))
    }

    /// The database pool, if running on `PostgreSQL`.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    #[must_use]
    pub fn carts(&self) -> Arc<dyn CartStore> {
        self.inner.carts.clone()
    }

    #[must_use]
    pub fn orders(&self) -> &dyn OrderStore {
        self.inner.orders.as_ref()
    }

    #[must_use]
    pub fn catalog(&self) -> &dyn Catalog {
        self.inner.catalog.as_ref()
    }

    #[must_use]
    pub fn gateway(&self) -> &dyn PaymentGateway {
        self.inner.gateway.as_ref()
    }

    #[must_use]
    pub fn shipping(&self) -> ShippingRule {
        self.inner.shipping
    }

    #[must_use]
    pub fn checkout(&self) -> &CheckoutInitiator {
        &self.inner.checkout
    }

    #[must_use]
    pub fn materializer(&self) -> &OrderMaterializer {
        &self.inner.materializer
    }
}
