//! Cart service.
//!
//! One [`CartService`] owns the cart of one browsing identity for the
//! duration of a request. Mutations update the in-memory aggregate first and
//! then write through to the [`CartStore`]; a failed write is logged and the
//! visible cart is kept. Behind a [`WriteBackCartStore`](crate::db::WriteBackCartStore)
//! the unsaved lines are what the next request loads, and the next
//! successful mutation re-syncs storage.

use std::sync::Arc;

use tierline_core::api::CartView;
use tierline_core::cart::{Cart, CartIdentity, CartSummary, LineItem, LineKey, ShippingRule};
use tierline_core::{GuestSessionId, QuantityEdit, UserId};

use crate::db::{CartStore, RepositoryError};

/// The cart of one guest or signed-in shopper.
pub struct CartService {
    store: Arc<dyn CartStore>,
    shipping: ShippingRule,
    guest: GuestSessionId,
    user: Option<UserId>,
    /// User the guest cart has already been folded into.
    merged_for: Option<UserId>,
    cart: Cart,
}

impl CartService {
    /// Load the cart for the resolved identity (user if signed in, else
    /// guest). A missing record is an empty cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored cart cannot be read.
    pub async fn open(
        store: Arc<dyn CartStore>,
        shipping: ShippingRule,
        guest: GuestSessionId,
        user: Option<UserId>,
        merged_for: Option<UserId>,
    ) -> Result<Self, RepositoryError> {
        let identity = CartIdentity::resolve(user, guest.clone());
        let items = store.load(&identity).await?.unwrap_or_default();

        Ok(Self {
            store,
            shipping,
            guest,
            user,
            merged_for,
            cart: Cart::from_items(items),
        })
    }

    /// The identity the cart is persisted under.
    #[must_use]
    pub fn identity(&self) -> CartIdentity {
        CartIdentity::resolve(self.user, self.guest.clone())
    }

    #[must_use]
    pub const fn cart(&self) -> &Cart {
        &self.cart
    }

    #[must_use]
    pub const fn merged_for(&self) -> Option<UserId> {
        self.merged_for
    }

    #[must_use]
    pub fn summary(&self) -> CartSummary {
        self.cart.summary_with(&self.shipping)
    }

    #[must_use]
    pub fn view(&self) -> CartView {
        CartView::new(&self.cart, &self.shipping)
    }

    pub async fn add_item(&mut self, line: LineItem) {
        self.cart.add_item(line);
        self.persist().await;
    }

    /// Set a line's quantity; zero or below removes it.
    pub async fn update_quantity(&mut self, key: &LineKey, quantity: i64) -> bool {
        let changed = self.cart.update_quantity(key, quantity);
        if changed {
            self.persist().await;
        }
        changed
    }

    /// Apply an interpreted quantity-field edit.
    pub async fn apply_edit(&mut self, key: &LineKey, edit: QuantityEdit) -> bool {
        let changed = self.cart.apply_edit(key, edit);
        if changed {
            self.persist().await;
        }
        changed
    }

    pub async fn remove_item(&mut self, key: &LineKey) -> bool {
        let changed = self.cart.remove_item(key);
        if changed {
            self.persist().await;
        }
        changed
    }

    /// Empty the cart and write an explicit empty record.
    pub async fn clear(&mut self) {
        self.cart.clear();
        self.persist().await;
    }

    /// Move from guest to signed-in as `user`, folding the guest cart into the
    /// user's stored cart.
    ///
    /// The merge runs at most once per user: if it already ran for `user`
    /// this only switches identity and reloads. After a merge the guest
    /// record is deleted. Returns `true` if a guest cart was merged.
    ///
    /// A merged cart that fails to save is treated like any other failed
    /// write: it stays visible and the guest record is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if either cart cannot be read; nothing is merged in
    /// that case.
    #[tracing::instrument(skip(self), fields(guest = %self.guest))]
    pub async fn sign_in(&mut self, user: UserId) -> Result<bool, RepositoryError> {
        let user_identity = CartIdentity::User(user);

        if self.merged_for == Some(user) {
            let items = self.store.load(&user_identity).await?.unwrap_or_default();
            self.user = Some(user);
            self.cart = Cart::from_items(items);
            return Ok(false);
        }

        let guest_identity = CartIdentity::Guest(self.guest.clone());
        let guest_items = self.store.load(&guest_identity).await?;
        let user_items = self.store.load(&user_identity).await?.unwrap_or_default();

        let merged = guest_items.is_some();
        let cart = match guest_items {
            Some(guest_items) => {
                let cart = Cart::merge(Cart::from_items(guest_items), Cart::from_items(user_items));
                match self.store.save(&user_identity, cart.items()).await {
                    Ok(()) => {
                        if let Err(e) = self.store.delete(&guest_identity).await {
                            tracing::warn!(error = %e, "Failed to delete merged guest cart");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to persist merged cart; keeping guest record");
                    }
                }
                tracing::info!(lines = cart.items().len(), "Merged guest cart into user cart");
                cart
            }
            None => Cart::from_items(user_items),
        };

        self.user = Some(user);
        self.merged_for = Some(user);
        self.cart = cart;
        Ok(merged)
    }

    /// Drop the signed-in identity and continue as a fresh guest.
    pub fn sign_out(&mut self, guest: GuestSessionId) {
        self.user = None;
        self.merged_for = None;
        self.guest = guest;
        self.cart = Cart::new();
    }

    async fn persist(&self) {
        let identity = self.identity();
        if let Err(e) = self.store.save(&identity, self.cart.items()).await {
            tracing::warn!(identity = %identity, error = %e, "Failed to persist cart");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::db::{MemoryCartStore, WriteBackCartStore};
    use tierline_core::pricing::{PriceSchedule, PriceTier};
    use tierline_core::{Money, ProductId, Quantity};

    fn line(product: &str, quantity: u32) -> LineItem {
        LineItem {
            product_id: ProductId::new(product),
            variant_id: None,
            name: product.to_owned(),
            variant_title: None,
            image_url: None,
            quantity: Quantity::new(quantity).unwrap(),
            pricing: PriceSchedule {
                base_price: Money::from_cents(1000),
                variant_adjustment: Money::ZERO,
                tiers: vec![PriceTier {
                    min_quantity: 3,
                    max_quantity: None,
                    price_per_unit: Money::from_cents(800),
                    label: "3+".to_owned(),
                }],
                quantity_options: Vec::new(),
            },
        }
    }

    fn key(product: &str) -> LineKey {
        LineKey::new(ProductId::new(product), None)
    }

    async fn open(store: &Arc<MemoryCartStore>, user: Option<UserId>) -> CartService {
        CartService::open(
            store.clone(),
            ShippingRule::default(),
            GuestSessionId::new("guest-1"),
            user,
            None,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_mutations_write_through() {
        let store = Arc::new(MemoryCartStore::new());
        let mut service = open(&store, None).await;

        service.add_item(line("a", 2)).await;
        service.add_item(line("a", 3)).await;

        let reopened = open(&store, None).await;
        assert_eq!(reopened.cart().items().len(), 1);
        assert_eq!(reopened.cart().items()[0].quantity.get(), 5);
        assert_eq!(reopened.cart().items()[0].unit_price(), Money::from_cents(800));
    }

    #[tokio::test]
    async fn test_clear_writes_empty_record() {
        let store = Arc::new(MemoryCartStore::new());
        let mut service = open(&store, None).await;
        service.add_item(line("a", 1)).await;
        service.clear().await;

        let guest = CartIdentity::Guest(GuestSessionId::new("guest-1"));
        assert_eq!(store.load(&guest).await.unwrap(), Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_sign_in_merges_once_and_deletes_guest_record() {
        let store = Arc::new(MemoryCartStore::new());
        let user = UserId::new(7);
        store
            .save(&CartIdentity::User(user), &[line("a", 1), line("b", 1)])
            .await
            .unwrap();

        let mut service = open(&store, None).await;
        service.add_item(line("a", 2)).await;

        assert!(service.sign_in(user).await.unwrap());
        let items = service.cart().items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].key(), key("a"));
        assert_eq!(items[0].quantity.get(), 3);
        assert_eq!(items[0].unit_price(), Money::from_cents(800));
        assert_eq!(items[1].key(), key("b"));
        assert!(!store.contains(&CartIdentity::Guest(GuestSessionId::new("guest-1"))));
        assert_eq!(service.merged_for(), Some(user));

        assert!(!service.sign_in(user).await.unwrap());
        assert_eq!(service.cart().items()[0].quantity.get(), 3);
    }

    #[tokio::test]
    async fn test_sign_out_starts_fresh_guest() {
        let store = Arc::new(MemoryCartStore::new());
        let mut service = open(&store, Some(UserId::new(1))).await;
        service.add_item(line("a", 1)).await;

        service.sign_out(GuestSessionId::new("guest-2"));
        assert!(service.cart().is_empty());
        assert_eq!(
            service.identity(),
            CartIdentity::Guest(GuestSessionId::new("guest-2"))
        );
    }

    struct FailingSaves(MemoryCartStore);

    #[async_trait]
    impl CartStore for FailingSaves {
        async fn load(&self, identity: &CartIdentity) -> Result<Option<Vec<LineItem>>, RepositoryError> {
            self.0.load(identity).await
        }

        async fn save(&self, _: &CartIdentity, _: &[LineItem]) -> Result<(), RepositoryError> {
            Err(RepositoryError::Conflict("read-only".to_owned()))
        }

        async fn delete(&self, identity: &CartIdentity) -> Result<(), RepositoryError> {
            self.0.delete(identity).await
        }
    }

    #[tokio::test]
    async fn test_save_failure_keeps_visible_cart() {
        let store: Arc<dyn CartStore> = Arc::new(FailingSaves(MemoryCartStore::new()));
        let mut service = CartService::open(
            store,
            ShippingRule::default(),
            GuestSessionId::new("guest-1"),
            None,
            None,
        )
        .await
        .unwrap();

        service.add_item(line("a", 2)).await;
        assert_eq!(service.summary().item_count, 2);
        assert!(service.update_quantity(&key("a"), 0).await);
        assert!(service.cart().is_empty());
    }

    #[tokio::test]
    async fn test_failed_save_survives_into_next_request() {
        let inner = Arc::new(FailFirstSave::default());
        let store: Arc<dyn CartStore> = Arc::new(WriteBackCartStore::new(inner.clone()));
        let guest = CartIdentity::Guest(GuestSessionId::new("guest-1"));

        let mut first = CartService::open(
            store.clone(),
            ShippingRule::default(),
            GuestSessionId::new("guest-1"),
            None,
            None,
        )
        .await
        .unwrap();
        first.add_item(line("a", 1)).await;
        assert_eq!(inner.store.load(&guest).await.unwrap(), None);

        let mut second = CartService::open(
            store,
            ShippingRule::default(),
            GuestSessionId::new("guest-1"),
            None,
            None,
        )
        .await
        .unwrap();
        assert_eq!(second.cart().items().len(), 1);
        second.add_item(line("b", 1)).await;

        let stored = inner.store.load(&guest).await.unwrap().unwrap();
        let keys: Vec<LineKey> = stored.iter().map(LineItem::key).collect();
        assert_eq!(keys, vec![key("a"), key("b")]);
    }

    #[derive(Default)]
    struct FailFirstSave {
        store: MemoryCartStore,
        failed: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl CartStore for FailFirstSave {
        async fn load(&self, identity: &CartIdentity) -> Result<Option<Vec<LineItem>>, RepositoryError> {
            self.store.load(identity).await
        }

        async fn save(&self, identity: &CartIdentity, items: &[LineItem]) -> Result<(), RepositoryError> {
            if !self.failed.swap(true, std::sync::atomic::Ordering::SeqCst) {
                return Err(RepositoryError::Conflict("unavailable".to_owned()));
            }
            self.store.save(identity, items).await
        }

        async fn delete(&self, identity: &CartIdentity) -> Result<(), RepositoryError> {
            self.store.delete(identity).await
        }
    }

    #[tokio::test]
    async fn test_failed_merge_save_keeps_guest_record_without_remerging() {
        let inner = Arc::new(FailingSaves(MemoryCartStore::new()));
        let guest = CartIdentity::Guest(GuestSessionId::new("guest-1"));
        inner.0.save(&guest, &[line("a", 1)]).await.unwrap();
        let store: Arc<dyn CartStore> = Arc::new(WriteBackCartStore::new(inner.clone()));

        let mut service = CartService::open(
            store.clone(),
            ShippingRule::default(),
            GuestSessionId::new("guest-1"),
            None,
            None,
        )
        .await
        .unwrap();

        let user = UserId::new(7);
        assert!(service.sign_in(user).await.unwrap());
        assert!(inner.0.contains(&guest));
        assert_eq!(service.merged_for(), Some(user));
        assert_eq!(service.cart().items()[0].quantity.get(), 1);

        let reopened = CartService::open(
            store,
            ShippingRule::default(),
            GuestSessionId::new("guest-1"),
            Some(user),
            Some(user),
        )
        .await
        .unwrap();
        assert_eq!(reopened.cart().items().len(), 1);
        assert_eq!(reopened.cart().items()[0].quantity.get(), 1);
    }
}
