//! Cart persistence.
//!
//! A cart record is keyed by exactly one of `session_id` (guest token) or
//! `user_id`. The value is the serialized line array; an empty array is a
//! real record, distinct from "no record".

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::types::Json;

use tierline_core::cart::{CartIdentity, LineItem};

use super::RepositoryError;

/// Port for cart storage.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Load the lines stored for `identity`, or `None` if there is no record.
    async fn load(&self, identity: &CartIdentity) -> Result<Option<Vec<LineItem>>, RepositoryError>;

    /// Replace the record for `identity`. An empty slice writes an empty cart.
    async fn save(&self, identity: &CartIdentity, items: &[LineItem]) -> Result<(), RepositoryError>;

    /// Delete the record for `identity`. Deleting a missing record is a no-op.
    async fn delete(&self, identity: &CartIdentity) -> Result<(), RepositoryError>;
}

/// `PostgreSQL` cart store (`storefront.cart`).
#[derive(Clone)]
pub struct PgCartStore {
    pool: PgPool,
}

impl PgCartStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn decode_items(value: serde_json::Value) -> Result<Vec<LineItem>, RepositoryError> {
    serde_json::from_value(value)
        .map_err(|e| RepositoryError::DataCorruption(format!("invalid cart items: {e}")))
}

#[async_trait]
impl CartStore for PgCartStore {
    async fn load(&self, identity: &CartIdentity) -> Result<Option<Vec<LineItem>>, RepositoryError> {
        let row: Option<serde_json::Value> = match identity {
            CartIdentity::Guest(token) => {
                sqlx::query_scalar("SELECT items FROM storefront.cart WHERE session_id = $1")
                    .bind(token.as_str())
                    .fetch_optional(&self.pool)
                    .await?
            }
            CartIdentity::User(user_id) => {
                sqlx::query_scalar("SELECT items FROM storefront.cart WHERE user_id = $1")
                    .bind(user_id.as_i32())
                    .fetch_optional(&self.pool)
                    .await?
            }
        };

        row.map(decode_items).transpose()
    }

    async fn save(&self, identity: &CartIdentity, items: &[LineItem]) -> Result<(), RepositoryError> {
        let items = Json(items);
        match identity {
            CartIdentity::Guest(token) => {
                sqlx::query(
                    r"
                    INSERT INTO storefront.cart (session_id, items)
                    VALUES ($1, $2)
                    ON CONFLICT (session_id)
                    DO UPDATE SET items = EXCLUDED.items, updated_at = now()
                    ",
                )
                .bind(token.as_str())
                .bind(items)
                .execute(&self.pool)
                .await?;
            }
            CartIdentity::User(user_id) => {
                sqlx::query(
                    r"
                    INSERT INTO storefront.cart (user_id, items)
                    VALUES ($1, $2)
                    ON CONFLICT (user_id)
                    DO UPDATE SET items = EXCLUDED.items, updated_at = now()
                    ",
                )
                .bind(user_id.as_i32())
                .bind(items)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }

    async fn delete(&self, identity: &CartIdentity) -> Result<(), RepositoryError> {
        match identity {
            CartIdentity::Guest(token) => {
                sqlx::query("DELETE FROM storefront.cart WHERE session_id = $1")
                    .bind(token.as_str())
                    .execute(&self.pool)
                    .await?;
            }
            CartIdentity::User(user_id) => {
                sqlx::query("DELETE FROM storefront.cart WHERE user_id = $1")
                    .bind(user_id.as_i32())
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }
}

/// In-memory cart store for tests and local runs without a database.
#[derive(Default)]
pub struct MemoryCartStore {
    records: Mutex<HashMap<CartIdentity, Vec<LineItem>>>,
}

impl MemoryCartStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a record exists for `identity`.
    #[must_use]
    pub fn contains(&self, identity: &CartIdentity) -> bool {
        self.records
            .lock()
            .is_ok_and(|records| records.contains_key(identity))
    }

    /// Number of stored cart records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().map_or(0, |records| records.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

}

fn poisoned() -> RepositoryError {
    RepositoryError::DataCorruption("cart store lock poisoned".to_owned())
}

#[async_trait]
impl CartStore for MemoryCartStore {
    async fn load(&self, identity: &CartIdentity) -> Result<Option<Vec<LineItem>>, RepositoryError> {
        let records = self.records.lock().map_err(|_| poisoned())?;
        Ok(records.get(identity).cloned())
    }

    async fn save(&self, identity: &CartIdentity, items: &[LineItem]) -> Result<(), RepositoryError> {
        let mut records = self.records.lock().map_err(|_| poisoned())?;
        records.insert(identity.clone(), items.to_vec());
        Ok(())
    }

    async fn delete(&self, identity: &CartIdentity) -> Result<(), RepositoryError> {
        let mut records = self.records.lock().map_err(|_| poisoned())?;
        records.remove(identity);
        Ok(())
    }
}

/// Write-back layer over another [`CartStore`].
///
/// A save that fails keeps the lines in process memory, and loads for that
/// identity return them instead of the stale stored record. The next
/// successful save writes the whole cart and drops the buffered copy.
pub struct WriteBackCartStore {
    inner: Arc<dyn CartStore>,
    unsynced: Mutex<HashMap<CartIdentity, Vec<LineItem>>>,
}

impl WriteBackCartStore {
    #[must_use]
    pub fn new(inner: Arc<dyn CartStore>) -> Self {
        Self {
            inner,
            unsynced: Mutex::new(HashMap::new()),
        }
    }

    /// Whether `identity` has lines that are not in the inner store yet.
    #[must_use]
    pub fn is_unsynced(&self, identity: &CartIdentity) -> bool {
        self.unsynced
            .lock()
            .is_ok_and(|unsynced| unsynced.contains_key(identity))
    }

    fn buffered(&self, identity: &CartIdentity) -> Result<Option<Vec<LineItem>>, RepositoryError> {
        let unsynced = self.unsynced.lock().map_err(|_| poisoned())?;
        Ok(unsynced.get(identity).cloned())
    }

    fn set_unsynced(
        &self,
        identity: &CartIdentity,
        items: Option<&[LineItem]>,
    ) -> Result<(), RepositoryError> {
        let mut unsynced = self.unsynced.lock().map_err(|_| poisoned())?;
        match items {
            Some(items) => unsynced.insert(identity.clone(), items.to_vec()),
            None => unsynced.remove(identity),
        };
        Ok(())
    }
}

#[async_trait]
impl CartStore for WriteBackCartStore {
    async fn load(&self, identity: &CartIdentity) -> Result<Option<Vec<LineItem>>, RepositoryError> {
        if let Some(items) = self.buffered(identity)? {
            return Ok(Some(items));
        }
        self.inner.load(identity).await
    }

    async fn save(&self, identity: &CartIdentity, items: &[LineItem]) -> Result<(), RepositoryError> {
        match self.inner.save(identity, items).await {
            Ok(()) => self.set_unsynced(identity, None),
            Err(e) => {
                self.set_unsynced(identity, Some(items))?;
                Err(e)
            }
        }
    }

    async fn delete(&self, identity: &CartIdentity) -> Result<(), RepositoryError> {
        self.inner.delete(identity).await?;
        self.set_unsynced(identity, None)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tierline_core::GuestSessionId;

    #[tokio::test]
    async fn test_memory_store_distinguishes_empty_from_missing() {
        let store = MemoryCartStore::new();
        let guest = CartIdentity::Guest(GuestSessionId::new("g-1"));

        assert_eq!(store.load(&guest).await.unwrap(), None);
        store.save(&guest, &[]).await.unwrap();
        assert_eq!(store.load(&guest).await.unwrap(), Some(Vec::new()));
        assert!(store.contains(&guest));

        store.delete(&guest).await.unwrap();
        assert!(!store.contains(&guest));
        store.delete(&guest).await.unwrap();
    }

    /// Fails the first `failures` saves, then delegates.
    struct FlakySaves {
        inner: MemoryCartStore,
        failures: Mutex<u32>,
    }

    impl FlakySaves {
        fn new(failures: u32) -> Self {
            Self {
                inner: MemoryCartStore::new(),
                failures: Mutex::new(failures),
            }
        }
    }

    #[async_trait]
    impl CartStore for FlakySaves {
        async fn load(&self, identity: &CartIdentity) -> Result<Option<Vec<LineItem>>, RepositoryError> {
            self.inner.load(identity).await
        }

        async fn save(&self, identity: &CartIdentity, items: &[LineItem]) -> Result<(), RepositoryError> {
            {
                let mut failures = self.failures.lock().unwrap();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(RepositoryError::Conflict("unavailable".to_owned()));
                }
            }
            self.inner.save(identity, items).await
        }

        async fn delete(&self, identity: &CartIdentity) -> Result<(), RepositoryError> {
            self.inner.delete(identity).await
        }
    }

    fn item(product: &str) -> LineItem {
        use tierline_core::pricing::PriceSchedule;
        use tierline_core::{Money, ProductId, Quantity};

        LineItem {
            product_id: ProductId::new(product),
            variant_id: None,
            name: product.to_owned(),
            variant_title: None,
            image_url: None,
            quantity: Quantity::new(1).unwrap(),
            pricing: PriceSchedule::flat(Money::from_cents(500)),
        }
    }

    #[tokio::test]
    async fn test_write_back_serves_unsynced_lines_until_next_save() {
        let flaky = Arc::new(FlakySaves::new(1));
        let store = WriteBackCartStore::new(flaky.clone());
        let guest = CartIdentity::Guest(GuestSessionId::new("g-1"));

        assert!(store.save(&guest, &[item("a")]).await.is_err());
        assert!(store.is_unsynced(&guest));
        assert_eq!(flaky.inner.load(&guest).await.unwrap(), None);
        assert_eq!(store.load(&guest).await.unwrap(), Some(vec![item("a")]));

        store.save(&guest, &[item("a"), item("b")]).await.unwrap();
        assert!(!store.is_unsynced(&guest));
        assert_eq!(
            flaky.inner.load(&guest).await.unwrap(),
            Some(vec![item("a"), item("b")])
        );
    }

    #[tokio::test]
    async fn test_write_back_delete_drops_unsynced_lines() {
        let store = WriteBackCartStore::new(Arc::new(FlakySaves::new(1)));
        let guest = CartIdentity::Guest(GuestSessionId::new("g-1"));

        assert!(store.save(&guest, &[item("a")]).await.is_err());
        store.delete(&guest).await.unwrap();
        assert!(!store.is_unsynced(&guest));
        assert_eq!(store.load(&guest).await.unwrap(), None);
    }

    #[test]
    fn test_corrupt_items_are_reported() {
        let err = decode_items(serde_json::json!([{"productId": 5}])).unwrap_err();
        assert!(matches!(err, RepositoryError::DataCorruption(_)));
    }
}
