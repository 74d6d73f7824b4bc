//! Order persistence.
//!
//! `stripe_session_id` is unique. Insertion is insert-or-get, so replaying a
//! payment event never creates a second order, and the caller learns whether
//! this call created the row.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};

use tierline_core::order::{Address, FulfillmentUpdate, NewOrder, Order, OrderItem, OrderTotals};
use tierline_core::{Email, Money, OrderId, OrderStatus, PaymentSessionId, UserId};

use super::RepositoryError;

/// Result of an insert-or-get.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertedOrder {
    pub order: Order,
    /// `false` when an order for the session already existed.
    pub created: bool,
}

/// Port for order storage.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert unless an order for the same payment session exists.
    async fn insert_if_absent(&self, order: &NewOrder) -> Result<InsertedOrder, RepositoryError>;

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    async fn get_by_session(
        &self,
        session_id: &PaymentSessionId,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Apply a back-office fulfillment update.
    ///
    /// Returns `NotFound` for an unknown order and `Conflict` for a status
    /// change the current status does not allow.
    async fn update_fulfillment(
        &self,
        id: OrderId,
        update: FulfillmentUpdate,
    ) -> Result<Order, RepositoryError>;
}

const ORDER_COLUMNS: &str = "id, stripe_session_id, payment_intent_id, user_id, customer_email, \
     customer_name, items, shipping_address, billing_address, subtotal, discount, shipping, tax, \
     total, status, tracking_number, notes, created_at, updated_at";

#[derive(FromRow)]
struct OrderRow {
    id: i32,
    stripe_session_id: String,
    payment_intent_id: Option<String>,
    user_id: Option<i32>,
    customer_email: Option<String>,
    customer_name: Option<String>,
    items: Json<Vec<OrderItem>>,
    shipping_address: Json<Address>,
    billing_address: Json<Address>,
    subtotal: Decimal,
    discount: Decimal,
    shipping: Decimal,
    tax: Decimal,
    total: Decimal,
    status: OrderStatus,
    tracking_number: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let customer_email = row
            .customer_email
            .as_deref()
            .map(Email::parse)
            .transpose()
            .map_err(|e| {
                RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
            })?;

        Ok(Self {
            id: OrderId::new(row.id),
            payment_session_id: PaymentSessionId::new(row.stripe_session_id),
            payment_intent_id: row.payment_intent_id,
            user_id: row.user_id.map(UserId::new),
            customer_email,
            customer_name: row.customer_name,
            items: row.items.0,
            shipping_address: row.shipping_address.0,
            billing_address: row.billing_address.0,
            totals: OrderTotals {
                subtotal: Money::new(row.subtotal),
                discount: Money::new(row.discount),
                shipping: Money::new(row.shipping),
                tax: Money::new(row.tax),
                total: Money::new(row.total),
            },
            status: row.status,
            tracking_number: row.tracking_number,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// `PostgreSQL` order store (`storefront.orders`).
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert_if_absent(&self, order: &NewOrder) -> Result<InsertedOrder, RepositoryError> {
        let totals = order.totals;
        let inserted: Option<OrderRow> = sqlx::query_as(&format!(
            r"
            INSERT INTO storefront.orders (
                stripe_session_id, payment_intent_id, user_id, customer_email, customer_name,
                items, shipping_address, billing_address,
                subtotal, discount, shipping, tax, total
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (stripe_session_id) DO NOTHING
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(order.payment_session_id.as_str())
        .bind(order.payment_intent_id.as_deref())
        .bind(order.user_id.map(|id| id.as_i32()))
        .bind(order.customer_email.as_ref().map(Email::as_str))
        .bind(order.customer_name.as_deref())
        .bind(Json(&order.items))
        .bind(Json(&order.shipping_address))
        .bind(Json(&order.billing_address))
        .bind(totals.subtotal.amount())
        .bind(totals.discount.amount())
        .bind(totals.shipping.amount())
        .bind(totals.tax.amount())
        .bind(totals.total.amount())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(InsertedOrder {
                order: row.try_into()?,
                created: true,
            });
        }

        let existing = self
            .get_by_session(&order.payment_session_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        Ok(InsertedOrder {
            order: existing,
            created: false,
        })
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.orders WHERE id = $1"
        ))
        .bind(id.as_i32())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    async fn get_by_session(
        &self,
        session_id: &PaymentSessionId,
    ) -> Result<Option<Order>, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.orders WHERE stripe_session_id = $1"
        ))
        .bind(session_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    async fn update_fulfillment(
        &self,
        id: OrderId,
        update: FulfillmentUpdate,
    ) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_i32())
        .fetch_optional(&mut *tx)
        .await?;
        let mut order = Order::try_from(row.ok_or(RepositoryError::NotFound)?)?;

        order
            .apply_fulfillment(update, Utc::now())
            .map_err(|e| RepositoryError::Conflict(e.to_string()))?;

        sqlx::query(
            r"
            UPDATE storefront.orders
            SET status = $2, tracking_number = $3, notes = $4, updated_at = $5
            WHERE id = $1
            ",
        )
        .bind(id.as_i32())
        .bind(order.status)
        .bind(order.tracking_number.as_deref())
        .bind(order.notes.as_deref())
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(order)
    }
}

/// In-memory order store for tests and local runs without a database.
#[derive(Default)]
pub struct MemoryOrderStore {
    orders: Mutex<Vec<Order>>,
}

impl MemoryOrderStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.lock().map_or(0, |orders| orders.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> RepositoryError {
        RepositoryError::DataCorruption("order store lock poisoned".to_owned())
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert_if_absent(&self, order: &NewOrder) -> Result<InsertedOrder, RepositoryError> {
        let mut orders = self.orders.lock().map_err(|_| Self::poisoned())?;
        if let Some(existing) = orders
            .iter()
            .find(|o| o.payment_session_id == order.payment_session_id)
        {
            return Ok(InsertedOrder {
                order: existing.clone(),
                created: false,
            });
        }

        let next_id = i32::try_from(orders.len() + 1)
            .map_err(|_| RepositoryError::Conflict("order id space exhausted".to_owned()))?;
        let stored = Order::from_new(OrderId::new(next_id), order.clone(), Utc::now());
        orders.push(stored.clone());
        Ok(InsertedOrder {
            order: stored,
            created: true,
        })
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let orders = self.orders.lock().map_err(|_| Self::poisoned())?;
        Ok(orders.iter().find(|o| o.id == id).cloned())
    }

    async fn get_by_session(
        &self,
        session_id: &PaymentSessionId,
    ) -> Result<Option<Order>, RepositoryError> {
        let orders = self.orders.lock().map_err(|_| Self::poisoned())?;
        Ok(orders
            .iter()
            .find(|o| &o.payment_session_id == session_id)
            .cloned())
    }

    async fn update_fulfillment(
        &self,
        id: OrderId,
        update: FulfillmentUpdate,
    ) -> Result<Order, RepositoryError> {
        let mut orders = self.orders.lock().map_err(|_| Self::poisoned())?;
        let order = orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or(RepositoryError::NotFound)?;
        order
            .apply_fulfillment(update, Utc::now())
            .map_err(|e| RepositoryError::Conflict(e.to_string()))?;
        Ok(order.clone())
    }
}
