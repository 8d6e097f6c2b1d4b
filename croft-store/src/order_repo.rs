use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use croft_core::{Error, Result};
use croft_order::models::{
    FulfillmentMethod, FulfillmentStatus, NewOrder, Order, OrderFilter, OrderItem, OrderStatus,
    PaymentState, StatusHistoryEntry,
};
use croft_order::repository::OrderStore;
use croft_shared::Address;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::inventory_repo;
use crate::pg_err;

pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    customer_id: Uuid,
    farm_id: Uuid,
    status: String,
    payment_status: String,
    fulfillment_status: String,
    fulfillment_method: String,
    subtotal_cents: i64,
    tax_cents: i64,
    shipping_cents: i64,
    total_cents: i64,
    ship_street: Option<String>,
    ship_city: Option<String>,
    ship_state: Option<String>,
    ship_postal_code: Option<String>,
    ship_country: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    cancelled_at: Option<DateTime<Utc>>,
    cancellation_reason: Option<String>,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    product_name: String,
    quantity: i64,
    unit_price_cents: i64,
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    order_id: Uuid,
    status: String,
    changed_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ItemQtyRow {
    product_id: Uuid,
    quantity: i64,
}

impl OrderRow {
    fn into_order(
        self,
        items: Vec<OrderItem>,
        history: Vec<StatusHistoryEntry>,
    ) -> Result<Order> {
        let shipping_address = match (
            self.ship_street,
            self.ship_city,
            self.ship_state,
            self.ship_postal_code,
            self.ship_country,
        ) {
            (Some(street), Some(city), Some(state), Some(postal_code), Some(country)) => {
                Some(Address {
                    street,
                    city,
                    state,
                    postal_code,
                    country,
                })
            }
            _ => None,
        };

        Ok(Order {
            id: self.id,
            order_number: self.order_number,
            customer_id: self.customer_id,
            farm_id: self.farm_id,
            items,
            status: OrderStatus::from_db(&self.status)?,
            payment_status: PaymentState::from_db(&self.payment_status)?,
            fulfillment_status: FulfillmentStatus::from_db(&self.fulfillment_status)?,
            fulfillment_method: FulfillmentMethod::from_db(&self.fulfillment_method)?,
            subtotal_cents: self.subtotal_cents,
            tax_cents: self.tax_cents,
            shipping_cents: self.shipping_cents,
            total_cents: self.total_cents,
            shipping_address,
            history,
            created_at: self.created_at,
            updated_at: self.updated_at,
            cancelled_at: self.cancelled_at,
            cancellation_reason: self.cancellation_reason,
        })
    }
}

const ORDER_COLUMNS: &str = "id, order_number, customer_id, farm_id, status, payment_status, \
    fulfillment_status, fulfillment_method, subtotal_cents, tax_cents, shipping_cents, \
    total_cents, ship_street, ship_city, ship_state, ship_postal_code, ship_country, \
    created_at, updated_at, cancelled_at, cancellation_reason";

impl PgOrderStore {
    /// Lock the order row and return its current status, or NotFound.
    async fn lock_status(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> Result<OrderStatus> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(pg_err)?;
        OrderStatus::from_db(
            &status.ok_or_else(|| Error::not_found(format!("Order not found: {}", id)))?,
        )
    }

    async fn items_for(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> Result<Vec<ItemQtyRow>> {
        sqlx::query_as::<_, ItemQtyRow>(
            "SELECT product_id, quantity FROM order_items WHERE order_id = $1",
        )
        .bind(id)
        .fetch_all(&mut **tx)
        .await
        .map_err(pg_err)
    }

    async fn append_history(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        status: OrderStatus,
    ) -> Result<()> {
        sqlx::query("INSERT INTO order_status_history (order_id, status) VALUES ($1, $2)")
            .bind(id)
            .bind(status.as_str())
            .execute(&mut **tx)
            .await
            .map_err(pg_err)?;
        Ok(())
    }

    /// Attach items and history to a page of order rows.
    async fn assemble(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>> {
        let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();

        let item_rows = sqlx::query_as::<_, OrderItemRow>(
            "SELECT id, order_id, product_id, product_name, quantity, unit_price_cents \
             FROM order_items WHERE order_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(pg_err)?;

        let history_rows = sqlx::query_as::<_, HistoryRow>(
            "SELECT order_id, status, changed_at FROM order_status_history \
             WHERE order_id = ANY($1) ORDER BY changed_at ASC, id ASC",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(pg_err)?;

        let mut items_by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in item_rows {
            items_by_order.entry(row.order_id).or_default().push(OrderItem {
                id: row.id,
                order_id: row.order_id,
                product_id: row.product_id,
                product_name: row.product_name,
                quantity: row.quantity,
                unit_price_cents: row.unit_price_cents,
            });
        }

        let mut history_by_order: HashMap<Uuid, Vec<StatusHistoryEntry>> = HashMap::new();
        for row in history_rows {
            history_by_order
                .entry(row.order_id)
                .or_default()
                .push(StatusHistoryEntry {
                    order_id: row.order_id,
                    status: OrderStatus::from_db(&row.status)?,
                    changed_at: row.changed_at,
                });
        }

        rows.into_iter()
            .map(|row| {
                let items = items_by_order.remove(&row.id).unwrap_or_default();
                let history = history_by_order.remove(&row.id).unwrap_or_default();
                row.into_order(items, history)
            })
            .collect()
    }

    async fn fetch_order(&self, id: Uuid) -> Result<Order> {
        self.get_order(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Order not found: {}", id)))
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create_order(&self, order: NewOrder) -> Result<Order> {
        let mut tx = self.pool.begin().await.map_err(pg_err)?;

        // Lock product rows in a stable order so concurrent orders sharing
        // products cannot deadlock. All-or-nothing: the first shortfall
        // rolls the whole transaction back.
        let mut lines: Vec<(Uuid, i64)> = order
            .items
            .iter()
            .map(|item| (item.product_id, item.quantity))
            .collect();
        lines.sort_by_key(|(product_id, _)| *product_id);
        for (product_id, quantity) in &lines {
            inventory_repo::reserve_in_tx(&mut tx, *product_id, *quantity).await?;
        }

        let year = Utc::now().year();
        let seq: i64 = sqlx::query_scalar(
            "INSERT INTO order_sequences (year, last_value) VALUES ($1, 1) \
             ON CONFLICT (year) DO UPDATE SET last_value = order_sequences.last_value + 1 \
             RETURNING last_value",
        )
        .bind(year)
        .fetch_one(&mut *tx)
        .await
        .map_err(pg_err)?;
        let order_number = format!("ORD-{}-{:03}", year, seq);

        let order_id = Uuid::new_v4();
        let address = order.shipping_address.as_ref();
        sqlx::query(
            "INSERT INTO orders (id, order_number, customer_id, farm_id, status, \
             payment_status, fulfillment_status, fulfillment_method, subtotal_cents, \
             tax_cents, shipping_cents, total_cents, ship_street, ship_city, ship_state, \
             ship_postal_code, ship_country) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
        )
        .bind(order_id)
        .bind(&order_number)
        .bind(order.customer_id)
        .bind(order.farm_id)
        .bind(OrderStatus::Pending.as_str())
        .bind(PaymentState::Pending.as_str())
        .bind(FulfillmentStatus::Unfulfilled.as_str())
        .bind(order.fulfillment_method.as_str())
        .bind(order.subtotal_cents)
        .bind(order.tax_cents)
        .bind(order.shipping_cents)
        .bind(order.total_cents)
        .bind(address.map(|a| a.street.clone()))
        .bind(address.map(|a| a.city.clone()))
        .bind(address.map(|a| a.state.clone()))
        .bind(address.map(|a| a.postal_code.clone()))
        .bind(address.map(|a| a.country.clone()))
        .execute(&mut *tx)
        .await
        .map_err(pg_err)?;

        for item in &order.items {
            sqlx::query(
                "INSERT INTO order_items (id, order_id, product_id, product_name, quantity, \
                 unit_price_cents) VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(Uuid::new_v4())
            .bind(order_id)
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .execute(&mut *tx)
            .await
            .map_err(pg_err)?;
        }

        self.append_history(&mut tx, order_id, OrderStatus::Pending)
            .await?;

        tx.commit().await.map_err(pg_err)?;
        self.fetch_order(order_id).await
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE id = $1",
            ORDER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(pg_err)?;

        match row {
            Some(row) => Ok(self.assemble(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn update_status(&self, id: Uuid, new_status: OrderStatus) -> Result<Order> {
        let mut tx = self.pool.begin().await.map_err(pg_err)?;
        let current = self.lock_status(&mut tx, id).await?;
        if !current.can_transition_to(new_status) {
            return Err(Error::invalid_transition(
                current.as_str(),
                new_status.as_str(),
            ));
        }

        sqlx::query("UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(new_status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(pg_err)?;
        self.append_history(&mut tx, id, new_status).await?;

        tx.commit().await.map_err(pg_err)?;
        self.fetch_order(id).await
    }

    async fn set_payment_state(&self, id: Uuid, state: PaymentState) -> Result<()> {
        let result =
            sqlx::query("UPDATE orders SET payment_status = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(state.as_str())
                .execute(&self.pool)
                .await
                .map_err(pg_err)?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("Order not found: {}", id)));
        }
        Ok(())
    }

    async fn set_fulfillment_status(&self, id: Uuid, status: FulfillmentStatus) -> Result<()> {
        let result = sqlx::query(
            "UPDATE orders SET fulfillment_status = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(pg_err)?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("Order not found: {}", id)));
        }
        Ok(())
    }

    async fn cancel_order(&self, id: Uuid, reason: &str) -> Result<Order> {
        let mut tx = self.pool.begin().await.map_err(pg_err)?;
        let current = self.lock_status(&mut tx, id).await?;
        if let Some(message) = current.cancellation_error() {
            return Err(Error::state(message));
        }

        for item in self.items_for(&mut tx, id).await? {
            inventory_repo::release_in_tx(&mut tx, item.product_id, item.quantity).await?;
        }

        sqlx::query(
            "UPDATE orders SET status = $2, cancelled_at = NOW(), cancellation_reason = $3, \
             updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(OrderStatus::Cancelled.as_str())
        .bind(reason)
        .execute(&mut *tx)
        .await
        .map_err(pg_err)?;
        self.append_history(&mut tx, id, OrderStatus::Cancelled)
            .await?;

        tx.commit().await.map_err(pg_err)?;
        self.fetch_order(id).await
    }

    async fn refund_order(&self, id: Uuid) -> Result<Order> {
        let mut tx = self.pool.begin().await.map_err(pg_err)?;
        let current = self.lock_status(&mut tx, id).await?;

        match current {
            OrderStatus::Pending => {
                return Err(Error::state("Cannot refund an unconfirmed order"));
            }
            // Goods already delivered or holds already released: record the
            // money side only.
            OrderStatus::Fulfilled | OrderStatus::Cancelled => {
                sqlx::query(
                    "UPDATE orders SET payment_status = $2, updated_at = NOW() WHERE id = $1",
                )
                .bind(id)
                .bind(PaymentState::Refunded.as_str())
                .execute(&mut *tx)
                .await
                .map_err(pg_err)?;
            }
            OrderStatus::Refunded => {}
            OrderStatus::Confirmed | OrderStatus::Preparing | OrderStatus::Ready => {
                sqlx::query(
                    "UPDATE orders SET status = $2, payment_status = $3, updated_at = NOW() \
                     WHERE id = $1",
                )
                .bind(id)
                .bind(OrderStatus::Refunded.as_str())
                .bind(PaymentState::Refunded.as_str())
                .execute(&mut *tx)
                .await
                .map_err(pg_err)?;
                self.append_history(&mut tx, id, OrderStatus::Refunded)
                    .await?;
            }
        }

        tx.commit().await.map_err(pg_err)?;
        self.fetch_order(id).await
    }

    async fn mark_fulfilled(&self, id: Uuid) -> Result<Order> {
        let mut tx = self.pool.begin().await.map_err(pg_err)?;
        let current = self.lock_status(&mut tx, id).await?;
        match current {
            OrderStatus::Fulfilled => return self.fetch_order(id).await,
            OrderStatus::Cancelled | OrderStatus::Refunded => {
                return Err(Error::state(format!(
                    "Cannot fulfill order in status {}",
                    current.as_str()
                )));
            }
            _ => {}
        }

        // Convert each hold into a permanent deduction.
        for item in self.items_for(&mut tx, id).await? {
            inventory_repo::consume_in_tx(&mut tx, item.product_id, item.quantity).await?;
        }

        sqlx::query(
            "UPDATE orders SET status = $2, fulfillment_status = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(OrderStatus::Fulfilled.as_str())
        .bind(FulfillmentStatus::Delivered.as_str())
        .execute(&mut *tx)
        .await
        .map_err(pg_err)?;
        self.append_history(&mut tx, id, OrderStatus::Fulfilled)
            .await?;

        tx.commit().await.map_err(pg_err)?;
        self.fetch_order(id).await
    }

    async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders \
             WHERE ($1::uuid IS NULL OR customer_id = $1) \
               AND ($2::uuid IS NULL OR farm_id = $2) \
               AND ($3::text IS NULL OR status = $3) \
             ORDER BY created_at DESC \
             LIMIT $4 OFFSET $5",
            ORDER_COLUMNS
        ))
        .bind(filter.customer_id)
        .bind(filter.farm_id)
        .bind(filter.status.map(|status| status.as_str()))
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(pg_err)?;

        self.assemble(rows).await
    }
}
