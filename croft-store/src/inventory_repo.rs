use async_trait::async_trait;
use croft_catalog::{InventoryStore, ProductInventory};
use croft_core::{Error, Result};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::pg_err;

#[derive(sqlx::FromRow)]
struct InventoryRow {
    product_id: Uuid,
    quantity: i64,
    reserved_quantity: i64,
}

impl From<InventoryRow> for ProductInventory {
    fn from(row: InventoryRow) -> Self {
        ProductInventory {
            product_id: row.product_id,
            quantity: row.quantity,
            reserved_quantity: row.reserved_quantity,
        }
    }
}

/// Reserve one line under the product row lock. Used inside the order
/// creation transaction so that all of an order's lines commit or none do.
pub(crate) async fn reserve_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    product_id: Uuid,
    quantity: i64,
) -> Result<()> {
    let row = sqlx::query_as::<_, InventoryRow>(
        "SELECT product_id, quantity, reserved_quantity FROM product_inventory \
         WHERE product_id = $1 FOR UPDATE",
    )
    .bind(product_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(pg_err)?
    .ok_or_else(|| Error::not_found(format!("Product not found: {}", product_id)))?;

    let available = row.quantity - row.reserved_quantity;
    if available < quantity {
        return Err(Error::InsufficientStock {
            product_id,
            requested: quantity,
            available,
        });
    }

    sqlx::query(
        "UPDATE product_inventory SET reserved_quantity = reserved_quantity + $2 \
         WHERE product_id = $1",
    )
    .bind(product_id)
    .bind(quantity)
    .execute(&mut **tx)
    .await
    .map_err(pg_err)?;
    Ok(())
}

/// Release one line, clamped at zero.
pub(crate) async fn release_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    product_id: Uuid,
    quantity: i64,
) -> Result<()> {
    sqlx::query(
        "UPDATE product_inventory \
         SET reserved_quantity = GREATEST(reserved_quantity - $2, 0) \
         WHERE product_id = $1",
    )
    .bind(product_id)
    .bind(quantity)
    .execute(&mut **tx)
    .await
    .map_err(pg_err)?;
    Ok(())
}

/// Convert a hold into a permanent deduction on delivery.
pub(crate) async fn consume_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    product_id: Uuid,
    quantity: i64,
) -> Result<()> {
    sqlx::query(
        "UPDATE product_inventory \
         SET quantity = quantity - $2, \
             reserved_quantity = GREATEST(reserved_quantity - $2, 0) \
         WHERE product_id = $1",
    )
    .bind(product_id)
    .bind(quantity)
    .execute(&mut **tx)
    .await
    .map_err(pg_err)?;
    Ok(())
}

pub struct PgInventoryStore {
    pool: PgPool,
}

impl PgInventoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InventoryStore for PgInventoryStore {
    async fn get(&self, product_id: Uuid) -> Result<Option<ProductInventory>> {
        let row = sqlx::query_as::<_, InventoryRow>(
            "SELECT product_id, quantity, reserved_quantity FROM product_inventory \
             WHERE product_id = $1",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(pg_err)?;
        Ok(row.map(ProductInventory::from))
    }

    /// Single-statement compare-and-swap: the availability check and the
    /// counter bump are one atomic UPDATE, so no lock is held when stock
    /// is short.
    async fn reserve(&self, product_id: Uuid, quantity: i64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE product_inventory SET reserved_quantity = reserved_quantity + $2 \
             WHERE product_id = $1 AND quantity - reserved_quantity >= $2",
        )
        .bind(product_id)
        .bind(quantity)
        .execute(&self.pool)
        .await
        .map_err(pg_err)?;

        if result.rows_affected() == 0 {
            return match self.get(product_id).await? {
                None => Err(Error::not_found(format!("Product not found: {}", product_id))),
                Some(inventory) => Err(Error::InsufficientStock {
                    product_id,
                    requested: quantity,
                    available: inventory.available_quantity(),
                }),
            };
        }
        Ok(())
    }

    async fn release(&self, product_id: Uuid, quantity: i64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE product_inventory \
             SET reserved_quantity = GREATEST(reserved_quantity - $2, 0) \
             WHERE product_id = $1",
        )
        .bind(product_id)
        .bind(quantity)
        .execute(&self.pool)
        .await
        .map_err(pg_err)?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("Product not found: {}", product_id)));
        }
        Ok(())
    }
}
