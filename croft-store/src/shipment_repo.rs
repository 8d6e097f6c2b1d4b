use async_trait::async_trait;
use chrono::{DateTime, Utc};
use croft_core::{Error, Result};
use croft_order::models::{ServiceLevel, Shipment, ShipmentStatus};
use croft_order::repository::ShipmentStore;
use sqlx::PgPool;
use uuid::Uuid;

use crate::pg_err;

pub struct PgShipmentStore {
    pool: PgPool,
}

impl PgShipmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ShipmentRow {
    id: Uuid,
    order_id: Uuid,
    tracking_number: String,
    service_level: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ShipmentRow {
    fn into_shipment(self) -> Result<Shipment> {
        Ok(Shipment {
            id: self.id,
            order_id: self.order_id,
            tracking_number: self.tracking_number,
            service_level: ServiceLevel::from_db(&self.service_level)?,
            status: ShipmentStatus::from_db(&self.status)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const SHIPMENT_COLUMNS: &str =
    "id, order_id, tracking_number, service_level, status, created_at, updated_at";

#[async_trait]
impl ShipmentStore for PgShipmentStore {
    async fn insert_shipment(&self, shipment: &Shipment) -> Result<()> {
        sqlx::query(
            "INSERT INTO shipments (id, order_id, tracking_number, service_level, status, \
             created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(shipment.id)
        .bind(shipment.order_id)
        .bind(&shipment.tracking_number)
        .bind(shipment.service_level.as_str())
        .bind(shipment.status.as_str())
        .bind(shipment.created_at)
        .bind(shipment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(pg_err)?;
        Ok(())
    }

    async fn get_shipment(&self, id: Uuid) -> Result<Option<Shipment>> {
        let row = sqlx::query_as::<_, ShipmentRow>(&format!(
            "SELECT {} FROM shipments WHERE id = $1",
            SHIPMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(pg_err)?;
        row.map(ShipmentRow::into_shipment).transpose()
    }

    async fn update_status(&self, id: Uuid, status: ShipmentStatus) -> Result<Shipment> {
        let mut tx = self.pool.begin().await.map_err(pg_err)?;

        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM shipments WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(pg_err)?;
        let current = ShipmentStatus::from_db(
            &current.ok_or_else(|| Error::not_found(format!("Shipment not found: {}", id)))?,
        )?;
        if !current.can_transition_to(status) {
            return Err(Error::state(format!(
                "Invalid shipment status transition from {} to {}",
                current.as_str(),
                status.as_str()
            )));
        }

        sqlx::query("UPDATE shipments SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(pg_err)?;
        tx.commit().await.map_err(pg_err)?;

        let row = sqlx::query_as::<_, ShipmentRow>(&format!(
            "SELECT {} FROM shipments WHERE id = $1",
            SHIPMENT_COLUMNS
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(pg_err)?;
        row.into_shipment()
    }
}
