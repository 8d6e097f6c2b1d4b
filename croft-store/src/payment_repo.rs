use async_trait::async_trait;
use chrono::{DateTime, Utc};
use croft_core::payment::{Payment, PaymentStatus, Provider, Refund};
use croft_core::repository::{PaymentStore, WebhookEventStore};
use croft_core::{Error, Result};
use croft_shared::Cents;
use sqlx::PgPool;
use uuid::Uuid;

use crate::pg_err;

pub struct PgPaymentStore {
    pool: PgPool,
}

impl PgPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    order_id: Uuid,
    provider: String,
    provider_payment_id: String,
    amount_cents: i64,
    currency: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl PaymentRow {
    fn into_payment(self) -> Result<Payment> {
        Ok(Payment {
            id: self.id,
            order_id: self.order_id,
            provider: Provider::from_db(&self.provider)?,
            provider_payment_id: self.provider_payment_id,
            amount_cents: self.amount_cents,
            currency: self.currency,
            status: PaymentStatus::from_db(&self.status)?,
            created_at: self.created_at,
        })
    }
}

const PAYMENT_COLUMNS: &str =
    "id, order_id, provider, provider_payment_id, amount_cents, currency, status, created_at";

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn insert_payment(&self, payment: &Payment) -> Result<()> {
        sqlx::query(
            "INSERT INTO payments (id, order_id, provider, provider_payment_id, amount_cents, \
             currency, status, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(payment.id)
        .bind(payment.order_id)
        .bind(payment.provider.as_str())
        .bind(&payment.provider_payment_id)
        .bind(payment.amount_cents)
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(payment.created_at)
        .execute(&self.pool)
        .await
        .map_err(pg_err)?;
        Ok(())
    }

    async fn get_payment(&self, id: Uuid) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(pg_err)?;
        row.map(PaymentRow::into_payment).transpose()
    }

    async fn find_by_provider_id(
        &self,
        provider: Provider,
        provider_payment_id: &str,
    ) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE provider = $1 AND provider_payment_id = $2",
            PAYMENT_COLUMNS
        ))
        .bind(provider.as_str())
        .bind(provider_payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(pg_err)?;
        row.map(PaymentRow::into_payment).transpose()
    }

    async fn mark_status(&self, id: Uuid, status: PaymentStatus) -> Result<()> {
        let result = sqlx::query("UPDATE payments SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(pg_err)?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("Payment not found: {}", id)));
        }
        Ok(())
    }

    async fn refunded_total(&self, payment_id: Uuid) -> Result<Cents> {
        sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM refunds \
             WHERE payment_id = $1 AND status = 'succeeded'",
        )
        .bind(payment_id)
        .fetch_one(&self.pool)
        .await
        .map_err(pg_err)
    }

    /// Insert the refund with the over-refund bound re-checked under the
    /// payment row lock, so racing refunds cannot exceed the payment.
    async fn apply_refund(&self, refund: &Refund) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(pg_err)?;

        let amount_cents: Option<i64> =
            sqlx::query_scalar("SELECT amount_cents FROM payments WHERE id = $1 FOR UPDATE")
                .bind(refund.payment_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(pg_err)?;
        let amount_cents = amount_cents
            .ok_or_else(|| Error::not_found(format!("Payment not found: {}", refund.payment_id)))?;

        let already: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM refunds \
             WHERE payment_id = $1 AND status = 'succeeded'",
        )
        .bind(refund.payment_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(pg_err)?;

        if already + refund.amount_cents > amount_cents {
            return Err(Error::validation("Refund amount exceeds payment"));
        }

        sqlx::query(
            "INSERT INTO refunds (id, payment_id, amount_cents, reason, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(refund.id)
        .bind(refund.payment_id)
        .bind(refund.amount_cents)
        .bind(&refund.reason)
        .bind(refund.status.as_str())
        .bind(refund.created_at)
        .execute(&mut *tx)
        .await
        .map_err(pg_err)?;

        tx.commit().await.map_err(pg_err)
    }
}

/// Processed-event ledger; the composite primary key makes duplicate
/// webhook deliveries a guaranteed no-op.
pub struct PgWebhookEventStore {
    pool: PgPool,
}

impl PgWebhookEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookEventStore for PgWebhookEventStore {
    async fn record_event(&self, provider: Provider, event_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO webhook_events (provider, event_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(provider.as_str())
        .bind(event_id)
        .execute(&self.pool)
        .await
        .map_err(pg_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn forget_event(&self, provider: Provider, event_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM webhook_events WHERE provider = $1 AND event_id = $2")
            .bind(provider.as_str())
            .bind(event_id)
            .execute(&self.pool)
            .await
            .map_err(pg_err)?;
        Ok(())
    }
}
