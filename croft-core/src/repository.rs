use async_trait::async_trait;
use croft_shared::Cents;
use uuid::Uuid;

use crate::error::Result;
use crate::payment::{Payment, PaymentStatus, Provider, Refund};

/// Persistence seam for payments and refunds.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert_payment(&self, payment: &Payment) -> Result<()>;

    async fn get_payment(&self, id: Uuid) -> Result<Option<Payment>>;

    async fn find_by_provider_id(
        &self,
        provider: Provider,
        provider_payment_id: &str,
    ) -> Result<Option<Payment>>;

    async fn mark_status(&self, id: Uuid, status: PaymentStatus) -> Result<()>;

    /// Sum of succeeded refund amounts recorded against a payment.
    async fn refunded_total(&self, payment_id: Uuid) -> Result<Cents>;

    /// Persist a refund and re-check the over-refund bound in one
    /// transaction, under the payment row lock. Fails with
    /// `Validation("Refund amount exceeds payment")` if the bound would be
    /// violated, leaving nothing written.
    async fn apply_refund(&self, refund: &Refund) -> Result<()>;
}

/// Processed-event ledger backing webhook idempotency.
#[async_trait]
pub trait WebhookEventStore: Send + Sync {
    /// Record a provider event id. Returns `false` when the id was already
    /// recorded (a duplicate delivery), in which case the caller applies
    /// nothing.
    async fn record_event(&self, provider: Provider, event_id: &str) -> Result<bool>;

    /// Drop a recorded event id so the provider's retry can reprocess it.
    /// Used only when applying a recorded event failed midway.
    async fn forget_event(&self, provider: Provider, event_id: &str) -> Result<()>;
}
