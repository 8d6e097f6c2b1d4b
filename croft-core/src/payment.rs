use async_trait::async_trait;
use chrono::{DateTime, Utc};
use croft_shared::Cents;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Payment provider tag stored on every payment row.
///
/// This is the only provider-specific value that leaves the adapter
/// boundary; nothing outside an adapter inspects vendor response shapes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provider {
    Stripe,
    Paypal,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Stripe => "STRIPE",
            Provider::Paypal => "PAYPAL",
        }
    }

    pub fn from_db(s: &str) -> Result<Self> {
        match s {
            "STRIPE" => Ok(Provider::Stripe),
            "PAYPAL" => Ok(Provider::Paypal),
            other => Err(crate::Error::persistence(format!(
                "unknown payment provider: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn from_db(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "succeeded" => Ok(PaymentStatus::Succeeded),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(crate::Error::persistence(format!(
                "unknown payment status: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Succeeded,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Pending => "pending",
            RefundStatus::Succeeded => "succeeded",
        }
    }

    pub fn from_db(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(RefundStatus::Pending),
            "succeeded" => Ok(RefundStatus::Succeeded),
            other => Err(crate::Error::persistence(format!(
                "unknown refund status: {}",
                other
            ))),
        }
    }
}

/// A charge attempt against one order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub provider: Provider,
    /// The provider's own identifier for the intent (e.g. pi_123).
    pub provider_payment_id: String,
    pub amount_cents: Cents,
    pub currency: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

/// A partial or full refund against a payment.
///
/// Invariant: the sum of refund amounts for a payment never exceeds the
/// payment amount; the store enforces this under the payment row lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refund {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub amount_cents: Cents,
    pub reason: String,
    pub status: RefundStatus,
    pub created_at: DateTime<Utc>,
}

/// Provider-specific continuation data handed back to the checkout flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "kind", content = "value")]
pub enum Continuation {
    /// Card-style providers: the client completes the charge in-page.
    ClientSecret(String),
    /// Redirect-style providers: the client is sent to the provider.
    ApprovalUrl(String),
}

/// Result of a successful intent creation, ready to return to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntent {
    pub payment_id: Uuid,
    pub provider: Provider,
    pub provider_payment_id: String,
    pub amount_cents: Cents,
    pub currency: String,
    pub continuation: Continuation,
}

/// Request passed to a provider adapter when creating an intent.
#[derive(Debug, Clone)]
pub struct IntentRequest {
    pub order_id: Uuid,
    pub amount_cents: Cents,
    pub currency: String,
}

/// What an adapter returns from intent creation.
#[derive(Debug, Clone)]
pub struct ProviderIntent {
    pub provider_payment_id: String,
    pub continuation: Continuation,
}

/// What an adapter returns from a successful confirm/capture call.
#[derive(Debug, Clone)]
pub struct ProviderCharge {
    pub provider_payment_id: String,
    pub amount_cents: Option<Cents>,
}

/// What an adapter returns from a successful refund call.
#[derive(Debug, Clone)]
pub struct ProviderRefund {
    pub provider_refund_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEventKind {
    PaymentSucceeded,
    PaymentFailed { message: String },
    RefundCompleted { amount_cents: Cents },
    /// Event types this core does not react to; still deduplicated.
    Other(String),
}

/// A provider notification after signature verification, normalized so the
/// reconciler never sees vendor shapes.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    /// Provider-assigned event id, the deduplication key.
    pub event_id: String,
    pub provider_payment_id: String,
    pub kind: WebhookEventKind,
}

/// Common capability set every payment provider adapter implements.
///
/// Adapters own all vendor specifics: request shapes, signature schemes,
/// error formats. Rejection messages are surfaced verbatim through
/// `Error::Payment`.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn kind(&self) -> Provider;

    /// Create a charge intent with the provider.
    async fn create_intent(&self, request: &IntentRequest) -> Result<ProviderIntent>;

    /// Confirm/capture a previously created intent. A provider rejection
    /// comes back as `Error::Payment` carrying the provider's message.
    async fn confirm(&self, provider_payment_id: &str) -> Result<ProviderCharge>;

    /// Refund part or all of a captured charge.
    async fn refund(
        &self,
        provider_payment_id: &str,
        amount_cents: Cents,
        reason: &str,
    ) -> Result<ProviderRefund>;

    /// Verify a webhook delivery and normalize its event. Must be free of
    /// side effects: a bad signature is `Error::Signature` and nothing else
    /// happens.
    async fn verify_webhook(&self, signature: &str, payload: &[u8]) -> Result<WebhookEvent>;
}
