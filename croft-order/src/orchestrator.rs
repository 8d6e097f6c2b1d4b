use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use croft_core::payment::{
    IntentRequest, Payment, PaymentIntent, PaymentProvider, PaymentStatus, Provider, Refund,
    RefundStatus,
};
use croft_core::repository::PaymentStore;
use croft_core::{Error, Result};
use croft_shared::Cents;
use uuid::Uuid;

use crate::service::OrderService;

/// Smallest charge any provider will accept, in cents.
pub const MINIMUM_CHARGE_CENTS: Cents = 50;

#[derive(Debug, Clone)]
pub struct RefundRequest {
    pub payment_id: Uuid,
    pub amount_cents: Cents,
    pub reason: String,
}

/// Drives payment intents, confirmations and refunds across the registered
/// provider adapters.
///
/// Dispatch is purely on the stored provider tag; vendor response shapes
/// never cross the adapter boundary. Provider rejections are surfaced with
/// their message untouched, and a failed confirmation mutates nothing.
pub struct PaymentOrchestrator {
    providers: HashMap<Provider, Arc<dyn PaymentProvider>>,
    payments: Arc<dyn PaymentStore>,
    orders: Arc<OrderService>,
    minimum_charge_cents: Cents,
}

impl PaymentOrchestrator {
    pub fn new(payments: Arc<dyn PaymentStore>, orders: Arc<OrderService>) -> Self {
        Self {
            providers: HashMap::new(),
            payments,
            orders,
            minimum_charge_cents: MINIMUM_CHARGE_CENTS,
        }
    }

    pub fn with_minimum_charge(mut self, minimum_charge_cents: Cents) -> Self {
        self.minimum_charge_cents = minimum_charge_cents;
        self
    }

    pub fn register(&mut self, adapter: Arc<dyn PaymentProvider>) {
        self.providers.insert(adapter.kind(), adapter);
    }

    fn provider(&self, kind: Provider) -> Result<&Arc<dyn PaymentProvider>> {
        self.providers.get(&kind).ok_or_else(|| {
            Error::validation(format!("Unsupported payment provider: {}", kind.as_str()))
        })
    }

    /// Create an intent with the provider and persist the pending payment.
    /// Returns the provider-specific continuation (client secret or
    /// approval URL) for the checkout flow.
    pub async fn create_payment_intent(
        &self,
        order_id: Uuid,
        amount_cents: Cents,
        currency: &str,
        kind: Provider,
    ) -> Result<PaymentIntent> {
        if amount_cents <= 0 {
            return Err(Error::validation("Amount must be positive"));
        }
        if amount_cents < self.minimum_charge_cents {
            return Err(Error::validation("Amount below minimum"));
        }
        self.orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Order not found: {}", order_id)))?;

        let adapter = self.provider(kind)?;
        let intent = adapter
            .create_intent(&IntentRequest {
                order_id,
                amount_cents,
                currency: currency.to_string(),
            })
            .await?;

        let payment = Payment {
            id: Uuid::new_v4(),
            order_id,
            provider: kind,
            provider_payment_id: intent.provider_payment_id.clone(),
            amount_cents,
            currency: currency.to_string(),
            status: PaymentStatus::Pending,
            created_at: Utc::now(),
        };
        self.payments.insert_payment(&payment).await?;

        tracing::info!(
            order_id = %order_id,
            provider = kind.as_str(),
            provider_payment_id = %intent.provider_payment_id,
            "payment intent created"
        );
        Ok(PaymentIntent {
            payment_id: payment.id,
            provider: kind,
            provider_payment_id: intent.provider_payment_id,
            amount_cents,
            currency: currency.to_string(),
            continuation: intent.continuation,
        })
    }

    /// Confirm/capture a charge with the provider. On success the payment
    /// row moves to succeeded and the order is confirmed; on rejection the
    /// provider's message propagates unmodified and nothing changes.
    pub async fn confirm_payment(
        &self,
        provider_payment_id: &str,
        kind: Provider,
    ) -> Result<Payment> {
        let payment = self
            .payments
            .find_by_provider_id(kind, provider_payment_id)
            .await?
            .ok_or_else(|| {
                Error::not_found(format!("Payment not found: {}", provider_payment_id))
            })?;

        let adapter = self.provider(kind)?;
        adapter.confirm(provider_payment_id).await?;

        self.payments
            .mark_status(payment.id, PaymentStatus::Succeeded)
            .await?;
        self.orders.confirm_paid(payment.order_id).await?;

        tracing::info!(
            order_id = %payment.order_id,
            provider_payment_id,
            "payment confirmed"
        );
        Ok(Payment {
            status: PaymentStatus::Succeeded,
            ..payment
        })
    }

    /// Refund part or all of a succeeded payment. The refund amount is
    /// bounded by what remains after prior refunds; a full refund cascades
    /// to the order.
    pub async fn refund_payment(&self, request: RefundRequest) -> Result<Refund> {
        if request.amount_cents <= 0 {
            return Err(Error::validation("Amount must be positive"));
        }
        let payment = self
            .payments
            .get_payment(request.payment_id)
            .await?
            .ok_or_else(|| {
                Error::not_found(format!("Payment not found: {}", request.payment_id))
            })?;
        if payment.status != PaymentStatus::Succeeded {
            return Err(Error::state("Cannot refund a payment that has not succeeded"));
        }

        let already_refunded = self.payments.refunded_total(payment.id).await?;
        if request.amount_cents > payment.amount_cents - already_refunded {
            return Err(Error::validation("Refund amount exceeds payment"));
        }

        let adapter = self.provider(payment.provider)?;
        adapter
            .refund(
                &payment.provider_payment_id,
                request.amount_cents,
                &request.reason,
            )
            .await?;

        let refund = Refund {
            id: Uuid::new_v4(),
            payment_id: payment.id,
            amount_cents: request.amount_cents,
            reason: request.reason,
            status: RefundStatus::Succeeded,
            created_at: Utc::now(),
        };
        self.payments.apply_refund(&refund).await?;

        if already_refunded + refund.amount_cents >= payment.amount_cents {
            self.orders.apply_full_refund(payment.order_id).await?;
        }

        tracing::info!(
            payment_id = %payment.id,
            amount_cents = refund.amount_cents,
            "refund processed"
        );
        Ok(refund)
    }

    /// Webhook-driven: the provider settled the charge on its side. No
    /// provider round-trip; just the local cascade. Tolerates replays that
    /// slipped past event dedup (a succeeded payment stays succeeded).
    pub(crate) async fn apply_payment_succeeded(
        &self,
        kind: Provider,
        provider_payment_id: &str,
    ) -> Result<()> {
        let payment = self
            .payments
            .find_by_provider_id(kind, provider_payment_id)
            .await?
            .ok_or_else(|| {
                Error::not_found(format!("Payment not found: {}", provider_payment_id))
            })?;
        if payment.status == PaymentStatus::Succeeded {
            return Ok(());
        }
        self.payments
            .mark_status(payment.id, PaymentStatus::Succeeded)
            .await?;
        self.orders.confirm_paid(payment.order_id).await?;
        Ok(())
    }

    /// Webhook-driven: the charge failed on the provider's side.
    pub(crate) async fn apply_payment_failed(
        &self,
        kind: Provider,
        provider_payment_id: &str,
        message: &str,
    ) -> Result<()> {
        let payment = self
            .payments
            .find_by_provider_id(kind, provider_payment_id)
            .await?
            .ok_or_else(|| {
                Error::not_found(format!("Payment not found: {}", provider_payment_id))
            })?;
        self.payments
            .mark_status(payment.id, PaymentStatus::Failed)
            .await?;
        self.orders.payment_failed(payment.order_id).await?;
        tracing::warn!(provider_payment_id, message, "provider reported payment failure");
        Ok(())
    }

    /// Webhook-driven: the provider completed a refund it originated.
    /// Records the refund locally; a full refund cascades to the order.
    pub(crate) async fn apply_refund_completed(
        &self,
        kind: Provider,
        provider_payment_id: &str,
        amount_cents: Cents,
    ) -> Result<()> {
        let payment = self
            .payments
            .find_by_provider_id(kind, provider_payment_id)
            .await?
            .ok_or_else(|| {
                Error::not_found(format!("Payment not found: {}", provider_payment_id))
            })?;

        let already_refunded = self.payments.refunded_total(payment.id).await?;
        if amount_cents > payment.amount_cents - already_refunded {
            return Err(Error::validation("Refund amount exceeds payment"));
        }

        let refund = Refund {
            id: Uuid::new_v4(),
            payment_id: payment.id,
            amount_cents,
            reason: "provider-initiated refund".to_string(),
            status: RefundStatus::Succeeded,
            created_at: Utc::now(),
        };
        self.payments.apply_refund(&refund).await?;

        if already_refunded + amount_cents >= payment.amount_cents {
            self.orders.apply_full_refund(payment.order_id).await?;
        }
        Ok(())
    }
}
