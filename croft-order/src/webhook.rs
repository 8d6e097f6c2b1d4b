use std::collections::HashMap;
use std::sync::Arc;

use croft_core::payment::{PaymentProvider, Provider, WebhookEventKind};
use croft_core::repository::WebhookEventStore;
use croft_core::{Error, Result};

use crate::orchestrator::PaymentOrchestrator;

/// A raw webhook delivery as received from the transport layer.
#[derive(Debug, Clone)]
pub struct WebhookDelivery {
    pub provider: Provider,
    pub signature: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied,
    /// The event id was already processed; nothing was done.
    Duplicate,
    /// A verified event type this core does not react to.
    Ignored,
}

/// Verifies and applies asynchronous provider events exactly once.
///
/// Verification is pure: a bad signature fails with `Error::Signature` and
/// produces no side effects, so the provider can safely retry. Valid events
/// are claimed in the processed-event ledger before being applied; the
/// unique key makes a duplicate delivery a guaranteed no-op. No lock is
/// held across any provider call - verification happens first, then the
/// local apply step.
pub struct WebhookReconciler {
    providers: HashMap<Provider, Arc<dyn PaymentProvider>>,
    events: Arc<dyn WebhookEventStore>,
    orchestrator: Arc<PaymentOrchestrator>,
}

impl WebhookReconciler {
    pub fn new(events: Arc<dyn WebhookEventStore>, orchestrator: Arc<PaymentOrchestrator>) -> Self {
        Self {
            providers: HashMap::new(),
            events,
            orchestrator,
        }
    }

    pub fn register(&mut self, adapter: Arc<dyn PaymentProvider>) {
        self.providers.insert(adapter.kind(), adapter);
    }

    pub async fn process_webhook(&self, delivery: WebhookDelivery) -> Result<WebhookOutcome> {
        let adapter = self.providers.get(&delivery.provider).ok_or_else(|| {
            Error::validation(format!(
                "Unsupported payment provider: {}",
                delivery.provider.as_str()
            ))
        })?;

        let event = adapter
            .verify_webhook(&delivery.signature, &delivery.payload)
            .await?;

        if !self
            .events
            .record_event(delivery.provider, &event.event_id)
            .await?
        {
            tracing::debug!(event_id = %event.event_id, "duplicate webhook delivery skipped");
            return Ok(WebhookOutcome::Duplicate);
        }

        let applied = match &event.kind {
            WebhookEventKind::PaymentSucceeded => {
                self.orchestrator
                    .apply_payment_succeeded(delivery.provider, &event.provider_payment_id)
                    .await
                    .map(|_| WebhookOutcome::Applied)
            }
            WebhookEventKind::PaymentFailed { message } => {
                self.orchestrator
                    .apply_payment_failed(delivery.provider, &event.provider_payment_id, message)
                    .await
                    .map(|_| WebhookOutcome::Applied)
            }
            WebhookEventKind::RefundCompleted { amount_cents } => {
                self.orchestrator
                    .apply_refund_completed(
                        delivery.provider,
                        &event.provider_payment_id,
                        *amount_cents,
                    )
                    .await
                    .map(|_| WebhookOutcome::Applied)
            }
            WebhookEventKind::Other(event_type) => {
                tracing::debug!(%event_type, "unhandled webhook event type");
                Ok(WebhookOutcome::Ignored)
            }
        };

        match applied {
            Ok(outcome) => {
                tracing::info!(event_id = %event.event_id, "webhook processed");
                Ok(outcome)
            }
            Err(err) => {
                // Give the event id back so the provider's retry is not
                // swallowed as a duplicate of a half-applied delivery.
                self.events
                    .forget_event(delivery.provider, &event.event_id)
                    .await?;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FulfillmentMethod, NewOrderItem, OrderStatus, PaymentState};
    use crate::service::{CreateOrderRequest, OrderService};
    use crate::testing::{MemoryStore, MockPaymentProvider};
    use croft_catalog::InventoryCoordinator;
    use croft_core::repository::PaymentStore;
    use uuid::Uuid;

    struct Fixture {
        store: Arc<MemoryStore>,
        orders: Arc<OrderService>,
        orchestrator: Arc<PaymentOrchestrator>,
        reconciler: WebhookReconciler,
        mock: Arc<MockPaymentProvider>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let orders = Arc::new(OrderService::new(
            store.clone(),
            InventoryCoordinator::new(store.clone()),
        ));
        let mock = Arc::new(MockPaymentProvider::new(Provider::Stripe));
        let mut orchestrator = PaymentOrchestrator::new(store.clone(), orders.clone());
        orchestrator.register(mock.clone());
        let orchestrator = Arc::new(orchestrator);
        let mut reconciler = WebhookReconciler::new(store.clone(), orchestrator.clone());
        reconciler.register(mock.clone());
        Fixture {
            store,
            orders,
            orchestrator,
            reconciler,
            mock,
        }
    }

    async fn order_with_intent(f: &Fixture) -> (crate::models::Order, String) {
        let product_id = Uuid::new_v4();
        f.store.put_inventory(product_id, 10);
        let order = f
            .orders
            .create_order(CreateOrderRequest {
                customer_id: Uuid::new_v4(),
                farm_id: Uuid::new_v4(),
                items: vec![NewOrderItem {
                    product_id,
                    product_name: "Purple Garlic".to_string(),
                    quantity: 3,
                    unit_price_cents: 400,
                }],
                fulfillment_method: FulfillmentMethod::FarmPickup,
                shipping_address: None,
                tax_cents: 96,
                shipping_cents: 0,
            })
            .await
            .unwrap();
        let intent = f
            .orchestrator
            .create_payment_intent(order.id, order.total_cents, "usd", Provider::Stripe)
            .await
            .unwrap();
        (order, intent.provider_payment_id)
    }

    #[tokio::test]
    async fn test_succeeded_event_confirms_order() {
        let f = fixture();
        let (order, provider_payment_id) = order_with_intent(&f).await;

        let delivery = f.mock.signed_delivery(
            "evt_1",
            &format!(
                r#"{{"id":"evt_1","type":"payment_intent.succeeded","data":{{"object":{{"id":"{}"}}}}}}"#,
                provider_payment_id
            ),
        );
        let outcome = f.reconciler.process_webhook(delivery).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Applied);

        let order = f.orders.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(order.payment_status, PaymentState::Paid);
    }

    #[tokio::test]
    async fn test_duplicate_event_is_a_noop() {
        let f = fixture();
        let (order, provider_payment_id) = order_with_intent(&f).await;

        let payload = format!(
            r#"{{"id":"evt_dup","type":"payment_intent.succeeded","data":{{"object":{{"id":"{}"}}}}}}"#,
            provider_payment_id
        );
        let first = f
            .reconciler
            .process_webhook(f.mock.signed_delivery("evt_dup", &payload))
            .await
            .unwrap();
        assert_eq!(first, WebhookOutcome::Applied);

        let second = f
            .reconciler
            .process_webhook(f.mock.signed_delivery("evt_dup", &payload))
            .await
            .unwrap();
        assert_eq!(second, WebhookOutcome::Duplicate);

        // Same end state as processing once.
        let order = f.orders.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(order.history.len(), 2);
    }

    #[tokio::test]
    async fn test_bad_signature_has_no_side_effects() {
        let f = fixture();
        let (order, provider_payment_id) = order_with_intent(&f).await;

        let mut delivery = f.mock.signed_delivery(
            "evt_forged",
            &format!(
                r#"{{"id":"evt_forged","type":"payment_intent.succeeded","data":{{"object":{{"id":"{}"}}}}}}"#,
                provider_payment_id
            ),
        );
        delivery.signature = "forged".to_string();

        let err = f.reconciler.process_webhook(delivery).await.unwrap_err();
        assert!(matches!(err, Error::Signature(_)));

        // Nothing recorded, nothing applied: the provider's retry with a
        // good signature must go through.
        let order = f.orders.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(f.store.event_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_event_keeps_order_pending() {
        let f = fixture();
        let (order, provider_payment_id) = order_with_intent(&f).await;

        let delivery = f.mock.signed_delivery(
            "evt_fail",
            &format!(
                r#"{{"id":"evt_fail","type":"payment_intent.payment_failed","data":{{"object":{{"id":"{}","last_payment_error":{{"message":"Your card was declined"}}}}}}}}"#,
                provider_payment_id
            ),
        );
        f.reconciler.process_webhook(delivery).await.unwrap();

        let order = f.orders.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, PaymentState::Failed);
    }

    #[tokio::test]
    async fn test_refund_event_records_refund_and_cascades() {
        let f = fixture();
        let (order, provider_payment_id) = order_with_intent(&f).await;
        f.orchestrator
            .confirm_payment(&provider_payment_id, Provider::Stripe)
            .await
            .unwrap();

        let delivery = f.mock.signed_delivery(
            "evt_refund",
            &format!(
                r#"{{"id":"evt_refund","type":"charge.refunded","data":{{"object":{{"id":"{}","amount_refunded":{}}}}}}}"#,
                provider_payment_id, order.total_cents
            ),
        );
        f.reconciler.process_webhook(delivery).await.unwrap();

        let order = f.orders.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Refunded);
        let payment = f
            .store
            .find_by_provider_id(Provider::Stripe, &provider_payment_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(f.store.refunded_total(payment.id).await.unwrap(), order.total_cents);
    }

    #[tokio::test]
    async fn test_unknown_event_type_is_ignored_but_deduplicated() {
        let f = fixture();
        let (_, provider_payment_id) = order_with_intent(&f).await;

        let payload = format!(
            r#"{{"id":"evt_other","type":"customer.updated","data":{{"object":{{"id":"{}"}}}}}}"#,
            provider_payment_id
        );
        let outcome = f
            .reconciler
            .process_webhook(f.mock.signed_delivery("evt_other", &payload))
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Ignored);

        let outcome = f
            .reconciler
            .process_webhook(f.mock.signed_delivery("evt_other", &payload))
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Duplicate);
    }

    #[tokio::test]
    async fn test_failed_apply_releases_event_id_for_retry() {
        let f = fixture();
        // Event references a payment that does not exist yet; apply fails.
        let payload = r#"{"id":"evt_early","type":"payment_intent.succeeded","data":{"object":{"id":"pi_unknown"}}}"#;
        let err = f
            .reconciler
            .process_webhook(f.mock.signed_delivery("evt_early", payload))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        // The id is free again, so a later retry can succeed.
        assert_eq!(f.store.event_count(), 0);
    }
}
