//! In-memory store and mock provider for tests and local development.
//!
//! One mutex guards the whole state, standing in for the database
//! transaction: every multi-row operation below is atomic exactly the way
//! its Postgres counterpart is.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use croft_catalog::{InventoryStore, ProductInventory};
use croft_core::payment::{
    Continuation, IntentRequest, Payment, PaymentProvider, PaymentStatus, Provider,
    ProviderCharge, ProviderIntent, ProviderRefund, Refund, RefundStatus, WebhookEvent,
};
use croft_core::repository::{PaymentStore, WebhookEventStore};
use croft_core::{Error, Result};
use croft_shared::Cents;
use uuid::Uuid;

use crate::models::{
    FulfillmentStatus, NewOrder, Order, OrderFilter, OrderItem, OrderStatus, PaymentState,
    Shipment, ShipmentStatus, StatusHistoryEntry,
};
use crate::providers::{card_signature_header, parse_card_event};
use crate::repository::{OrderStore, ShipmentStore};
use crate::webhook::WebhookDelivery;

#[derive(Default)]
struct State {
    orders: HashMap<Uuid, Order>,
    inventory: HashMap<Uuid, ProductInventory>,
    payments: HashMap<Uuid, Payment>,
    refunds: Vec<Refund>,
    shipments: HashMap<Uuid, Shipment>,
    events: HashSet<(Provider, String)>,
    sequences: HashMap<i32, i64>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_inventory(&self, product_id: Uuid, quantity: i64) {
        self.state.lock().unwrap().inventory.insert(
            product_id,
            ProductInventory {
                product_id,
                quantity,
                reserved_quantity: 0,
            },
        );
    }

    pub fn inventory(&self, product_id: Uuid) -> ProductInventory {
        self.state
            .lock()
            .unwrap()
            .inventory
            .get(&product_id)
            .cloned()
            .expect("inventory row missing")
    }

    pub fn available(&self, product_id: Uuid) -> i64 {
        self.inventory(product_id).available_quantity()
    }

    pub fn order_count(&self) -> usize {
        self.state.lock().unwrap().orders.len()
    }

    pub fn event_count(&self) -> usize {
        self.state.lock().unwrap().events.len()
    }
}

fn reserve_line(
    inventory: &mut HashMap<Uuid, ProductInventory>,
    product_id: Uuid,
    quantity: i64,
) -> Result<()> {
    let item = inventory
        .get_mut(&product_id)
        .ok_or_else(|| Error::not_found(format!("Product not found: {}", product_id)))?;
    let available = item.available_quantity();
    if available < quantity {
        return Err(Error::InsufficientStock {
            product_id,
            requested: quantity,
            available,
        });
    }
    item.reserved_quantity += quantity;
    Ok(())
}

fn release_line(
    inventory: &mut HashMap<Uuid, ProductInventory>,
    product_id: Uuid,
    quantity: i64,
) -> Result<()> {
    let item = inventory
        .get_mut(&product_id)
        .ok_or_else(|| Error::not_found(format!("Product not found: {}", product_id)))?;
    item.reserved_quantity = (item.reserved_quantity - quantity).max(0);
    Ok(())
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn create_order(&self, order: NewOrder) -> Result<Order> {
        let mut state = self.state.lock().unwrap();

        // All-or-nothing: check every line before touching any counter.
        for item in &order.items {
            let available = state
                .inventory
                .get(&item.product_id)
                .map(|inv| inv.available_quantity())
                .ok_or_else(|| {
                    Error::not_found(format!("Product not found: {}", item.product_id))
                })?;
            if available < item.quantity {
                return Err(Error::InsufficientStock {
                    product_id: item.product_id,
                    requested: item.quantity,
                    available,
                });
            }
        }
        for item in &order.items {
            reserve_line(&mut state.inventory, item.product_id, item.quantity)?;
        }

        let year = Utc::now().year();
        let next = {
            let seq = state.sequences.entry(year).or_insert(0);
            *seq += 1;
            *seq
        };
        let order_number = format!("ORD-{}-{:03}", year, next);

        let id = Uuid::new_v4();
        let now = Utc::now();
        let record = Order {
            id,
            order_number,
            customer_id: order.customer_id,
            farm_id: order.farm_id,
            items: order
                .items
                .into_iter()
                .map(|item| OrderItem {
                    id: Uuid::new_v4(),
                    order_id: id,
                    product_id: item.product_id,
                    product_name: item.product_name,
                    quantity: item.quantity,
                    unit_price_cents: item.unit_price_cents,
                })
                .collect(),
            status: OrderStatus::Pending,
            payment_status: PaymentState::Pending,
            fulfillment_status: FulfillmentStatus::Unfulfilled,
            fulfillment_method: order.fulfillment_method,
            subtotal_cents: order.subtotal_cents,
            tax_cents: order.tax_cents,
            shipping_cents: order.shipping_cents,
            total_cents: order.total_cents,
            shipping_address: order.shipping_address,
            history: vec![StatusHistoryEntry {
                order_id: id,
                status: OrderStatus::Pending,
                changed_at: now,
            }],
            created_at: now,
            updated_at: now,
            cancelled_at: None,
            cancellation_reason: None,
        };
        state.orders.insert(id, record.clone());
        Ok(record)
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.state.lock().unwrap().orders.get(&id).cloned())
    }

    async fn update_status(&self, id: Uuid, new_status: OrderStatus) -> Result<Order> {
        let mut state = self.state.lock().unwrap();
        let order = state
            .orders
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("Order not found: {}", id)))?;
        if !order.status.can_transition_to(new_status) {
            return Err(Error::invalid_transition(
                order.status.as_str(),
                new_status.as_str(),
            ));
        }
        order.status = new_status;
        order.updated_at = Utc::now();
        order.history.push(StatusHistoryEntry {
            order_id: id,
            status: new_status,
            changed_at: order.updated_at,
        });
        Ok(order.clone())
    }

    async fn set_payment_state(&self, id: Uuid, payment_state: PaymentState) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let order = state
            .orders
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("Order not found: {}", id)))?;
        order.payment_status = payment_state;
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn set_fulfillment_status(&self, id: Uuid, status: FulfillmentStatus) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let order = state
            .orders
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("Order not found: {}", id)))?;
        order.fulfillment_status = status;
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn cancel_order(&self, id: Uuid, reason: &str) -> Result<Order> {
        let mut state = self.state.lock().unwrap();
        let order = state
            .orders
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("Order not found: {}", id)))?;
        if let Some(message) = order.status.cancellation_error() {
            return Err(Error::state(message));
        }
        for item in &order.items {
            release_line(&mut state.inventory, item.product_id, item.quantity)?;
        }

        let record = state.orders.get_mut(&id).unwrap();
        let now = Utc::now();
        record.status = OrderStatus::Cancelled;
        record.cancelled_at = Some(now);
        record.cancellation_reason = Some(reason.to_string());
        record.updated_at = now;
        record.history.push(StatusHistoryEntry {
            order_id: id,
            status: OrderStatus::Cancelled,
            changed_at: now,
        });
        Ok(record.clone())
    }

    async fn refund_order(&self, id: Uuid) -> Result<Order> {
        let mut state = self.state.lock().unwrap();
        let order = state
            .orders
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("Order not found: {}", id)))?;
        match order.status {
            OrderStatus::Pending => {
                return Err(Error::state("Cannot refund an unconfirmed order"));
            }
            // Goods already delivered or holds already released: record the
            // money side only.
            OrderStatus::Fulfilled | OrderStatus::Cancelled => {
                order.payment_status = PaymentState::Refunded;
            }
            OrderStatus::Refunded => {}
            OrderStatus::Confirmed | OrderStatus::Preparing | OrderStatus::Ready => {
                let now = Utc::now();
                order.status = OrderStatus::Refunded;
                order.payment_status = PaymentState::Refunded;
                order.updated_at = now;
                order.history.push(StatusHistoryEntry {
                    order_id: id,
                    status: OrderStatus::Refunded,
                    changed_at: now,
                });
            }
        }
        Ok(order.clone())
    }

    async fn mark_fulfilled(&self, id: Uuid) -> Result<Order> {
        let mut state = self.state.lock().unwrap();
        let order = state
            .orders
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("Order not found: {}", id)))?;
        match order.status {
            OrderStatus::Fulfilled => return Ok(order),
            OrderStatus::Cancelled | OrderStatus::Refunded => {
                return Err(Error::state(format!(
                    "Cannot fulfill order in status {}",
                    order.status.as_str()
                )));
            }
            _ => {}
        }

        // Convert the soft hold into a permanent deduction.
        for item in &order.items {
            if let Some(inv) = state.inventory.get_mut(&item.product_id) {
                inv.quantity -= item.quantity;
                inv.reserved_quantity = (inv.reserved_quantity - item.quantity).max(0);
            }
        }

        let record = state.orders.get_mut(&id).unwrap();
        let now = Utc::now();
        record.status = OrderStatus::Fulfilled;
        record.fulfillment_status = FulfillmentStatus::Delivered;
        record.updated_at = now;
        record.history.push(StatusHistoryEntry {
            order_id: id,
            status: OrderStatus::Fulfilled,
            changed_at: now,
        });
        Ok(record.clone())
    }

    async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<Order>> {
        let state = self.state.lock().unwrap();
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|order| {
                filter
                    .customer_id
                    .map_or(true, |id| order.customer_id == id)
                    && filter.farm_id.map_or(true, |id| order.farm_id == id)
                    && filter.status.map_or(true, |status| order.status == status)
            })
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn get(&self, product_id: Uuid) -> Result<Option<ProductInventory>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .inventory
            .get(&product_id)
            .cloned())
    }

    async fn reserve(&self, product_id: Uuid, quantity: i64) -> Result<()> {
        reserve_line(
            &mut self.state.lock().unwrap().inventory,
            product_id,
            quantity,
        )
    }

    async fn release(&self, product_id: Uuid, quantity: i64) -> Result<()> {
        release_line(
            &mut self.state.lock().unwrap().inventory,
            product_id,
            quantity,
        )
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn insert_payment(&self, payment: &Payment) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .payments
            .insert(payment.id, payment.clone());
        Ok(())
    }

    async fn get_payment(&self, id: Uuid) -> Result<Option<Payment>> {
        Ok(self.state.lock().unwrap().payments.get(&id).cloned())
    }

    async fn find_by_provider_id(
        &self,
        provider: Provider,
        provider_payment_id: &str,
    ) -> Result<Option<Payment>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .payments
            .values()
            .find(|p| p.provider == provider && p.provider_payment_id == provider_payment_id)
            .cloned())
    }

    async fn mark_status(&self, id: Uuid, status: PaymentStatus) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let payment = state
            .payments
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("Payment not found: {}", id)))?;
        payment.status = status;
        Ok(())
    }

    async fn refunded_total(&self, payment_id: Uuid) -> Result<Cents> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .refunds
            .iter()
            .filter(|r| r.payment_id == payment_id && r.status == RefundStatus::Succeeded)
            .map(|r| r.amount_cents)
            .sum())
    }

    async fn apply_refund(&self, refund: &Refund) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let payment = state
            .payments
            .get(&refund.payment_id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("Payment not found: {}", refund.payment_id)))?;
        let already: Cents = state
            .refunds
            .iter()
            .filter(|r| r.payment_id == refund.payment_id && r.status == RefundStatus::Succeeded)
            .map(|r| r.amount_cents)
            .sum();
        if already + refund.amount_cents > payment.amount_cents {
            return Err(Error::validation("Refund amount exceeds payment"));
        }
        state.refunds.push(refund.clone());
        Ok(())
    }
}

#[async_trait]
impl WebhookEventStore for MemoryStore {
    async fn record_event(&self, provider: Provider, event_id: &str) -> Result<bool> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .events
            .insert((provider, event_id.to_string())))
    }

    async fn forget_event(&self, provider: Provider, event_id: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .events
            .remove(&(provider, event_id.to_string()));
        Ok(())
    }
}

#[async_trait]
impl ShipmentStore for MemoryStore {
    async fn insert_shipment(&self, shipment: &Shipment) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .shipments
            .insert(shipment.id, shipment.clone());
        Ok(())
    }

    async fn get_shipment(&self, id: Uuid) -> Result<Option<Shipment>> {
        Ok(self.state.lock().unwrap().shipments.get(&id).cloned())
    }

    async fn update_status(&self, id: Uuid, status: ShipmentStatus) -> Result<Shipment> {
        let mut state = self.state.lock().unwrap();
        let shipment = state
            .shipments
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("Shipment not found: {}", id)))?;
        if !shipment.status.can_transition_to(status) {
            return Err(Error::state(format!(
                "Invalid shipment status transition from {} to {}",
                shipment.status.as_str(),
                status.as_str()
            )));
        }
        shipment.status = status;
        shipment.updated_at = Utc::now();
        Ok(shipment.clone())
    }
}

/// Scripted provider adapter: succeeds by default, declines on demand.
/// Webhook deliveries use the real card signature scheme so tests exercise
/// the production verifier.
pub struct MockPaymentProvider {
    kind: Provider,
    webhook_secret: String,
    decline_next: Mutex<Option<String>>,
}

impl MockPaymentProvider {
    pub fn new(kind: Provider) -> Self {
        Self {
            kind,
            webhook_secret: "whsec_test".to_string(),
            decline_next: Mutex::new(None),
        }
    }

    /// Make the next confirm call fail with the given provider message.
    pub fn decline_next(&self, message: &str) {
        *self.decline_next.lock().unwrap() = Some(message.to_string());
    }

    /// Build a correctly signed delivery for a card-shaped event payload.
    pub fn signed_delivery(&self, event_id: &str, payload: &str) -> WebhookDelivery {
        debug_assert!(payload.contains(event_id), "payload must carry its event id");
        WebhookDelivery {
            provider: self.kind,
            signature: card_signature_header(
                &self.webhook_secret,
                Utc::now().timestamp(),
                payload.as_bytes(),
            ),
            payload: payload.as_bytes().to_vec(),
        }
    }

    fn verify(&self, signature: &str, payload: &[u8]) -> Result<()> {
        // Recompute over the delivered payload with the same scheme the
        // card gateway uses.
        let timestamp = signature
            .split(',')
            .find_map(|part| part.strip_prefix("t="))
            .ok_or_else(|| Error::signature("malformed signature header"))?;
        let timestamp: i64 = timestamp
            .parse()
            .map_err(|_| Error::signature("malformed signature header"))?;
        let expected = card_signature_header(&self.webhook_secret, timestamp, payload);
        if expected != signature {
            return Err(Error::signature("signature mismatch"));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    fn kind(&self) -> Provider {
        self.kind
    }

    async fn create_intent(&self, request: &IntentRequest) -> Result<ProviderIntent> {
        let provider_payment_id = format!("mock_pi_{}", request.order_id.simple());
        let continuation = match self.kind {
            Provider::Stripe => {
                Continuation::ClientSecret(format!("{}_secret", provider_payment_id))
            }
            Provider::Paypal => Continuation::ApprovalUrl(format!(
                "https://checkout.example.test/approve/{}",
                provider_payment_id
            )),
        };
        Ok(ProviderIntent {
            provider_payment_id,
            continuation,
        })
    }

    async fn confirm(&self, provider_payment_id: &str) -> Result<ProviderCharge> {
        if let Some(message) = self.decline_next.lock().unwrap().take() {
            return Err(Error::payment(message));
        }
        Ok(ProviderCharge {
            provider_payment_id: provider_payment_id.to_string(),
            amount_cents: None,
        })
    }

    async fn refund(
        &self,
        _provider_payment_id: &str,
        _amount_cents: Cents,
        _reason: &str,
    ) -> Result<ProviderRefund> {
        Ok(ProviderRefund {
            provider_refund_id: format!("mock_re_{}", Uuid::new_v4().simple()),
        })
    }

    async fn verify_webhook(&self, signature: &str, payload: &[u8]) -> Result<WebhookEvent> {
        self.verify(signature, payload)?;
        parse_card_event(payload)
    }
}
