use std::sync::Arc;

use croft_catalog::InventoryCoordinator;
use croft_core::{Error, Result};
use croft_shared::{Address, Cents};
use uuid::Uuid;

use crate::finance::OrderTotals;
use crate::models::{
    FulfillmentMethod, FulfillmentStatus, NewOrder, NewOrderItem, Order, OrderFilter, OrderStatus,
    PaymentState,
};
use crate::repository::OrderStore;

const MAX_PAGE_SIZE: i64 = 100;
const DEFAULT_PAGE_SIZE: i64 = 20;

#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub customer_id: Uuid,
    pub farm_id: Uuid,
    pub items: Vec<NewOrderItem>,
    pub fulfillment_method: FulfillmentMethod,
    pub shipping_address: Option<Address>,
    pub tax_cents: Cents,
    pub shipping_cents: Cents,
}

/// Pagination and status filter for order listings.
#[derive(Debug, Clone)]
pub struct ListOptions {
    pub status: Option<OrderStatus>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            status: None,
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

/// Top-level orchestrator of the order lifecycle.
///
/// Validates input, drives the store's transactional operations, and owns
/// the follow-ups that cross component boundaries (reservation release on
/// refund, the paid/failed cascades from the payment side).
pub struct OrderService {
    orders: Arc<dyn OrderStore>,
    inventory: InventoryCoordinator,
}

impl OrderService {
    pub fn new(orders: Arc<dyn OrderStore>, inventory: InventoryCoordinator) -> Self {
        Self { orders, inventory }
    }

    /// Create an order in PENDING with its inventory already reserved.
    ///
    /// Validation happens before any write; the reservation and the insert
    /// share one store transaction, so either the order exists with every
    /// hold in place or nothing happened at all.
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<Order> {
        if request.items.is_empty() {
            return Err(Error::validation("Order must contain at least one item"));
        }
        for item in &request.items {
            if item.quantity <= 0 {
                return Err(Error::validation("Invalid quantity"));
            }
            if item.unit_price_cents < 0 {
                return Err(Error::validation("Invalid unit price"));
            }
        }
        if request.fulfillment_method == FulfillmentMethod::Delivery
            && request.shipping_address.is_none()
        {
            return Err(Error::validation("Delivery address required"));
        }

        let totals = OrderTotals::compute(
            &request.items,
            request.tax_cents,
            request.shipping_cents,
            request.fulfillment_method,
        );
        totals.verify()?;

        let order = self
            .orders
            .create_order(NewOrder {
                customer_id: request.customer_id,
                farm_id: request.farm_id,
                items: request.items,
                fulfillment_method: request.fulfillment_method,
                subtotal_cents: totals.subtotal_cents,
                tax_cents: totals.tax_cents,
                shipping_cents: totals.shipping_cents,
                total_cents: totals.total_cents,
                shipping_address: request.shipping_address,
            })
            .await?;

        tracing::info!(order_id = %order.id, order_number = %order.order_number, "order created");
        Ok(order)
    }

    pub async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        self.orders.get_order(id).await
    }

    /// Caller-driven status change, validated against the state machine.
    pub async fn update_order_status(&self, id: Uuid, new_status: OrderStatus) -> Result<Order> {
        let order = self.orders.update_status(id, new_status).await?;
        tracing::info!(order_id = %id, status = new_status.as_str(), "order status updated");
        Ok(order)
    }

    /// Cancel a PENDING or CONFIRMED order, releasing every reservation.
    pub async fn cancel_order(&self, id: Uuid, reason: &str) -> Result<Order> {
        let order = self.orders.cancel_order(id, reason).await?;
        tracing::info!(order_id = %id, reason, "order cancelled");
        Ok(order)
    }

    pub async fn get_user_orders(&self, customer_id: Uuid, options: ListOptions) -> Result<Vec<Order>> {
        self.orders
            .list_orders(OrderFilter {
                customer_id: Some(customer_id),
                farm_id: None,
                status: options.status,
                limit: clamp_limit(options.limit),
                offset: options.offset.max(0),
            })
            .await
    }

    pub async fn get_farm_orders(&self, farm_id: Uuid, options: ListOptions) -> Result<Vec<Order>> {
        self.orders
            .list_orders(OrderFilter {
                customer_id: None,
                farm_id: Some(farm_id),
                status: options.status,
                limit: clamp_limit(options.limit),
                offset: options.offset.max(0),
            })
            .await
    }

    /// Payment-side cascade: the charge for this order succeeded.
    ///
    /// Idempotent with respect to duplicate confirmations: an order that is
    /// already CONFIRMED (or further along) only has its payment state
    /// refreshed.
    pub async fn confirm_paid(&self, order_id: Uuid) -> Result<Order> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Order not found: {}", order_id)))?;

        let order = if order.status == OrderStatus::Pending {
            self.orders
                .update_status(order_id, OrderStatus::Confirmed)
                .await?
        } else {
            order
        };
        self.orders
            .set_payment_state(order_id, PaymentState::Paid)
            .await?;
        tracing::info!(order_id = %order_id, "order confirmed after payment");
        Ok(order)
    }

    /// Payment-side cascade: the charge was declined or failed async.
    /// The order stays PENDING with inventory held so the customer can try
    /// another payment method.
    pub async fn payment_failed(&self, order_id: Uuid) -> Result<()> {
        self.orders
            .set_payment_state(order_id, PaymentState::Failed)
            .await?;
        tracing::warn!(order_id = %order_id, "payment failed; order left pending");
        Ok(())
    }

    /// Payment-side cascade: refunds have reached the full payment amount.
    /// Moves the order to REFUNDED (unless already fulfilled) and rolls the
    /// reservations back through the inventory coordinator.
    pub async fn apply_full_refund(&self, order_id: Uuid) -> Result<Order> {
        let existing = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Order not found: {}", order_id)))?;
        // Already rolled back; releasing again would eat into holds that
        // belong to other orders for the same products.
        if existing.status == OrderStatus::Refunded {
            return Ok(existing);
        }

        let order = self.orders.refund_order(order_id).await?;
        if order.status == OrderStatus::Refunded {
            self.inventory
                .release_all(&order.reservation_lines())
                .await?;
        }
        tracing::info!(order_id = %order_id, "full refund applied");
        Ok(order)
    }

    /// Shipment-side cascade: tracking state moved; mirror it on the order.
    pub async fn set_fulfillment_status(
        &self,
        order_id: Uuid,
        status: FulfillmentStatus,
    ) -> Result<()> {
        self.orders.set_fulfillment_status(order_id, status).await
    }

    /// Shipment-side cascade: the package reached the customer.
    pub async fn mark_delivered(&self, order_id: Uuid) -> Result<Order> {
        let order = self.orders.mark_fulfilled(order_id).await?;
        tracing::info!(order_id = %order_id, "order fulfilled");
        Ok(order)
    }
}

fn clamp_limit(limit: i64) -> i64 {
    limit.clamp(1, MAX_PAGE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;

    fn service_with_stock(stock: &[(Uuid, i64)]) -> (OrderService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        for (product_id, quantity) in stock {
            store.put_inventory(*product_id, *quantity);
        }
        let service = OrderService::new(
            store.clone(),
            InventoryCoordinator::new(store.clone()),
        );
        (service, store)
    }

    fn line(product_id: Uuid, quantity: i64, unit_price_cents: Cents) -> NewOrderItem {
        NewOrderItem {
            product_id,
            product_name: "Rainbow Chard".to_string(),
            quantity,
            unit_price_cents,
        }
    }

    fn delivery_request(items: Vec<NewOrderItem>) -> CreateOrderRequest {
        CreateOrderRequest {
            customer_id: Uuid::new_v4(),
            farm_id: Uuid::new_v4(),
            items,
            fulfillment_method: FulfillmentMethod::Delivery,
            shipping_address: Some(Address::new("12 Orchard Ln", "Salem", "OR", "97301")),
            tax_cents: 400,
            shipping_cents: 500,
        }
    }

    #[tokio::test]
    async fn test_create_order_totals_and_initial_state() {
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();
        let (service, store) = service_with_stock(&[(p1, 10), (p2, 10)]);

        // qty 2 @ $10 plus qty 1 @ $20, tax $4, shipping $5.
        let order = service
            .create_order(delivery_request(vec![line(p1, 2, 1000), line(p2, 1, 2000)]))
            .await
            .unwrap();

        assert_eq!(order.subtotal_cents, 4000);
        assert_eq!(order.total_cents, 4900);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, PaymentState::Pending);
        assert!(order.order_number.starts_with("ORD-"));
        assert_eq!(order.history.len(), 1);

        // Reservation applied inside the creating transaction.
        assert_eq!(store.available(p1), 8);
        assert_eq!(store.available(p2), 9);
    }

    #[tokio::test]
    async fn test_empty_order_rejected() {
        let (service, _) = service_with_stock(&[]);
        let err = service
            .create_order(delivery_request(vec![]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Order must contain at least one item");
    }

    #[tokio::test]
    async fn test_non_positive_quantity_rejected() {
        let p1 = Uuid::new_v4();
        let (service, store) = service_with_stock(&[(p1, 10)]);
        for bad in [0, -3] {
            let err = service
                .create_order(delivery_request(vec![line(p1, bad, 1000)]))
                .await
                .unwrap_err();
            assert_eq!(err.to_string(), "Invalid quantity");
        }
        assert_eq!(store.available(p1), 10);
    }

    #[tokio::test]
    async fn test_delivery_requires_address() {
        let p1 = Uuid::new_v4();
        let (service, _) = service_with_stock(&[(p1, 10)]);
        let mut request = delivery_request(vec![line(p1, 1, 1000)]);
        request.shipping_address = None;
        let err = service.create_order(request).await.unwrap_err();
        assert_eq!(err.to_string(), "Delivery address required");
    }

    #[tokio::test]
    async fn test_insufficient_stock_creates_nothing() {
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();
        let (service, store) = service_with_stock(&[(p1, 10), (p2, 1)]);

        // Second line cannot be satisfied; the first line's hold must not
        // survive the rollback.
        let err = service
            .create_order(delivery_request(vec![line(p1, 2, 1000), line(p2, 5, 2000)]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientStock { .. }));
        assert_eq!(store.available(p1), 10);
        assert_eq!(store.available(p2), 1);
        assert_eq!(store.order_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_returns_inventory() {
        let p1 = Uuid::new_v4();
        let (service, store) = service_with_stock(&[(p1, 10)]);

        let order = service
            .create_order(delivery_request(vec![line(p1, 4, 500)]))
            .await
            .unwrap();
        assert_eq!(store.available(p1), 6);

        let cancelled = service.cancel_order(order.id, "changed my mind").await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.cancellation_reason.as_deref(), Some("changed my mind"));
        assert!(cancelled.cancelled_at.is_some());
        assert_eq!(store.available(p1), 10);
    }

    #[tokio::test]
    async fn test_cancel_shipped_order_rejected() {
        let p1 = Uuid::new_v4();
        let (service, store) = service_with_stock(&[(p1, 10)]);

        let order = service
            .create_order(delivery_request(vec![line(p1, 4, 500)]))
            .await
            .unwrap();
        service
            .update_order_status(order.id, OrderStatus::Confirmed)
            .await
            .unwrap();
        service
            .update_order_status(order.id, OrderStatus::Preparing)
            .await
            .unwrap();

        let err = service.cancel_order(order.id, "too late").await.unwrap_err();
        assert_eq!(err.to_string(), "Cannot cancel shipped order");
        // Inventory untouched by the failed cancellation.
        assert_eq!(store.available(p1), 6);
    }

    #[tokio::test]
    async fn test_illegal_transition_rejected() {
        let p1 = Uuid::new_v4();
        let (service, _) = service_with_stock(&[(p1, 10)]);

        let order = service
            .create_order(delivery_request(vec![line(p1, 1, 500)]))
            .await
            .unwrap();
        let err = service
            .update_order_status(order.id, OrderStatus::Ready)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid status transition from PENDING to READY"
        );
    }

    #[tokio::test]
    async fn test_every_transition_is_audited() {
        let p1 = Uuid::new_v4();
        let (service, _) = service_with_stock(&[(p1, 10)]);

        let order = service
            .create_order(delivery_request(vec![line(p1, 1, 500)]))
            .await
            .unwrap();
        service
            .update_order_status(order.id, OrderStatus::Confirmed)
            .await
            .unwrap();
        service
            .update_order_status(order.id, OrderStatus::Preparing)
            .await
            .unwrap();

        let order = service.get_order(order.id).await.unwrap().unwrap();
        let trail: Vec<OrderStatus> = order.history.iter().map(|h| h.status).collect();
        assert_eq!(
            trail,
            vec![OrderStatus::Pending, OrderStatus::Confirmed, OrderStatus::Preparing]
        );
    }

    #[tokio::test]
    async fn test_order_numbers_are_sequential_and_unique() {
        let p1 = Uuid::new_v4();
        let (service, _) = service_with_stock(&[(p1, 100)]);

        let a = service
            .create_order(delivery_request(vec![line(p1, 1, 500)]))
            .await
            .unwrap();
        let b = service
            .create_order(delivery_request(vec![line(p1, 1, 500)]))
            .await
            .unwrap();
        assert_ne!(a.order_number, b.order_number);
        assert!(a.order_number.starts_with("ORD-"));
        assert!(b.order_number.ends_with(&format!(
            "{:03}",
            a.order_number[9..].parse::<i64>().unwrap() + 1
        )));
    }

    #[tokio::test]
    async fn test_listing_filters_and_paginates() {
        let p1 = Uuid::new_v4();
        let (service, _) = service_with_stock(&[(p1, 100)]);
        let customer = Uuid::new_v4();

        let mut ids = Vec::new();
        for _ in 0..3 {
            let mut request = delivery_request(vec![line(p1, 1, 500)]);
            request.customer_id = customer;
            ids.push(service.create_order(request).await.unwrap().id);
        }
        service
            .update_order_status(ids[0], OrderStatus::Confirmed)
            .await
            .unwrap();

        let all = service
            .get_user_orders(customer, ListOptions::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 3);

        let confirmed = service
            .get_user_orders(
                customer,
                ListOptions {
                    status: Some(OrderStatus::Confirmed),
                    ..ListOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].id, ids[0]);

        let page = service
            .get_user_orders(
                customer,
                ListOptions {
                    status: None,
                    limit: 2,
                    offset: 2,
                },
            )
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
    }

    #[tokio::test]
    async fn test_full_refund_releases_inventory() {
        let p1 = Uuid::new_v4();
        let (service, store) = service_with_stock(&[(p1, 10)]);

        let order = service
            .create_order(delivery_request(vec![line(p1, 4, 500)]))
            .await
            .unwrap();
        service.confirm_paid(order.id).await.unwrap();
        assert_eq!(store.available(p1), 6);

        let refunded = service.apply_full_refund(order.id).await.unwrap();
        assert_eq!(refunded.status, OrderStatus::Refunded);
        assert_eq!(store.available(p1), 10);
    }
}
