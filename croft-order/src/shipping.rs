use std::sync::Arc;

use chrono::Utc;
use croft_core::{Error, Result};
use croft_shared::{Address, Cents};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{FulfillmentStatus, OrderStatus, ServiceLevel, Shipment, ShipmentStatus};
use crate::repository::ShipmentStore;
use crate::service::OrderService;

/// A shipping option quoted at checkout.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ShippingRate {
    pub service: ServiceLevel,
    pub cost_cents: Cents,
    pub eta_days: u32,
}

/// Quotes rates, creates shipments and tracks them through to delivery,
/// cascading fulfillment state up to the order.
pub struct ShippingCoordinator {
    shipments: Arc<dyn ShipmentStore>,
    orders: Arc<OrderService>,
}

impl ShippingCoordinator {
    pub fn new(shipments: Arc<dyn ShipmentStore>, orders: Arc<OrderService>) -> Self {
        Self { shipments, orders }
    }

    /// Quote shipping options for an order, cheapest first. Farm pickup is
    /// always offered at zero cost.
    pub async fn calculate_shipping_rates(
        &self,
        order_id: Uuid,
        destination: &Address,
    ) -> Result<Vec<ShippingRate>> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Order not found: {}", order_id)))?;

        let base = zone_base_rate(&destination.state);
        // Total units stand in for weight until carrier integration.
        let units: i64 = order.items.iter().map(|item| item.quantity).sum();
        let weight_multiplier = (units as f64 / 5.0).max(1.0);
        let scaled = |factor: f64| (base as f64 * weight_multiplier * factor).round() as Cents;

        Ok(vec![
            ShippingRate {
                service: ServiceLevel::FarmPickup,
                cost_cents: 0,
                eta_days: 0,
            },
            ShippingRate {
                service: ServiceLevel::Standard,
                cost_cents: scaled(1.0),
                eta_days: 5,
            },
            ShippingRate {
                service: ServiceLevel::Express,
                cost_cents: scaled(2.5),
                eta_days: 2,
            },
            ShippingRate {
                service: ServiceLevel::Overnight,
                cost_cents: scaled(4.5),
                eta_days: 1,
            },
        ])
    }

    /// Create a PENDING shipment with a generated tracking identifier.
    /// The order must have made it past payment.
    pub async fn create_shipment(
        &self,
        order_id: Uuid,
        service_level: ServiceLevel,
    ) -> Result<Shipment> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Order not found: {}", order_id)))?;
        if !matches!(
            order.status,
            OrderStatus::Confirmed | OrderStatus::Preparing | OrderStatus::Ready
        ) {
            return Err(Error::state(format!(
                "Cannot ship order in status {}",
                order.status.as_str()
            )));
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        let shipment = Shipment {
            id,
            order_id,
            tracking_number: generate_tracking_number(&id),
            service_level,
            status: ShipmentStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.shipments.insert_shipment(&shipment).await?;
        self.orders_set_fulfillment(order_id, FulfillmentStatus::Preparing)
            .await?;

        tracing::info!(
            order_id = %order_id,
            tracking_number = %shipment.tracking_number,
            "shipment created"
        );
        Ok(shipment)
    }

    /// Advance a shipment along PENDING -> IN_TRANSIT -> DELIVERED.
    /// Delivery cascades to the order: fulfillment DELIVERED, status
    /// FULFILLED, reservations converted to permanent deductions.
    pub async fn update_shipment_status(
        &self,
        shipment_id: Uuid,
        status: ShipmentStatus,
    ) -> Result<Shipment> {
        let shipment = self.shipments.update_status(shipment_id, status).await?;

        match status {
            ShipmentStatus::InTransit => {
                self.orders_set_fulfillment(shipment.order_id, FulfillmentStatus::InTransit)
                    .await?;
            }
            ShipmentStatus::Delivered => {
                self.orders.mark_delivered(shipment.order_id).await?;
            }
            ShipmentStatus::Pending => {}
        }

        tracing::info!(
            shipment_id = %shipment_id,
            status = status.as_str(),
            "shipment status updated"
        );
        Ok(shipment)
    }

    async fn orders_set_fulfillment(
        &self,
        order_id: Uuid,
        status: FulfillmentStatus,
    ) -> Result<()> {
        self.orders.set_fulfillment_status(order_id, status).await
    }
}

/// Zone-based base rate keyed on destination state, pending carrier
/// integration: local, regional, then national.
fn zone_base_rate(state: &str) -> Cents {
    match state.to_ascii_uppercase().as_str() {
        "CA" | "OR" | "WA" => 599,
        "NV" | "AZ" | "ID" | "MT" | "UT" => 799,
        _ => 999,
    }
}

fn generate_tracking_number(shipment_id: &Uuid) -> String {
    let short = shipment_id.simple().to_string()[..8].to_uppercase();
    format!("CROFT-{}-{}", Utc::now().timestamp(), short)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FulfillmentMethod, NewOrderItem};
    use crate::service::CreateOrderRequest;
    use crate::testing::MemoryStore;
    use croft_catalog::InventoryCoordinator;

    struct Fixture {
        store: Arc<MemoryStore>,
        orders: Arc<OrderService>,
        shipping: ShippingCoordinator,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let orders = Arc::new(OrderService::new(
            store.clone(),
            InventoryCoordinator::new(store.clone()),
        ));
        let shipping = ShippingCoordinator::new(store.clone(), orders.clone());
        Fixture {
            store,
            orders,
            shipping,
        }
    }

    async fn confirmed_order(f: &Fixture, product_id: Uuid, quantity: i64) -> crate::models::Order {
        f.store.put_inventory(product_id, 50);
        let order = f
            .orders
            .create_order(CreateOrderRequest {
                customer_id: Uuid::new_v4(),
                farm_id: Uuid::new_v4(),
                items: vec![NewOrderItem {
                    product_id,
                    product_name: "Winter Squash".to_string(),
                    quantity,
                    unit_price_cents: 800,
                }],
                fulfillment_method: FulfillmentMethod::Delivery,
                shipping_address: Some(Address::new("9 Field Way", "Bend", "OR", "97701")),
                tax_cents: 0,
                shipping_cents: 599,
            })
            .await
            .unwrap();
        f.orders
            .update_order_status(order.id, OrderStatus::Confirmed)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_pickup_rate_is_always_free() {
        let f = fixture();
        let order = confirmed_order(&f, Uuid::new_v4(), 2).await;

        let rates = f
            .shipping
            .calculate_shipping_rates(order.id, &Address::new("1 Main St", "Austin", "TX", "73301"))
            .await
            .unwrap();

        assert_eq!(rates[0].service, ServiceLevel::FarmPickup);
        assert_eq!(rates[0].cost_cents, 0);
        // Cheapest first thereafter.
        for pair in rates.windows(2) {
            assert!(pair[0].cost_cents <= pair[1].cost_cents);
        }
    }

    #[tokio::test]
    async fn test_local_zone_is_cheaper_than_national() {
        let f = fixture();
        let order = confirmed_order(&f, Uuid::new_v4(), 2).await;

        let local = f
            .shipping
            .calculate_shipping_rates(order.id, &Address::new("2 Coast Rd", "Portland", "OR", "97201"))
            .await
            .unwrap();
        let national = f
            .shipping
            .calculate_shipping_rates(order.id, &Address::new("3 Lake Dr", "Boston", "MA", "02108"))
            .await
            .unwrap();

        assert!(local[1].cost_cents < national[1].cost_cents);
    }

    #[tokio::test]
    async fn test_shipment_lifecycle_cascades_to_order() {
        let f = fixture();
        let product_id = Uuid::new_v4();
        let order = confirmed_order(&f, product_id, 4).await;
        assert_eq!(f.store.available(product_id), 46);

        let shipment = f
            .shipping
            .create_shipment(order.id, ServiceLevel::Standard)
            .await
            .unwrap();
        assert_eq!(shipment.status, ShipmentStatus::Pending);
        assert!(shipment.tracking_number.starts_with("CROFT-"));

        f.shipping
            .update_shipment_status(shipment.id, ShipmentStatus::InTransit)
            .await
            .unwrap();
        let current = f.orders.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(current.fulfillment_status, FulfillmentStatus::InTransit);

        f.shipping
            .update_shipment_status(shipment.id, ShipmentStatus::Delivered)
            .await
            .unwrap();
        let current = f.orders.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(current.fulfillment_status, FulfillmentStatus::Delivered);
        assert_eq!(current.status, OrderStatus::Fulfilled);

        // Reservation became a permanent deduction: stock down, nothing
        // still on hold.
        let inventory = f.store.inventory(product_id);
        assert_eq!(inventory.quantity, 46);
        assert_eq!(inventory.reserved_quantity, 0);
    }

    #[tokio::test]
    async fn test_shipment_cannot_skip_transit() {
        let f = fixture();
        let order = confirmed_order(&f, Uuid::new_v4(), 1).await;
        let shipment = f
            .shipping
            .create_shipment(order.id, ServiceLevel::Express)
            .await
            .unwrap();

        let err = f
            .shipping
            .update_shipment_status(shipment.id, ShipmentStatus::Delivered)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::State(_)));
    }

    #[tokio::test]
    async fn test_pending_order_cannot_ship() {
        let f = fixture();
        let product_id = Uuid::new_v4();
        f.store.put_inventory(product_id, 10);
        let order = f
            .orders
            .create_order(CreateOrderRequest {
                customer_id: Uuid::new_v4(),
                farm_id: Uuid::new_v4(),
                items: vec![NewOrderItem {
                    product_id,
                    product_name: "Snap Peas".to_string(),
                    quantity: 1,
                    unit_price_cents: 300,
                }],
                fulfillment_method: FulfillmentMethod::FarmPickup,
                shipping_address: None,
                tax_cents: 0,
                shipping_cents: 0,
            })
            .await
            .unwrap();

        let err = f
            .shipping
            .create_shipment(order.id, ServiceLevel::Standard)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Cannot ship order in status PENDING");
    }
}
