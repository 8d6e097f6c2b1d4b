use chrono::{DateTime, Utc};
use croft_core::{Error, Result};
use croft_shared::{Address, Cents};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order status in the lifecycle.
///
/// `Fulfilled`, `Cancelled` and `Refunded` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Ready,
    Fulfilled,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::Ready => "READY",
            OrderStatus::Fulfilled => "FULFILLED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Refunded => "REFUNDED",
        }
    }

    pub fn from_db(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(OrderStatus::Pending),
            "CONFIRMED" => Ok(OrderStatus::Confirmed),
            "PREPARING" => Ok(OrderStatus::Preparing),
            "READY" => Ok(OrderStatus::Ready),
            "FULFILLED" => Ok(OrderStatus::Fulfilled),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            "REFUNDED" => Ok(OrderStatus::Refunded),
            other => Err(Error::persistence(format!("unknown order status: {}", other))),
        }
    }

    /// Caller-driven transitions. The delivery cascade and the full-refund
    /// cascade move orders through their own store operations and are not
    /// reachable here.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Confirmed, Preparing)
                | (Preparing, Ready)
                | (Ready, Fulfilled)
                | (Pending, Cancelled)
                | (Confirmed, Cancelled)
                | (Confirmed, Refunded)
                | (Preparing, Refunded)
                | (Ready, Refunded)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Fulfilled | OrderStatus::Cancelled | OrderStatus::Refunded
        )
    }

    /// Why this order cannot be cancelled, or `None` when it can.
    pub fn cancellation_error(self) -> Option<&'static str> {
        match self {
            OrderStatus::Pending | OrderStatus::Confirmed => None,
            OrderStatus::Cancelled => Some("Order is already cancelled"),
            OrderStatus::Refunded => Some("Order is already refunded"),
            _ => Some("Cannot cancel shipped order"),
        }
    }
}

/// Order-level payment state, cascaded from payment and webhook events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentState {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Pending => "PENDING",
            PaymentState::Paid => "PAID",
            PaymentState::Failed => "FAILED",
            PaymentState::Refunded => "REFUNDED",
        }
    }

    pub fn from_db(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(PaymentState::Pending),
            "PAID" => Ok(PaymentState::Paid),
            "FAILED" => Ok(PaymentState::Failed),
            "REFUNDED" => Ok(PaymentState::Refunded),
            other => Err(Error::persistence(format!(
                "unknown payment state: {}",
                other
            ))),
        }
    }
}

/// Shipment-tracking state on the order, distinct from the overall status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FulfillmentStatus {
    Unfulfilled,
    Preparing,
    InTransit,
    Delivered,
}

impl FulfillmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentStatus::Unfulfilled => "UNFULFILLED",
            FulfillmentStatus::Preparing => "PREPARING",
            FulfillmentStatus::InTransit => "IN_TRANSIT",
            FulfillmentStatus::Delivered => "DELIVERED",
        }
    }

    pub fn from_db(s: &str) -> Result<Self> {
        match s {
            "UNFULFILLED" => Ok(FulfillmentStatus::Unfulfilled),
            "PREPARING" => Ok(FulfillmentStatus::Preparing),
            "IN_TRANSIT" => Ok(FulfillmentStatus::InTransit),
            "DELIVERED" => Ok(FulfillmentStatus::Delivered),
            other => Err(Error::persistence(format!(
                "unknown fulfillment status: {}",
                other
            ))),
        }
    }
}

/// How the order reaches the customer. Pickup orders carry no shipping cost
/// and need no delivery address.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FulfillmentMethod {
    Delivery,
    FarmPickup,
    MarketPickup,
}

impl FulfillmentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentMethod::Delivery => "DELIVERY",
            FulfillmentMethod::FarmPickup => "FARM_PICKUP",
            FulfillmentMethod::MarketPickup => "MARKET_PICKUP",
        }
    }

    pub fn from_db(s: &str) -> Result<Self> {
        match s {
            "DELIVERY" => Ok(FulfillmentMethod::Delivery),
            "FARM_PICKUP" => Ok(FulfillmentMethod::FarmPickup),
            "MARKET_PICKUP" => Ok(FulfillmentMethod::MarketPickup),
            other => Err(Error::persistence(format!(
                "unknown fulfillment method: {}",
                other
            ))),
        }
    }

    pub fn is_pickup(self) -> bool {
        matches!(
            self,
            FulfillmentMethod::FarmPickup | FulfillmentMethod::MarketPickup
        )
    }
}

/// The single source of truth for a customer's purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    /// Human-readable unique number, `ORD-YYYY-NNN`, allocated from a
    /// per-year sequence inside the creating transaction.
    pub order_number: String,
    pub customer_id: Uuid,
    pub farm_id: Uuid,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    pub payment_status: PaymentState,
    pub fulfillment_status: FulfillmentStatus,
    pub fulfillment_method: FulfillmentMethod,
    pub subtotal_cents: Cents,
    pub tax_cents: Cents,
    pub shipping_cents: Cents,
    pub total_cents: Cents,
    pub shipping_address: Option<Address>,
    pub history: Vec<StatusHistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
}

impl Order {
    pub fn reservation_lines(&self) -> Vec<croft_catalog::ReservationLine> {
        self.items
            .iter()
            .map(|item| croft_catalog::ReservationLine {
                product_id: item.product_id,
                quantity: item.quantity,
            })
            .collect()
    }
}

/// A product line within an order. Quantity and unit price are captured at
/// order time and immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price_cents: Cents,
}

/// Append-only audit trail of status changes. Written in the same
/// transaction as every transition, never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub changed_at: DateTime<Utc>,
}

/// Validated input handed to the store for atomic creation.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_id: Uuid,
    pub farm_id: Uuid,
    pub items: Vec<NewOrderItem>,
    pub fulfillment_method: FulfillmentMethod,
    pub subtotal_cents: Cents,
    pub tax_cents: Cents,
    pub shipping_cents: Cents,
    pub total_cents: Cents,
    pub shipping_address: Option<Address>,
}

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price_cents: Cents,
}

/// Listing filter; results are ordered by creation time, newest first.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub customer_id: Option<Uuid>,
    pub farm_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
    pub limit: i64,
    pub offset: i64,
}

/// Shipping service levels offered at checkout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceLevel {
    FarmPickup,
    Standard,
    Express,
    Overnight,
}

impl ServiceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceLevel::FarmPickup => "FARM_PICKUP",
            ServiceLevel::Standard => "STANDARD",
            ServiceLevel::Express => "EXPRESS",
            ServiceLevel::Overnight => "OVERNIGHT",
        }
    }

    pub fn from_db(s: &str) -> Result<Self> {
        match s {
            "FARM_PICKUP" => Ok(ServiceLevel::FarmPickup),
            "STANDARD" => Ok(ServiceLevel::Standard),
            "EXPRESS" => Ok(ServiceLevel::Express),
            "OVERNIGHT" => Ok(ServiceLevel::Overnight),
            other => Err(Error::persistence(format!(
                "unknown service level: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    Pending,
    InTransit,
    Delivered,
}

impl ShipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Pending => "PENDING",
            ShipmentStatus::InTransit => "IN_TRANSIT",
            ShipmentStatus::Delivered => "DELIVERED",
        }
    }

    pub fn from_db(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(ShipmentStatus::Pending),
            "IN_TRANSIT" => Ok(ShipmentStatus::InTransit),
            "DELIVERED" => Ok(ShipmentStatus::Delivered),
            other => Err(Error::persistence(format!(
                "unknown shipment status: {}",
                other
            ))),
        }
    }

    pub fn can_transition_to(self, next: ShipmentStatus) -> bool {
        use ShipmentStatus::*;
        matches!((self, next), (Pending, InTransit) | (InTransit, Delivered))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub tracking_number: String,
    pub service_level: ServiceLevel,
    pub status: ShipmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
