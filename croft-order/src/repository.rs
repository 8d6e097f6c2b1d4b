use async_trait::async_trait;
use uuid::Uuid;

use croft_core::Result;

use crate::models::{
    FulfillmentStatus, NewOrder, Order, OrderFilter, OrderStatus, PaymentState, Shipment,
    ShipmentStatus,
};

/// Persistence seam for orders.
///
/// Every method that changes more than one row is a single transaction in
/// the Postgres implementation; partial failure is impossible by
/// construction, not by caller discipline.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Atomically: reserve inventory for every item (all-or-nothing),
    /// allocate the per-year order number, persist the order and its items
    /// in PENDING, and append the initial history row. Any failure leaves
    /// no trace.
    async fn create_order(&self, order: NewOrder) -> Result<Order>;

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>>;

    /// Apply a caller-driven transition. The state-machine guard runs under
    /// the order row lock; an illegal transition fails with `Error::State`
    /// and writes nothing. Appends a history row on success.
    async fn update_status(&self, id: Uuid, new_status: OrderStatus) -> Result<Order>;

    async fn set_payment_state(&self, id: Uuid, state: PaymentState) -> Result<()>;

    async fn set_fulfillment_status(&self, id: Uuid, status: FulfillmentStatus) -> Result<()>;

    /// Atomically: guard that the order is still cancellable (PENDING or
    /// CONFIRMED), release every reservation, set CANCELLED with the given
    /// reason, append history.
    async fn cancel_order(&self, id: Uuid, reason: &str) -> Result<Order>;

    /// Full-refund cascade: move a CONFIRMED-or-later, not-yet-fulfilled
    /// order to REFUNDED (fulfilled orders keep their terminal status) and
    /// set the payment state to REFUNDED. Reservation release is the
    /// caller's follow-up through the inventory coordinator.
    async fn refund_order(&self, id: Uuid) -> Result<Order>;

    /// Delivery cascade: set fulfillment DELIVERED and status FULFILLED,
    /// and convert each item's reservation into a permanent stock
    /// deduction, all in one transaction.
    async fn mark_fulfilled(&self, id: Uuid) -> Result<Order>;

    async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<Order>>;
}

/// Persistence seam for shipments.
#[async_trait]
pub trait ShipmentStore: Send + Sync {
    async fn insert_shipment(&self, shipment: &Shipment) -> Result<()>;

    async fn get_shipment(&self, id: Uuid) -> Result<Option<Shipment>>;

    /// Apply PENDING -> IN_TRANSIT -> DELIVERED under the shipment row
    /// lock; anything else fails with `Error::State`.
    async fn update_status(&self, id: Uuid, status: ShipmentStatus) -> Result<Shipment>;
}
