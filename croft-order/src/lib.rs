pub mod finance;
pub mod models;
pub mod orchestrator;
pub mod providers;
pub mod repository;
pub mod service;
pub mod shipping;
pub mod testing;
pub mod webhook;

pub use models::{Order, OrderItem, OrderStatus, Shipment, ShipmentStatus};
pub use orchestrator::{PaymentOrchestrator, RefundRequest};
pub use repository::{OrderStore, ShipmentStore};
pub use service::{CreateOrderRequest, ListOptions, OrderService};
pub use shipping::{ShippingCoordinator, ShippingRate};
pub use webhook::{WebhookDelivery, WebhookOutcome, WebhookReconciler};
