use std::sync::Arc;

use croft_order::{OrderService, PaymentOrchestrator, ShippingCoordinator, WebhookReconciler};
use croft_store::app_config::BusinessRules;

#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentOrchestrator>,
    pub webhooks: Arc<WebhookReconciler>,
    pub shipping: Arc<ShippingCoordinator>,
    pub business_rules: BusinessRules,
}
