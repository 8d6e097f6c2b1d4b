use std::net::SocketAddr;
use std::sync::Arc;

use croft_api::{app, AppState};
use croft_catalog::InventoryCoordinator;
use croft_order::providers::{CardGateway, RedirectGateway};
use croft_order::{OrderService, PaymentOrchestrator, ShippingCoordinator, WebhookReconciler};
use croft_store::{
    PgInventoryStore, PgOrderStore, PgPaymentStore, PgShipmentStore, PgWebhookEventStore,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "croft_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = croft_store::Config::load().expect("Failed to load config");
    tracing::info!("Starting Croft API on port {}", config.server.port);

    let db = croft_store::DbClient::new(&config.database.url)
        .await
        .expect("Failed to connect to database");
    db.migrate().await.expect("Failed to run migrations");

    let order_store = Arc::new(PgOrderStore::new(db.pool.clone()));
    let inventory_store = Arc::new(PgInventoryStore::new(db.pool.clone()));
    let payment_store = Arc::new(PgPaymentStore::new(db.pool.clone()));
    let event_store = Arc::new(PgWebhookEventStore::new(db.pool.clone()));
    let shipment_store = Arc::new(PgShipmentStore::new(db.pool.clone()));

    let orders = Arc::new(OrderService::new(
        order_store,
        InventoryCoordinator::new(inventory_store),
    ));

    let card = Arc::new(CardGateway::new(
        &config.payments.stripe.secret_key,
        &config.payments.stripe.webhook_secret,
        &config.payments.stripe.base_url,
    ));
    let redirect = Arc::new(RedirectGateway::new(
        &config.payments.paypal.client_id,
        &config.payments.paypal.client_secret,
        &config.payments.paypal.webhook_id,
        &config.payments.paypal.base_url,
    ));

    let mut orchestrator = PaymentOrchestrator::new(payment_store, orders.clone())
        .with_minimum_charge(config.business_rules.minimum_charge_cents);
    orchestrator.register(card.clone());
    orchestrator.register(redirect.clone());
    let payments = Arc::new(orchestrator);

    let mut reconciler = WebhookReconciler::new(event_store, payments.clone());
    reconciler.register(card);
    reconciler.register(redirect);
    let webhooks = Arc::new(reconciler);

    let shipping = Arc::new(ShippingCoordinator::new(shipment_store, orders.clone()));

    let app = app(AppState {
        orders,
        payments,
        webhooks,
        shipping,
        business_rules: config.business_rules.clone(),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
