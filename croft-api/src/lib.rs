use axum::{
    http::Method,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod error;
pub mod orders;
pub mod payments;
pub mod shipping;
pub mod state;
pub mod webhooks;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    // CORS Middleware
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    Router::new()
        .route("/v1/orders", post(orders::create_order))
        .route("/v1/orders/{id}", get(orders::get_order))
        .route("/v1/orders/{id}/cancel", post(orders::cancel_order))
        .route("/v1/customers/{id}/orders", get(orders::list_customer_orders))
        .route("/v1/farms/{id}/orders", get(orders::list_farm_orders))
        .route("/v1/payments/intent", post(payments::create_intent))
        .route("/v1/payments/confirm", post(payments::confirm_payment))
        .route("/v1/payments/refund", post(payments::refund_payment))
        .route("/v1/webhooks/payments/{provider}", post(webhooks::ingest_webhook))
        .route("/v1/orders/{id}/shipping-rates", post(shipping::quote_rates))
        .route("/v1/orders/{id}/shipments", post(shipping::create_shipment))
        .route("/v1/shipments/{id}/status", post(shipping::update_status))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
