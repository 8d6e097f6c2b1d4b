use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use croft_core::Error;
use croft_order::finance::OrderTotals;
use croft_order::models::{FulfillmentMethod, NewOrderItem, Order, OrderStatus};
use croft_order::service::{CreateOrderRequest, ListOptions};
use croft_shared::Address;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateOrderBody {
    pub customer_id: Uuid,
    pub farm_id: Uuid,
    pub items: Vec<OrderItemBody>,
    pub fulfillment_method: FulfillmentMethod,
    pub shipping_address: Option<Address>,
    /// Omitted by legacy clients; falls back to the configured tax rate.
    #[serde(default)]
    pub tax_cents: Option<i64>,
    #[serde(default)]
    pub shipping_cents: i64,
}

#[derive(Debug, Deserialize)]
pub struct OrderItemBody {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

#[derive(Debug, Deserialize)]
pub struct CancelOrderBody {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<OrderStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListQuery {
    fn into_options(self) -> ListOptions {
        let defaults = ListOptions::default();
        ListOptions {
            status: self.status,
            limit: self.limit.unwrap_or(defaults.limit),
            offset: self.offset.unwrap_or(defaults.offset),
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/orders
/// Create an order in PENDING with inventory reserved.
pub async fn create_order(
    State(state): State<AppState>,
    Json(body): Json<CreateOrderBody>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let tax_cents = match body.tax_cents {
        Some(tax_cents) => tax_cents,
        None => {
            let subtotal_cents: i64 = body
                .items
                .iter()
                .map(|item| item.unit_price_cents * item.quantity)
                .sum();
            OrderTotals::tax_for(subtotal_cents, state.business_rules.tax_rate)
        }
    };

    let order = state
        .orders
        .create_order(CreateOrderRequest {
            customer_id: body.customer_id,
            farm_id: body.farm_id,
            items: body
                .items
                .into_iter()
                .map(|item| NewOrderItem {
                    product_id: item.product_id,
                    product_name: item.product_name,
                    quantity: item.quantity,
                    unit_price_cents: item.unit_price_cents,
                })
                .collect(),
            fulfillment_method: body.fulfillment_method,
            shipping_address: body.shipping_address,
            tax_cents,
            shipping_cents: body.shipping_cents,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /v1/orders/{id}
/// Retrieve an order with items and status history.
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .orders
        .get_order(order_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Order not found: {}", order_id)))?;
    Ok(Json(order))
}

/// POST /v1/orders/{id}/cancel
/// Cancel a PENDING or CONFIRMED order and release its reservations.
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(body): Json<CancelOrderBody>,
) -> Result<Json<Order>, ApiError> {
    let order = state.orders.cancel_order(order_id, &body.reason).await?;
    Ok(Json(order))
}

/// GET /v1/customers/{id}/orders
pub async fn list_customer_orders(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let orders = state
        .orders
        .get_user_orders(customer_id, query.into_options())
        .await?;
    Ok(Json(orders))
}

/// GET /v1/farms/{id}/orders
pub async fn list_farm_orders(
    State(state): State<AppState>,
    Path(farm_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let orders = state
        .orders
        .get_farm_orders(farm_id, query.into_options())
        .await?;
    Ok(Json(orders))
}
