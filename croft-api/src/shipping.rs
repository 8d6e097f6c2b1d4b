use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use croft_order::models::{ServiceLevel, Shipment, ShipmentStatus};
use croft_order::ShippingRate;
use croft_shared::Address;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateShipmentBody {
    pub service_level: ServiceLevel,
}

#[derive(Debug, Deserialize)]
pub struct UpdateShipmentBody {
    pub status: ShipmentStatus,
}

/// POST /v1/orders/{id}/shipping-rates
/// Quote shipping options for a destination, cheapest first; farm pickup
/// is always free.
pub async fn quote_rates(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(destination): Json<Address>,
) -> Result<Json<Vec<ShippingRate>>, ApiError> {
    let rates = state
        .shipping
        .calculate_shipping_rates(order_id, &destination)
        .await?;
    Ok(Json(rates))
}

/// POST /v1/orders/{id}/shipments
pub async fn create_shipment(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(body): Json<CreateShipmentBody>,
) -> Result<(StatusCode, Json<Shipment>), ApiError> {
    let shipment = state
        .shipping
        .create_shipment(order_id, body.service_level)
        .await?;
    Ok((StatusCode::CREATED, Json(shipment)))
}

/// POST /v1/shipments/{id}/status
/// Advance a shipment; DELIVERED cascades the order to FULFILLED.
pub async fn update_status(
    State(state): State<AppState>,
    Path(shipment_id): Path<Uuid>,
    Json(body): Json<UpdateShipmentBody>,
) -> Result<Json<Shipment>, ApiError> {
    let shipment = state
        .shipping
        .update_shipment_status(shipment_id, body.status)
        .await?;
    Ok(Json(shipment))
}
