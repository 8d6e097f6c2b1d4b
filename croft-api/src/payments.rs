use axum::{extract::State, http::StatusCode, Json};
use croft_core::payment::{Payment, PaymentIntent, Provider, Refund};
use croft_order::RefundRequest;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateIntentBody {
    pub order_id: Uuid,
    pub amount_cents: i64,
    pub currency: Option<String>,
    pub provider: Provider,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmBody {
    pub provider: Provider,
    pub provider_payment_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RefundBody {
    pub payment_id: Uuid,
    pub amount_cents: i64,
    pub reason: String,
}

/// POST /v1/payments/intent
/// Create a provider intent and a pending payment row; returns the
/// continuation data the checkout flow needs.
pub async fn create_intent(
    State(state): State<AppState>,
    Json(body): Json<CreateIntentBody>,
) -> Result<(StatusCode, Json<PaymentIntent>), ApiError> {
    let currency = body
        .currency
        .as_deref()
        .unwrap_or(&state.business_rules.currency);
    let intent = state
        .payments
        .create_payment_intent(body.order_id, body.amount_cents, currency, body.provider)
        .await?;
    Ok((StatusCode::CREATED, Json(intent)))
}

/// POST /v1/payments/confirm
/// Confirm/capture with the provider; on success the order moves to
/// CONFIRMED. Provider declines surface verbatim with 402.
pub async fn confirm_payment(
    State(state): State<AppState>,
    Json(body): Json<ConfirmBody>,
) -> Result<Json<Payment>, ApiError> {
    let payment = state
        .payments
        .confirm_payment(&body.provider_payment_id, body.provider)
        .await?;
    Ok(Json(payment))
}

/// POST /v1/payments/refund
pub async fn refund_payment(
    State(state): State<AppState>,
    Json(body): Json<RefundBody>,
) -> Result<(StatusCode, Json<Refund>), ApiError> {
    let refund = state
        .payments
        .refund_payment(RefundRequest {
            payment_id: body.payment_id,
            amount_cents: body.amount_cents,
            reason: body.reason,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(refund)))
}
