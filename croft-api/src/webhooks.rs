use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use croft_core::payment::Provider;
use croft_core::Error;
use croft_order::{WebhookDelivery, WebhookOutcome};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "webhook-signature";

/// POST /v1/webhooks/payments/{provider}
/// Ingest an asynchronous provider event. Verification failures come back
/// 400 with nothing applied, so the provider retries safely; duplicates
/// return 200 without re-applying.
pub async fn ingest_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let provider = parse_provider(&provider)?;
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let outcome = state
        .webhooks
        .process_webhook(WebhookDelivery {
            provider,
            signature,
            payload: body.to_vec(),
        })
        .await?;

    let received = match outcome {
        WebhookOutcome::Applied => "applied",
        WebhookOutcome::Duplicate => "duplicate",
        WebhookOutcome::Ignored => "ignored",
    };
    Ok(Json(json!({ "received": received })))
}

fn parse_provider(raw: &str) -> Result<Provider, Error> {
    match raw.to_ascii_lowercase().as_str() {
        "stripe" => Ok(Provider::Stripe),
        "paypal" => Ok(Provider::Paypal),
        other => Err(Error::validation(format!(
            "Unknown payment provider: {}",
            other
        ))),
    }
}
