use async_trait::async_trait;
use croft_core::payment::{
    Continuation, IntentRequest, PaymentProvider, Provider, ProviderCharge, ProviderIntent,
    ProviderRefund, WebhookEvent, WebhookEventKind,
};
use croft_core::{Error, Result};
use croft_shared::money::{cents_from_dollars, Cents};
use ring::hmac;
use serde::Deserialize;
use serde_json::json;

// ============================================================================
// Card-style gateway (intent + client secret, HMAC-signed webhooks)
// ============================================================================

/// Adapter for a card-intent provider (Stripe-shaped API). The checkout
/// flow finishes the charge in-page with the returned client secret.
pub struct CardGateway {
    secret_key: String,
    webhook_secret: String,
    base_url: String,
    http: reqwest::Client,
}

impl CardGateway {
    pub fn new(secret_key: &str, webhook_secret: &str, base_url: &str) -> Self {
        Self {
            secret_key: secret_key.to_string(),
            webhook_secret: webhook_secret.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CardIntentResponse {
    id: String,
    client_secret: Option<String>,
    status: String,
    #[serde(default)]
    last_payment_error: Option<CardApiError>,
}

#[derive(Debug, Deserialize)]
struct CardApiError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct CardErrorEnvelope {
    error: CardApiError,
}

#[derive(Debug, Deserialize)]
struct CardRefundResponse {
    id: String,
}

async fn card_error(response: reqwest::Response) -> Error {
    match response.json::<CardErrorEnvelope>().await {
        Ok(envelope) => Error::payment(envelope.error.message),
        Err(_) => Error::payment("Payment provider returned an unreadable error"),
    }
}

fn transport_error(err: reqwest::Error) -> Error {
    Error::payment(format!("Payment provider request failed: {}", err))
}

#[async_trait]
impl PaymentProvider for CardGateway {
    fn kind(&self) -> Provider {
        Provider::Stripe
    }

    async fn create_intent(&self, request: &IntentRequest) -> Result<ProviderIntent> {
        let response = self
            .http
            .post(format!("{}/v1/payment_intents", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&[
                ("amount", request.amount_cents.to_string()),
                ("currency", request.currency.clone()),
                ("metadata[order_id]", request.order_id.to_string()),
            ])
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(card_error(response).await);
        }

        let intent: CardIntentResponse = response.json().await.map_err(transport_error)?;
        let client_secret = intent
            .client_secret
            .ok_or_else(|| Error::payment("Payment provider returned no client secret"))?;
        Ok(ProviderIntent {
            provider_payment_id: intent.id,
            continuation: Continuation::ClientSecret(client_secret),
        })
    }

    async fn confirm(&self, provider_payment_id: &str) -> Result<ProviderCharge> {
        let response = self
            .http
            .post(format!(
                "{}/v1/payment_intents/{}/confirm",
                self.base_url, provider_payment_id
            ))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(card_error(response).await);
        }

        let intent: CardIntentResponse = response.json().await.map_err(transport_error)?;
        if intent.status != "succeeded" {
            let message = intent
                .last_payment_error
                .map(|e| e.message)
                .unwrap_or_else(|| format!("Payment not completed: {}", intent.status));
            return Err(Error::payment(message));
        }
        Ok(ProviderCharge {
            provider_payment_id: intent.id,
            amount_cents: None,
        })
    }

    async fn refund(
        &self,
        provider_payment_id: &str,
        amount_cents: Cents,
        reason: &str,
    ) -> Result<ProviderRefund> {
        let response = self
            .http
            .post(format!("{}/v1/refunds", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&[
                ("payment_intent", provider_payment_id.to_string()),
                ("amount", amount_cents.to_string()),
                ("metadata[reason]", reason.to_string()),
            ])
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(card_error(response).await);
        }

        let refund: CardRefundResponse = response.json().await.map_err(transport_error)?;
        Ok(ProviderRefund {
            provider_refund_id: refund.id,
        })
    }

    async fn verify_webhook(&self, signature: &str, payload: &[u8]) -> Result<WebhookEvent> {
        verify_card_signature(&self.webhook_secret, signature, payload)?;
        parse_card_event(payload)
    }
}

// ============================================================================
// Card webhook signature scheme
// ============================================================================
//
// Header format: `t=<unix>,v1=<hex hmac-sha256 of "<unix>.<payload>">`.
// Shared with the mock provider so tests exercise the real verifier.

pub(crate) fn card_signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let mut message = format!("{}.", timestamp).into_bytes();
    message.extend_from_slice(payload);
    let tag = hmac::sign(&key, &message);
    format!("t={},v1={}", timestamp, hex::encode(tag.as_ref()))
}

fn verify_card_signature(secret: &str, header: &str, payload: &[u8]) -> Result<()> {
    let mut timestamp: Option<&str> = None;
    let mut signature: Option<&str> = None;
    for part in header.split(',') {
        match part.split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signature = Some(value),
            _ => {}
        }
    }
    let (timestamp, signature) = match (timestamp, signature) {
        (Some(t), Some(v)) => (t, v),
        _ => return Err(Error::signature("malformed signature header")),
    };

    let tag = hex::decode(signature)
        .map_err(|_| Error::signature("signature is not valid hex"))?;
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let mut message = format!("{}.", timestamp).into_bytes();
    message.extend_from_slice(payload);
    hmac::verify(&key, &message, &tag).map_err(|_| Error::signature("signature mismatch"))
}

#[derive(Debug, Deserialize)]
struct CardEvent {
    id: String,
    #[serde(rename = "type")]
    type_: String,
    data: CardEventData,
}

#[derive(Debug, Deserialize)]
struct CardEventData {
    object: CardEventObject,
}

#[derive(Debug, Deserialize)]
struct CardEventObject {
    id: String,
    #[serde(default)]
    amount_refunded: Option<i64>,
    #[serde(default)]
    last_payment_error: Option<CardApiError>,
}

pub(crate) fn parse_card_event(payload: &[u8]) -> Result<WebhookEvent> {
    let event: CardEvent = serde_json::from_slice(payload)
        .map_err(|e| Error::validation(format!("Unparseable webhook payload: {}", e)))?;

    let kind = match event.type_.as_str() {
        "payment_intent.succeeded" => WebhookEventKind::PaymentSucceeded,
        "payment_intent.payment_failed" => WebhookEventKind::PaymentFailed {
            message: event
                .data
                .object
                .last_payment_error
                .map(|e| e.message)
                .unwrap_or_else(|| "Payment failed".to_string()),
        },
        "charge.refunded" => WebhookEventKind::RefundCompleted {
            amount_cents: event.data.object.amount_refunded.unwrap_or(0),
        },
        other => WebhookEventKind::Other(other.to_string()),
    };
    Ok(WebhookEvent {
        event_id: event.id,
        provider_payment_id: event.data.object.id,
        kind,
    })
}

// ============================================================================
// Redirect-style gateway (approval URL + capture, API-verified webhooks)
// ============================================================================

/// Adapter for a redirect/capture provider (PayPal-shaped API). The
/// checkout flow sends the customer to the returned approval URL; the
/// charge settles on capture.
pub struct RedirectGateway {
    client_id: String,
    client_secret: String,
    webhook_id: String,
    base_url: String,
    http: reqwest::Client,
}

impl RedirectGateway {
    pub fn new(client_id: &str, client_secret: &str, webhook_id: &str, base_url: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            webhook_id: webhook_id.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn access_token(&self) -> Result<String> {
        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
        }

        let response = self
            .http
            .post(format!("{}/v1/oauth2/token", self.base_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(Error::payment("Payment provider authentication failed"));
        }
        let token: TokenResponse = response.json().await.map_err(transport_error)?;
        Ok(token.access_token)
    }

    async fn capture_id_for(&self, token: &str, provider_payment_id: &str) -> Result<String> {
        let response = self
            .http
            .get(format!(
                "{}/v2/checkout/orders/{}",
                self.base_url, provider_payment_id
            ))
            .bearer_auth(token)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(redirect_error(response).await);
        }
        let body: serde_json::Value = response.json().await.map_err(transport_error)?;
        body["purchase_units"][0]["payments"]["captures"][0]["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::payment("No capture found for payment"))
    }
}

async fn redirect_error(response: reqwest::Response) -> Error {
    let body: serde_json::Value = match response.json().await {
        Ok(body) => body,
        Err(_) => return Error::payment("Payment provider returned an unreadable error"),
    };
    let message = body["details"][0]["description"]
        .as_str()
        .or_else(|| body["message"].as_str())
        .unwrap_or("Payment was rejected");
    Error::payment(message.to_string())
}

/// Format cents as the decimal string the redirect provider's API expects.
fn decimal_amount(cents: Cents) -> String {
    format!("{}.{:02}", cents / 100, (cents % 100).abs())
}

#[async_trait]
impl PaymentProvider for RedirectGateway {
    fn kind(&self) -> Provider {
        Provider::Paypal
    }

    async fn create_intent(&self, request: &IntentRequest) -> Result<ProviderIntent> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(format!("{}/v2/checkout/orders", self.base_url))
            .bearer_auth(&token)
            .json(&json!({
                "intent": "CAPTURE",
                "purchase_units": [{
                    "custom_id": request.order_id.to_string(),
                    "amount": {
                        "currency_code": request.currency.to_uppercase(),
                        "value": decimal_amount(request.amount_cents),
                    },
                }],
            }))
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(redirect_error(response).await);
        }

        let body: serde_json::Value = response.json().await.map_err(transport_error)?;
        let id = body["id"]
            .as_str()
            .ok_or_else(|| Error::payment("Payment provider returned no order id"))?
            .to_string();
        let approval_url = body["links"]
            .as_array()
            .and_then(|links| {
                links.iter().find(|link| {
                    matches!(link["rel"].as_str(), Some("approve") | Some("payer-action"))
                })
            })
            .and_then(|link| link["href"].as_str())
            .ok_or_else(|| Error::payment("Payment provider returned no approval URL"))?
            .to_string();
        Ok(ProviderIntent {
            provider_payment_id: id,
            continuation: Continuation::ApprovalUrl(approval_url),
        })
    }

    async fn confirm(&self, provider_payment_id: &str) -> Result<ProviderCharge> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(format!(
                "{}/v2/checkout/orders/{}/capture",
                self.base_url, provider_payment_id
            ))
            .bearer_auth(&token)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(redirect_error(response).await);
        }

        let body: serde_json::Value = response.json().await.map_err(transport_error)?;
        if body["status"].as_str() != Some("COMPLETED") {
            return Err(Error::payment(format!(
                "Payment not completed: {}",
                body["status"].as_str().unwrap_or("UNKNOWN")
            )));
        }
        Ok(ProviderCharge {
            provider_payment_id: provider_payment_id.to_string(),
            amount_cents: None,
        })
    }

    async fn refund(
        &self,
        provider_payment_id: &str,
        amount_cents: Cents,
        reason: &str,
    ) -> Result<ProviderRefund> {
        let token = self.access_token().await?;
        let capture_id = self.capture_id_for(&token, provider_payment_id).await?;
        let response = self
            .http
            .post(format!(
                "{}/v2/payments/captures/{}/refund",
                self.base_url, capture_id
            ))
            .bearer_auth(&token)
            .json(&json!({
                "amount": { "value": decimal_amount(amount_cents), "currency_code": "USD" },
                "note_to_payer": reason,
            }))
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(redirect_error(response).await);
        }

        let body: serde_json::Value = response.json().await.map_err(transport_error)?;
        let id = body["id"]
            .as_str()
            .ok_or_else(|| Error::payment("Payment provider returned no refund id"))?
            .to_string();
        Ok(ProviderRefund {
            provider_refund_id: id,
        })
    }

    /// The redirect provider has no shared-secret scheme; deliveries are
    /// verified through its verification endpoint before anything is
    /// parsed. `signature` carries the transmission headers as JSON.
    async fn verify_webhook(&self, signature: &str, payload: &[u8]) -> Result<WebhookEvent> {
        #[derive(Deserialize)]
        struct Transmission {
            transmission_id: String,
            transmission_time: String,
            transmission_sig: String,
            cert_url: String,
            auth_algo: String,
        }

        let transmission: Transmission = serde_json::from_str(signature)
            .map_err(|_| Error::signature("malformed transmission headers"))?;
        let event: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| Error::validation(format!("Unparseable webhook payload: {}", e)))?;

        let token = self.access_token().await?;
        let response = self
            .http
            .post(format!(
                "{}/v1/notifications/verify-webhook-signature",
                self.base_url
            ))
            .bearer_auth(&token)
            .json(&json!({
                "transmission_id": transmission.transmission_id,
                "transmission_time": transmission.transmission_time,
                "transmission_sig": transmission.transmission_sig,
                "cert_url": transmission.cert_url,
                "auth_algo": transmission.auth_algo,
                "webhook_id": self.webhook_id.clone(),
                "webhook_event": event.clone(),
            }))
            .send()
            .await
            .map_err(transport_error)?;
        let verdict: serde_json::Value = response.json().await.map_err(transport_error)?;
        if verdict["verification_status"].as_str() != Some("SUCCESS") {
            return Err(Error::signature("provider rejected webhook signature"));
        }

        let event_id = event["id"]
            .as_str()
            .ok_or_else(|| Error::validation("Webhook event has no id"))?
            .to_string();
        let resource = &event["resource"];
        let provider_payment_id = resource["supplementary_data"]["related_ids"]["order_id"]
            .as_str()
            .or_else(|| resource["custom_id"].as_str())
            .or_else(|| resource["id"].as_str())
            .unwrap_or_default()
            .to_string();
        let kind = match event["event_type"].as_str().unwrap_or_default() {
            "PAYMENT.CAPTURE.COMPLETED" => WebhookEventKind::PaymentSucceeded,
            "PAYMENT.CAPTURE.DENIED" => WebhookEventKind::PaymentFailed {
                message: event["summary"]
                    .as_str()
                    .unwrap_or("Payment was denied")
                    .to_string(),
            },
            "PAYMENT.CAPTURE.REFUNDED" => WebhookEventKind::RefundCompleted {
                amount_cents: resource["amount"]["value"]
                    .as_str()
                    .and_then(|value| value.parse::<f64>().ok())
                    .map(cents_from_dollars)
                    .unwrap_or(0),
            },
            other => WebhookEventKind::Other(other.to_string()),
        };
        Ok(WebhookEvent {
            event_id,
            provider_payment_id,
            kind,
        })
    }
}
