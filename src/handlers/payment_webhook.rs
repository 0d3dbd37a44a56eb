//! Payment gateway webhook handler.
//!
//! - POST /api/v1/webhooks/payment
//!
//! The gateway signs the raw request body with HMAC-SHA256 and sends the
//! hex signature in `X-Payment-Signature`. Verification happens over the
//! exact bytes received, before any JSON parsing, so re-serialization
//! differences cannot break or forge signatures.

use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{AppState, crypto, error::AppError, services::order_service};

/// Signature header set by the payment gateway.
const SIGNATURE_HEADER: &str = "x-payment-signature";

/// Webhook body sent by the gateway.
#[derive(Debug, Deserialize)]
struct PaymentNotification {
    order_no: String,

    /// Gateway payment status; only "success" triggers delivery
    status: String,
}

/// Receive a payment notification.
///
/// # Flow
///
/// 1. Reject outright when no webhook secret is configured
/// 2. Verify the HMAC signature over the raw body (constant-time)
/// 3. Parse the JSON payload
/// 4. On `status == "success"`, confirm payment with `force`: a signed
///    gateway notification means money moved, even if the reservation
///    lapsed in the meantime
///
/// Non-success statuses are acknowledged and ignored so the gateway
/// stops retrying them.
pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let Some(secret) = state.config.payment_webhook_secret.as_deref() else {
        return Err(AppError::Validation(
            "payment webhook is not configured".to_string(),
        ));
    };

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    if !crypto::verify_webhook_signature(secret, &body, signature) {
        tracing::warn!("payment webhook rejected: bad signature");
        return Err(AppError::InvalidSignature);
    }

    let notification: PaymentNotification = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("invalid webhook body: {e}")))?;

    if notification.order_no.is_empty() {
        return Err(AppError::Validation("order_no required".to_string()));
    }

    if notification.status != "success" {
        return Ok(Json(json!({ "ok": true, "ignored": true })));
    }

    let outcome =
        order_service::confirm_payment_and_deliver(&state.pool, &notification.order_no, true)
            .await?;

    Ok(Json(json!({ "ok": true, "result": outcome })))
}
