//! Webhook route handlers.
//!
//! Raw-body handlers: signature verification needs the exact bytes the
//! provider signed, so nothing here goes through a typed JSON extractor.
//! Duplicates are acknowledged with 200 and the cached outcome - a 4xx/5xx
//! would make the provider retry an event we already handled.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::instrument;

use tidepool_fulfillment::webhook::IngestOutcome;

use crate::error::{AppError, Result};
use crate::state::AppState;

/// Payment provider webhook (`X-Payment-Signature: t=<unix>,v1=<hex>`).
#[instrument(skip_all)]
pub async fn payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let signature = header_str(&headers, "x-payment-signature")?;

    let outcome = state
        .processor()
        .process_payment(signature, &body, Utc::now().timestamp())
        .await?;
    Ok(Json(ingest_response(&outcome)))
}

/// Email provider delivery-status webhook (`webhook-id` /
/// `webhook-timestamp` / `webhook-signature` headers).
#[instrument(skip_all)]
pub async fn email(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let webhook_id = header_str(&headers, "webhook-id")?;
    let timestamp = header_str(&headers, "webhook-timestamp")?;
    let signature = header_str(&headers, "webhook-signature")?;

    let outcome = state
        .processor()
        .process_email_status(
            webhook_id,
            timestamp,
            signature,
            &body,
            Utc::now().timestamp(),
        )
        .await?;
    Ok(Json(ingest_response(&outcome)))
}

/// Carrier status push, authenticated by a shared token header.
#[instrument(skip_all)]
pub async fn carrier(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let token = headers
        .get("x-carrier-token")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing carrier token".to_string()))?;

    let outcome = state.processor().process_carrier(token, &body).await?;
    Ok(Json(ingest_response(&outcome)))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::BadRequest(format!("missing {name} header")))
}

fn ingest_response(outcome: &IngestOutcome) -> Value {
    let status = match outcome {
        IngestOutcome::Processed(_) => "processed",
        IngestOutcome::Duplicate(_) => "duplicate",
        IngestOutcome::InFlight => "in_flight",
    };
    json!({ "status": status, "summary": outcome.summary() })
}
