//! Order admin and tracking route handlers.

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use tidepool_core::{NotificationId, OrderId, OrderStatus};
use tidepool_fulfillment::orchestrator::ReconcileSummary;

use crate::error::Result;
use crate::state::AppState;

/// Body for the admin status-advance command.
#[derive(Debug, Deserialize)]
pub struct AdvanceStatusRequest {
    pub status: OrderStatus,
}

/// Body for an ad hoc support reply.
#[derive(Debug, Deserialize)]
pub struct SupportReplyRequest {
    pub subject: String,
    pub html_body: String,
}

/// Advance an order to a target status (admin).
#[instrument(skip(state))]
pub async fn advance_status(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    Json(request): Json<AdvanceStatusRequest>,
) -> Result<Json<Value>> {
    let outcome = state
        .orchestrator()
        .advance_order_status(id, request.status)
        .await?;

    Ok(Json(json!({
        "order": outcome.order,
        "changed": outcome.changed,
        "notification_error": outcome.notification_error,
    })))
}

/// Customer tracking lookup.
#[instrument(skip(state))]
pub async fn tracking(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
) -> Result<Json<Value>> {
    let (order, tracking) = state.orchestrator().tracking_for_order(id).await?;

    Ok(Json(json!({
        "order_id": order.id,
        "status": order.status,
        "shipment_id": order.shipment_id,
        "tracking_url": order.tracking_url,
        "tracking": tracking,
    })))
}

/// Send an ad hoc support reply about an order (admin).
#[instrument(skip(state, request))]
pub async fn send_support_reply(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    Json(request): Json<SupportReplyRequest>,
) -> Result<Json<Value>> {
    let record = state
        .orchestrator()
        .send_support_reply(id, request.subject, request.html_body)
        .await?;
    Ok(Json(json!({ "notification": record })))
}

/// Re-send a failed notification (admin).
#[instrument(skip(state))]
pub async fn resend_notification(
    State(state): State<AppState>,
    Path(id): Path<NotificationId>,
) -> Result<Json<Value>> {
    let record = state.orchestrator().resend_notification(id).await?;
    Ok(Json(json!({ "notification": record })))
}

/// Reconciliation sweep over shipped orders (cron trigger).
#[instrument(skip(state))]
pub async fn reconcile(State(state): State<AppState>) -> Result<Json<ReconcileSummary>> {
    let summary = state.orchestrator().reconcile_shipments().await?;
    Ok(Json(summary))
}
