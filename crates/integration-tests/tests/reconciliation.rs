//! The reconciliation sweep: the fallback path for lost carrier webhooks.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use serde_json::json;

use tidepool_core::{OrderStatus, ShipmentId, TrackingState, TrackingStatus};
use tidepool_integration_tests::TestApp;

#[tokio::test]
async fn sweep_marks_delivered_shipments() {
    let app = TestApp::new();
    let order = app.confirm_payment("evt_1", "pi_1").await;
    app.carrier.set_next_shipment_id("PKT-9");
    app.post_admin(
        &format!("/api/orders/{}/status", order.id),
        &json!({"status": "shipped"}),
    )
    .await;

    // The carrier knows the parcel arrived; the webhook never did.
    app.carrier.set_tracking(TrackingState {
        status: TrackingStatus::Delivered,
        ..TrackingState::unknown(ShipmentId::new("PKT-9"))
    });

    let (status, summary) = app.post_admin("/internal/reconcile", &json!({})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["checked"], 1);
    assert_eq!(summary["delivered"], 1);
    assert_eq!(summary["failed"], 0);
    assert_eq!(app.order_status(&order).await, OrderStatus::Delivered);
    assert_eq!(app.email.sent().len(), 3);
}

#[tokio::test]
async fn sweep_leaves_in_transit_shipments_alone() {
    let app = TestApp::new();
    let order = app.confirm_payment("evt_1", "pi_1").await;
    app.carrier.set_next_shipment_id("PKT-9");
    app.post_admin(
        &format!("/api/orders/{}/status", order.id),
        &json!({"status": "shipped"}),
    )
    .await;
    app.carrier.set_tracking(TrackingState {
        status: TrackingStatus::InTransit,
        ..TrackingState::unknown(ShipmentId::new("PKT-9"))
    });

    let (_, summary) = app.post_admin("/internal/reconcile", &json!({})).await;

    assert_eq!(summary["checked"], 1);
    assert_eq!(summary["delivered"], 0);
    assert_eq!(app.order_status(&order).await, OrderStatus::Shipped);
}

#[tokio::test]
async fn second_sweep_finds_nothing_left_to_do() {
    let app = TestApp::new();
    let order = app.confirm_payment("evt_1", "pi_1").await;
    app.carrier.set_next_shipment_id("PKT-9");
    app.post_admin(
        &format!("/api/orders/{}/status", order.id),
        &json!({"status": "shipped"}),
    )
    .await;
    app.carrier.set_tracking(TrackingState {
        status: TrackingStatus::Delivered,
        ..TrackingState::unknown(ShipmentId::new("PKT-9"))
    });

    app.post_admin("/internal/reconcile", &json!({})).await;
    let (_, summary) = app.post_admin("/internal/reconcile", &json!({})).await;

    assert_eq!(summary["checked"], 0);
    assert_eq!(summary["delivered"], 0);
    assert_eq!(app.order_status(&order).await, OrderStatus::Delivered);
    // Only one delivered notification went out.
    assert_eq!(app.email.sent().len(), 3);
}

#[tokio::test]
async fn sweep_requires_admin_token() {
    let app = TestApp::new();
    let (status, _) = app.post_json("/internal/reconcile", &json!({})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
