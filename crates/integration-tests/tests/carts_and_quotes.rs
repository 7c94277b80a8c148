//! Shipping quotes and abandoned-cart tracking over HTTP.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use serde_json::json;

use tidepool_fulfillment::store::CartStore as _;
use tidepool_integration_tests::{TestApp, payment_event, payment_signature};

#[tokio::test]
async fn quote_is_deterministic() {
    let app = TestApp::new();
    let request = json!({
        "items": [
            {"product_id": "tshirt-1", "category": "apparel", "quantity": 2}
        ],
        "delivery_method": "pickup_point"
    });

    let (status, first) = app.post_json("/api/quotes", &request).await;
    let (_, second) = app.post_json("/api/quotes", &request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(first, second);
    assert_eq!(first["amount_minor"], 495);
    assert_eq!(first["currency"], "SEK");
    assert_eq!(first["carrier_service"], "Northline Pickup");
    assert_eq!(first["total_weight_grams"], 700);
}

#[tokio::test]
async fn quote_crosses_weight_tiers() {
    let app = TestApp::new();
    let (_, quote) = app
        .post_json(
            "/api/quotes",
            &json!({
                "items": [
                    {"product_id": "boot-1", "category": "footwear", "quantity": 3}
                ],
                "delivery_method": "home_delivery"
            }),
        )
        .await;

    // 2700 g lands in the second tier.
    assert_eq!(quote["total_weight_grams"], 2700);
    assert_eq!(quote["amount_minor"], 1295);
    assert_eq!(quote["carrier_service"], "Northline Home");
}

#[tokio::test]
async fn quote_with_unknown_item_is_unprocessable() {
    let app = TestApp::new();
    let (status, response) = app
        .post_json(
            "/api/quotes",
            &json!({
                "items": [{"product_id": "mystery-1", "quantity": 1}],
                "delivery_method": "pickup_point"
            }),
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(
        response["error"]
            .as_str()
            .unwrap()
            .contains("mystery-1")
    );
}

#[tokio::test]
async fn quote_with_invalid_delivery_method_is_bad_request() {
    let app = TestApp::new();
    let (status, _) = app
        .post_json(
            "/api/quotes",
            &json!({
                "items": [{"product_id": "tshirt-1", "category": "apparel", "quantity": 1}],
                "delivery_method": "drone"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

fn cart_body(session_id: &str) -> serde_json::Value {
    json!({
        "session_id": session_id,
        "items": [
            {"product_id": "tshirt-1", "name": "T-shirt", "quantity": 2, "unit_price_minor": 1900}
        ],
        "amount_total_minor": 3800,
        "currency": "SEK",
        "customer_email": "jo@example.com",
        "customer_name": "Jo Berg"
    })
}

#[tokio::test]
async fn abandoned_cart_is_recovered_by_matching_payment() {
    let app = TestApp::new();

    let (status, _) = app.post_json("/api/cart", &cart_body("sess-9")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, response) = app.post_json("/api/cart/sess-9/abandon", &json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["abandoned"], true);

    // Checkout completes with the same session attached.
    let body = payment_event("evt_1", "pi_1", Some("sess-9"));
    let (status, _) = app
        .post(
            "/webhooks/payment",
            &[("x-payment-signature", payment_signature(&body))],
            body,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let cart = app
        .carts
        .get(&tidepool_core::SessionId::new("sess-9"))
        .await
        .unwrap()
        .unwrap();
    assert!(cart.recovered_at.is_some());
    assert!(cart.abandoned_at.is_none());

    // A stale sweep after recovery must not flip it back.
    let (_, response) = app.post_json("/api/cart/sess-9/abandon", &json!({})).await;
    assert_eq!(response["abandoned"], false);
}

#[tokio::test]
async fn cart_update_clears_abandoned_marker() {
    let app = TestApp::new();
    app.post_json("/api/cart", &cart_body("sess-9")).await;
    app.post_json("/api/cart/sess-9/abandon", &json!({})).await;

    // The customer comes back and touches the cart.
    let (status, response) = app.post_json("/api/cart", &cart_body("sess-9")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(response["cart"]["abandoned_at"].is_null());
}

#[tokio::test]
async fn abandoning_unknown_session_is_a_noop() {
    let app = TestApp::new();
    let (status, response) = app
        .post_json("/api/cart/sess-missing/abandon", &json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["abandoned"], false);
    assert!(response["cart"].is_null());
}
