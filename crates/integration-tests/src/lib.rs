//! End-to-end test harness for the fulfillment server.
//!
//! Builds the real router over the real pipeline with fake carrier and
//! email providers and shared in-memory stores, then drives it through
//! `tower::ServiceExt::oneshot` without binding a socket.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::SecretString;
use serde_json::Value;
use sha2::Sha256;
use tower::ServiceExt as _;

use tidepool_core::{CurrencyCode, Order, OrderStatus};
use tidepool_fulfillment::notify::NotificationDispatcher;
use tidepool_fulfillment::quote::{RateCard, RateTier, WeightTable};
use tidepool_fulfillment::store::{
    InMemoryCartStore, InMemoryIdempotencyStore, InMemoryNotificationStore,
    InMemoryOrderRepository, OrderRepository as _,
};
use tidepool_fulfillment::testing::{FakeCarrier, FakeEmailProvider};
use tidepool_fulfillment::{Orchestrator, WebhookProcessor};
use tidepool_server::config::{CarrierConfig, EmailConfig, ServerConfig};
use tidepool_server::state::AppState;

pub const PAYMENT_SECRET: &str = "payment-signing-secret-test";
pub const EMAIL_KEY: &[u8] = b"email-webhook-key-32-bytes-long!";
pub const CARRIER_TOKEN: &str = "carrier-shared-token-test";
pub const ADMIN_TOKEN: &str = "admin-bearer-token-test";

/// The server wired for tests: real router and pipeline, fake providers,
/// with handles to the shared stores for assertions.
pub struct TestApp {
    pub router: Router,
    pub orders: Arc<InMemoryOrderRepository>,
    pub carts: Arc<InMemoryCartStore>,
    pub notifications: Arc<InMemoryNotificationStore>,
    pub carrier: Arc<FakeCarrier>,
    pub email: Arc<FakeEmailProvider>,
}

impl TestApp {
    #[must_use]
    pub fn new() -> Self {
        let orders = Arc::new(InMemoryOrderRepository::new());
        let carts = Arc::new(InMemoryCartStore::new());
        let notifications = Arc::new(InMemoryNotificationStore::new());
        let carrier = Arc::new(FakeCarrier::new());
        let email = Arc::new(FakeEmailProvider::new());

        let config = test_config();
        let dispatcher = NotificationDispatcher::new(
            email.clone(),
            notifications.clone(),
            config.store_name.clone(),
        );
        let orchestrator = Orchestrator::new(
            orders.clone(),
            carts.clone(),
            carrier.clone(),
            dispatcher,
            rate_card(),
        );
        let processor = WebhookProcessor::new(
            orchestrator.clone(),
            Arc::new(InMemoryIdempotencyStore::default()),
            config.payment_webhook_secret.clone(),
            config.email_webhook_secret.clone(),
            config.carrier_webhook_token.clone(),
        );

        let state = AppState::with_pipeline(config, orchestrator, processor);
        Self {
            router: tidepool_server::build_router(state),
            orders,
            carts,
            notifications,
            carrier,
            email,
        }
    }

    /// Run one request through the router and decode the response body.
    pub async fn request(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, body)
    }

    pub async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.request(
            Request::builder()
                .method("GET")
                .uri(path)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// POST raw bytes with the given extra headers.
    pub async fn post(
        &self,
        path: &str,
        headers: &[(&str, String)],
        body: Vec<u8>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, value);
        }
        self.request(builder.body(Body::from(body)).unwrap()).await
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> (StatusCode, Value) {
        self.post(path, &[], body.to_string().into_bytes()).await
    }

    /// POST a JSON body with the admin bearer token.
    pub async fn post_admin(&self, path: &str, body: &Value) -> (StatusCode, Value) {
        self.post(
            path,
            &[("authorization", format!("Bearer {ADMIN_TOKEN}"))],
            body.to_string().into_bytes(),
        )
        .await
    }

    /// Deliver a signed payment confirmation and return the resulting
    /// order from the store.
    pub async fn confirm_payment(&self, event_id: &str, reference: &str) -> Order {
        let body = payment_event(event_id, reference, None);
        let (status, _) = self
            .post(
                "/webhooks/payment",
                &[("x-payment-signature", payment_signature(&body))],
                body,
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        self.orders
            .get_by_payment_reference(reference)
            .await
            .unwrap()
            .unwrap()
    }

    /// Current status of an order, read back from the store.
    pub async fn order_status(&self, order: &Order) -> OrderStatus {
        self.orders.get(order.id).await.unwrap().unwrap().status
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".parse().unwrap(),
        port: 0,
        store_name: "Tidepool Supply".to_owned(),
        payment_webhook_secret: SecretString::from(PAYMENT_SECRET),
        email_webhook_secret: SecretString::from(format!("whsec_{}", BASE64.encode(EMAIL_KEY))),
        carrier_webhook_token: SecretString::from(CARRIER_TOKEN),
        admin_api_token: SecretString::from(ADMIN_TOKEN),
        carrier: CarrierConfig {
            base_url: "http://carrier.invalid".to_owned(),
            api_key: SecretString::from("carrier-test-key"),
            name: "Northline".to_owned(),
        },
        email: EmailConfig {
            base_url: "http://email.invalid".to_owned(),
            api_key: SecretString::from("email-test-key"),
            from_address: "orders@tidepoolsupply.com".to_owned(),
        },
        quote_currency: CurrencyCode::Sek,
        reconcile_interval_secs: 0,
        sentry_dsn: None,
        sentry_environment: None,
    }
}

fn rate_card() -> RateCard {
    RateCard::new(
        "Northline",
        CurrencyCode::Sek,
        WeightTable::new()
            .with_category("apparel", 350)
            .with_category("footwear", 900),
        vec![
            RateTier {
                max_weight_grams: 1_000,
                pickup_point_minor: 495,
                home_delivery_minor: 795,
            },
            RateTier {
                max_weight_grams: 5_000,
                pickup_point_minor: 895,
                home_delivery_minor: 1_295,
            },
        ],
    )
}

/// A well-formed payment confirmation body for two t-shirts.
#[must_use]
pub fn payment_event(event_id: &str, reference: &str, session_id: Option<&str>) -> Vec<u8> {
    let mut event = serde_json::json!({
        "id": event_id,
        "type": "payment.confirmed",
        "data": {
            "payment_id": reference,
            "amount_total": 4295,
            "currency": "SEK",
            "shipping_amount": 495,
            "customer": {"email": "jo@example.com", "name": "Jo Berg"},
            "delivery": {"method": "pickup", "pickup_point_id": "pp-77", "pickup_point_name": "Corner Kiosk"},
            "items": [
                {"product_id": "tshirt-1", "name": "T-shirt", "quantity": 2, "unit_price": 1900, "size": "M"}
            ]
        }
    });
    if let Some(session) = session_id {
        event["data"]["session_id"] = session.into();
    }
    event.to_string().into_bytes()
}

/// Sign a payment body for the current clock.
#[must_use]
pub fn payment_signature(body: &[u8]) -> String {
    let timestamp = Utc::now().timestamp();
    let mut mac = Hmac::<Sha256>::new_from_slice(PAYMENT_SECRET.as_bytes()).unwrap();
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    format!(
        "t={timestamp},v1={}",
        hex::encode(mac.finalize().into_bytes())
    )
}

/// The three email-provider signature headers for a body.
#[must_use]
pub fn email_signature_headers(webhook_id: &str, body: &[u8]) -> [(&'static str, String); 3] {
    let timestamp = Utc::now().timestamp().to_string();
    let mut mac = Hmac::<Sha256>::new_from_slice(EMAIL_KEY).unwrap();
    mac.update(webhook_id.as_bytes());
    mac.update(b".");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    let signature = format!("v1,{}", BASE64.encode(mac.finalize().into_bytes()));
    [
        ("webhook-id", webhook_id.to_owned()),
        ("webhook-timestamp", timestamp),
        ("webhook-signature", signature),
    ]
}
