//! Carrier API client.
//!
//! Wraps the shipping provider's shipment-creation and tracking API and
//! normalizes its responses into the internal tracking representation.
//! Creation failures are hard errors (the orchestrator persists nothing on
//! rejection); tracking lookups are best-effort and degrade to
//! [`TrackingStatus::Unknown`] rather than blocking order processing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

use tidepool_core::{
    DeliveryPoint, Order, ShipmentId, TrackingEvent, TrackingState, TrackingStatus,
};

/// Errors from the carrier API.
#[derive(Debug, Error)]
pub enum CarrierError {
    /// Provider returned a non-2xx response to a shipment creation.
    #[error("carrier rejected request: {status} {message}")]
    Rejected { status: u16, message: String },

    /// Network failure or timeout. Retryable.
    #[error("carrier request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body did not match any known shape.
    #[error("carrier response unparseable: {0}")]
    Parse(String),
}

/// A successfully created shipment.
#[derive(Debug, Clone)]
pub struct CreatedShipment {
    pub shipment_id: ShipmentId,
    pub tracking_url: String,
    pub label_url: Option<String>,
}

/// Shipment creation and tracking operations.
#[async_trait]
pub trait CarrierApi: Send + Sync {
    /// Register a shipment for an order.
    ///
    /// # Errors
    ///
    /// Returns [`CarrierError::Rejected`] on a non-2xx provider response;
    /// the caller must not persist anything in that case.
    async fn create_shipment(
        &self,
        order: &Order,
        weight_grams: u32,
    ) -> Result<CreatedShipment, CarrierError>;

    /// Fetch normalized tracking state for a shipment.
    ///
    /// # Errors
    ///
    /// Returns [`CarrierError::Http`] when the provider is unreachable.
    /// An unknown status in a well-formed response is not an error.
    async fn get_tracking(&self, shipment_id: &ShipmentId)
        -> Result<TrackingState, CarrierError>;
}

/// Map a provider status string onto the internal status enum.
///
/// Providers rename these across API versions; anything unrecognized maps
/// to `Unknown` instead of failing.
#[must_use]
pub fn normalize_status(raw: &str) -> TrackingStatus {
    match raw.to_ascii_lowercase().as_str() {
        "delivered" | "delivery_completed" => TrackingStatus::Delivered,
        "in_transit" | "transit" | "en_route" | "shipped" => TrackingStatus::InTransit,
        "out_for_delivery" | "delivery_in_progress" => TrackingStatus::OutForDelivery,
        "created" | "registered" | "info_received" | "pending" | "label_printed" => {
            TrackingStatus::Pending
        }
        "returned" | "return_to_sender" | "returned_to_sender" => {
            TrackingStatus::ReturnedToSender
        }
        _ => TrackingStatus::Unknown,
    }
}

/// HTTP carrier client.
///
/// Cheap to clone; all requests share one connection pool and a bounded
/// 30-second timeout so a stalled provider surfaces as a retryable
/// failure instead of hanging a webhook handler.
#[derive(Clone)]
pub struct HttpCarrierClient {
    inner: Arc<CarrierClientInner>,
}

struct CarrierClientInner {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl HttpCarrierClient {
    /// Create a carrier client for the given API base URL.
    ///
    /// # Errors
    ///
    /// Returns [`CarrierError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, api_key: SecretString) -> Result<Self, CarrierError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            inner: Arc::new(CarrierClientInner {
                client,
                base_url: base_url.into().trim_end_matches('/').to_owned(),
                api_key,
            }),
        })
    }
}

#[derive(Debug, Deserialize)]
struct CreateShipmentResponse {
    #[serde(alias = "shipmentId", alias = "parcel_id")]
    shipment_id: String,
    #[serde(alias = "trackingUrl", alias = "tracking_link")]
    tracking_url: String,
    #[serde(alias = "labelUrl", default)]
    label_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrackingResponse {
    #[serde(alias = "statusCode", alias = "status_code")]
    status: Option<String>,
    #[serde(alias = "statusText", alias = "status_description", default)]
    status_text: Option<String>,
    #[serde(alias = "currentLocation", alias = "last_location", default)]
    location: Option<String>,
    #[serde(alias = "estimatedDelivery", alias = "eta", default)]
    estimated_delivery: Option<DateTime<Utc>>,
    #[serde(alias = "deliveredAt", alias = "actual_delivery", default)]
    delivered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    events: Vec<TrackingEventResponse>,
}

#[derive(Debug, Deserialize)]
struct TrackingEventResponse {
    #[serde(alias = "occurredAt", alias = "time")]
    timestamp: DateTime<Utc>,
    #[serde(alias = "statusCode", alias = "status_code")]
    status: String,
    #[serde(alias = "statusText", default)]
    description: Option<String>,
    #[serde(default)]
    location: Option<String>,
}

#[async_trait]
impl CarrierApi for HttpCarrierClient {
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    async fn create_shipment(
        &self,
        order: &Order,
        weight_grams: u32,
    ) -> Result<CreatedShipment, CarrierError> {
        let destination = match &order.delivery_point {
            DeliveryPoint::PickupPoint { id, .. } => serde_json::json!({
                "type": "pickup_point",
                "pickup_point_id": id,
            }),
            DeliveryPoint::Address {
                street,
                postal_code,
                city,
                country,
            } => serde_json::json!({
                "type": "address",
                "street": street,
                "postal_code": postal_code,
                "city": city,
                "country": country,
            }),
        };

        let body = serde_json::json!({
            "reference": order.id.to_string(),
            "recipient": {
                "name": order.customer.name,
                "email": order.customer.email.as_str(),
                "phone": order.customer.phone,
            },
            "destination": destination,
            "weight_grams": weight_grams,
            "declared_value_minor": order.amount_total.as_minor_units(),
            "currency": order.amount_total.currency_code.code(),
        });

        let response = self
            .inner
            .client
            .post(format!("{}/shipments", self.inner.base_url))
            .bearer_auth(self.inner.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CarrierError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let created: CreateShipmentResponse = response
            .json()
            .await
            .map_err(|e| CarrierError::Parse(e.to_string()))?;

        Ok(CreatedShipment {
            shipment_id: ShipmentId::new(created.shipment_id),
            tracking_url: created.tracking_url,
            label_url: created.label_url,
        })
    }

    #[instrument(skip(self))]
    async fn get_tracking(
        &self,
        shipment_id: &ShipmentId,
    ) -> Result<TrackingState, CarrierError> {
        let response = self
            .inner
            .client
            .get(format!(
                "{}/shipments/{}/tracking",
                self.inner.base_url, shipment_id
            ))
            .bearer_auth(self.inner.api_key.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CarrierError::Rejected {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CarrierError::Parse(e.to_string()))?;
        let parsed: TrackingResponse = serde_json::from_value(raw.clone())
            .map_err(|e| CarrierError::Parse(e.to_string()))?;

        Ok(normalize_tracking(shipment_id.clone(), parsed, raw))
    }
}

fn normalize_tracking(
    shipment_id: ShipmentId,
    parsed: TrackingResponse,
    raw: serde_json::Value,
) -> TrackingState {
    let status_raw = parsed.status.unwrap_or_default();
    let status = normalize_status(&status_raw);

    let mut events: Vec<TrackingEvent> = parsed
        .events
        .into_iter()
        .map(|event| TrackingEvent {
            timestamp: event.timestamp,
            status: normalize_status(&event.status),
            description: event.description.unwrap_or_else(|| event.status.clone()),
            location: event.location,
        })
        .collect();
    // Providers disagree on event ordering; history is chronological,
    // oldest first.
    events.sort_by_key(|e| e.timestamp);

    TrackingState {
        shipment_id,
        status,
        status_text: parsed.status_text.unwrap_or(status_raw),
        current_location: parsed.location,
        estimated_delivery: parsed.estimated_delivery,
        actual_delivery: parsed.delivered_at,
        events,
        raw,
    }
}
