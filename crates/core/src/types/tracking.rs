//! Normalized shipment tracking state.
//!
//! Carriers report tracking in provider-specific shapes; the carrier client
//! folds them into this one internal representation immediately at the
//! boundary. Tracking state is derived data: the carrier is the source of
//! truth and the order record is the cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ShipmentId;

/// Normalized carrier tracking status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    /// Shipment registered, not yet picked up.
    Pending,
    InTransit,
    OutForDelivery,
    Delivered,
    /// Returned to sender.
    ReturnedToSender,
    /// Provider reported something we do not recognize. Tracking is
    /// best-effort; unknown never blocks order processing.
    #[default]
    Unknown,
}

/// One event in a shipment's history, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub timestamp: DateTime<Utc>,
    pub status: TrackingStatus,
    pub description: String,
    pub location: Option<String>,
}

/// Normalized tracking state for one shipment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingState {
    pub shipment_id: ShipmentId,
    pub status: TrackingStatus,
    /// Human-readable status text from the provider.
    pub status_text: String,
    pub current_location: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub actual_delivery: Option<DateTime<Utc>>,
    /// Chronological event history, oldest first.
    pub events: Vec<TrackingEvent>,
    /// Raw provider payload, kept opaque for debugging.
    pub raw: serde_json::Value,
}

impl TrackingState {
    /// Whether the carrier reports this shipment as delivered.
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self.status, TrackingStatus::Delivered)
    }

    /// A placeholder state for when the carrier is unreachable.
    #[must_use]
    pub fn unknown(shipment_id: ShipmentId) -> Self {
        Self {
            shipment_id,
            status: TrackingStatus::Unknown,
            status_text: "unknown".to_owned(),
            current_location: None,
            estimated_delivery: None,
            actual_delivery: None,
            events: Vec::new(),
            raw: serde_json::Value::Null,
        }
    }
}
