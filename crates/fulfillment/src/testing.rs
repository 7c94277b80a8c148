//! In-process fakes for the external providers.
//!
//! Used by the crate's own tests and by the integration-test harness; kept
//! in the library so both can share one implementation.

#![allow(clippy::unwrap_used)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use tidepool_core::{Order, ProviderMessageId, ShipmentId, TrackingState};

use crate::carrier::{CarrierApi, CarrierError, CreatedShipment};
use crate::notify::{EmailApi, EmailError, OutboundEmail};

/// Fake carrier with scripted responses.
pub struct FakeCarrier {
    counter: AtomicU64,
    created: Mutex<Vec<(ShipmentId, u32)>>,
    next_shipment_id: Mutex<Option<String>>,
    reject_next: Mutex<Option<(u16, String)>>,
    tracking: Mutex<Vec<TrackingState>>,
}

impl FakeCarrier {
    #[must_use]
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
            created: Mutex::new(Vec::new()),
            next_shipment_id: Mutex::new(None),
            reject_next: Mutex::new(None),
            tracking: Mutex::new(Vec::new()),
        }
    }

    /// Force the next created shipment to use this ID instead of the
    /// generated sequence.
    pub fn set_next_shipment_id(&self, id: impl Into<String>) {
        *self.next_shipment_id.lock().unwrap() = Some(id.into());
    }

    /// Make the next `create_shipment` fail with the given status.
    pub fn reject_next(&self, status: u16, message: impl Into<String>) {
        *self.reject_next.lock().unwrap() = Some((status, message.into()));
    }

    /// Script the tracking state returned for its shipment ID.
    pub fn set_tracking(&self, state: TrackingState) {
        let mut tracking = self.tracking.lock().unwrap();
        tracking.retain(|t| t.shipment_id != state.shipment_id);
        tracking.push(state);
    }

    /// Shipments created so far, with their weights.
    #[must_use]
    pub fn created(&self) -> Vec<(ShipmentId, u32)> {
        self.created.lock().unwrap().clone()
    }
}

impl Default for FakeCarrier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CarrierApi for FakeCarrier {
    async fn create_shipment(
        &self,
        _order: &Order,
        weight_grams: u32,
    ) -> Result<CreatedShipment, CarrierError> {
        if let Some((status, message)) = self.reject_next.lock().unwrap().take() {
            return Err(CarrierError::Rejected { status, message });
        }

        let id = self.next_shipment_id.lock().unwrap().take().map_or_else(
            || format!("PKT-{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1),
            |preset| preset,
        );
        let shipment_id = ShipmentId::new(id);
        self.created
            .lock()
            .unwrap()
            .push((shipment_id.clone(), weight_grams));

        Ok(CreatedShipment {
            tracking_url: format!("https://track.example.com/{shipment_id}"),
            label_url: None,
            shipment_id,
        })
    }

    async fn get_tracking(&self, shipment_id: &ShipmentId) -> Result<TrackingState, CarrierError> {
        let tracking = self.tracking.lock().unwrap();
        Ok(tracking
            .iter()
            .find(|t| &t.shipment_id == shipment_id)
            .cloned()
            .unwrap_or_else(|| TrackingState::unknown(shipment_id.clone())))
    }
}

/// Fake email provider with a send log.
pub struct FakeEmailProvider {
    counter: AtomicU64,
    sent: Mutex<Vec<OutboundEmail>>,
    fail_remaining: AtomicU64,
}

impl FakeEmailProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
            sent: Mutex::new(Vec::new()),
            fail_remaining: AtomicU64::new(0),
        }
    }

    /// Make the next `n` sends fail with a provider rejection.
    pub fn fail_next_sends(&self, n: u64) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    /// Emails accepted so far.
    #[must_use]
    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().unwrap().clone()
    }
}

impl Default for FakeEmailProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmailApi for FakeEmailProvider {
    async fn send(&self, email: &OutboundEmail) -> Result<ProviderMessageId, EmailError> {
        if self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(EmailError::Rejected {
                status: 503,
                message: "scripted failure".to_owned(),
            });
        }

        self.sent.lock().unwrap().push(email.clone());
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ProviderMessageId::new(format!("msg-test-{n}")))
    }
}
