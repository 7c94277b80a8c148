//! Webhook ingestion.
//!
//! Every inbound event runs the same gauntlet: verify the provider's
//! signature, parse the payload, reserve the event ID, do the work, record
//! the outcome. Verification and parsing happen before the reservation so
//! a rejected delivery never consumes an event ID; a failed unit of work
//! releases its reservation so the provider's retry gets a clean run.

mod payloads;
mod signature;

pub use payloads::{
    CarrierStatusEvent, EmailStatusEvent, PaymentConfirmed, parse_carrier_event,
    parse_email_event, parse_payment_event,
};
pub use signature::{
    SignatureError, constant_time_eq, verify_email_signature, verify_payment_signature,
};

use std::sync::Arc;

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, instrument, warn};

use crate::error::FulfillmentError;
use crate::orchestrator::Orchestrator;
use crate::store::{IdempotencyStore, ProcessedOutcome, Reservation};

/// Result of ingesting one webhook delivery.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// First delivery; the work ran.
    Processed(ProcessedOutcome),
    /// Re-delivery of an already-processed event; cached outcome returned,
    /// no work ran.
    Duplicate(ProcessedOutcome),
    /// Another delivery of this event is being processed right now.
    InFlight,
}

impl IngestOutcome {
    /// Short summary for response bodies and logs.
    #[must_use]
    pub fn summary(&self) -> &str {
        match self {
            Self::Processed(outcome) | Self::Duplicate(outcome) => &outcome.summary,
            Self::InFlight => "in_flight",
        }
    }

    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_) | Self::InFlight)
    }
}

/// Verifies, deduplicates, and dispatches inbound webhooks.
#[derive(Clone)]
pub struct WebhookProcessor {
    orchestrator: Orchestrator,
    idempotency: Arc<dyn IdempotencyStore>,
    payment_secret: SecretString,
    email_secret: SecretString,
    carrier_token: SecretString,
}

impl WebhookProcessor {
    pub fn new(
        orchestrator: Orchestrator,
        idempotency: Arc<dyn IdempotencyStore>,
        payment_secret: SecretString,
        email_secret: SecretString,
        carrier_token: SecretString,
    ) -> Self {
        Self {
            orchestrator,
            idempotency,
            payment_secret,
            email_secret,
            carrier_token,
        }
    }

    /// Ingest a payment provider webhook delivery.
    ///
    /// # Errors
    ///
    /// Returns [`FulfillmentError::InvalidSignature`] before anything else
    /// runs, [`FulfillmentError::Validation`] for a malformed payload, and
    /// downstream errors from order creation.
    #[instrument(skip_all)]
    pub async fn process_payment(
        &self,
        signature_header: &str,
        body: &[u8],
        now_unix: i64,
    ) -> Result<IngestOutcome, FulfillmentError> {
        verify_payment_signature(&self.payment_secret, signature_header, body, now_unix)?;
        let event = parse_payment_event(body)?;
        let event_id = event.event_id.clone();

        self.with_idempotency("payment", &event_id, || async {
            let outcome = self.orchestrator.handle_payment_confirmed(event).await?;
            if let Some(error) = &outcome.notification_error {
                warn!(order_id = %outcome.order.id, error, "order committed, notification failed");
            }
            Ok(if outcome.created {
                format!("order_created:{}", outcome.order.id)
            } else {
                format!("order_exists:{}", outcome.order.id)
            })
        })
        .await
    }

    /// Ingest an email provider delivery-status webhook.
    ///
    /// The provider's message ID headers double as the idempotency key.
    ///
    /// # Errors
    ///
    /// Returns [`FulfillmentError::InvalidSignature`] or
    /// [`FulfillmentError::Validation`] before any state is touched.
    #[instrument(skip_all, fields(webhook_id = %webhook_id))]
    pub async fn process_email_status(
        &self,
        webhook_id: &str,
        timestamp: &str,
        signature_header: &str,
        body: &[u8],
        now_unix: i64,
    ) -> Result<IngestOutcome, FulfillmentError> {
        verify_email_signature(
            &self.email_secret,
            webhook_id,
            timestamp,
            signature_header,
            body,
            now_unix,
        )?;
        let event = parse_email_event(body)?;

        self.with_idempotency("email", webhook_id, || async {
            let changed = self.orchestrator.handle_email_status(&event).await?;
            Ok(if changed {
                format!("notification_updated:{}", event.message_id)
            } else {
                format!("notification_unchanged:{}", event.message_id)
            })
        })
        .await
    }

    /// Ingest a carrier status push.
    ///
    /// The carrier authenticates with a shared token header rather than a
    /// body signature.
    ///
    /// # Errors
    ///
    /// Returns [`FulfillmentError::InvalidSignature`] for a bad token and
    /// downstream errors from the order transition.
    #[instrument(skip_all)]
    pub async fn process_carrier(
        &self,
        token: &str,
        body: &[u8],
    ) -> Result<IngestOutcome, FulfillmentError> {
        if !constant_time_eq(
            token.as_bytes(),
            self.carrier_token.expose_secret().as_bytes(),
        ) {
            return Err(FulfillmentError::InvalidSignature(
                "carrier token mismatch".into(),
            ));
        }
        let event = parse_carrier_event(body)?;
        let event_id = event.event_id.clone();

        self.with_idempotency("carrier", &event_id, || async {
            match self.orchestrator.handle_carrier_update(&event).await? {
                Some(outcome) if outcome.changed => {
                    Ok(format!("order_{}:{}", outcome.order.status, outcome.order.id))
                }
                Some(outcome) => Ok(format!("no_change:{}", outcome.order.id)),
                None => Ok("ignored".to_owned()),
            }
        })
        .await
    }

    async fn with_idempotency<F, Fut>(
        &self,
        provider: &str,
        event_id: &str,
        work: F,
    ) -> Result<IngestOutcome, FulfillmentError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, FulfillmentError>>,
    {
        match self.idempotency.try_reserve(provider, event_id).await? {
            Reservation::Completed(outcome) => {
                info!(provider, event_id, "duplicate delivery, returning cached outcome");
                return Ok(IngestOutcome::Duplicate(outcome));
            }
            Reservation::InFlight => {
                info!(provider, event_id, "concurrent duplicate delivery");
                return Ok(IngestOutcome::InFlight);
            }
            Reservation::Fresh => {}
        }

        match work().await {
            Ok(summary) => {
                let outcome = ProcessedOutcome {
                    provider: provider.to_owned(),
                    summary,
                    processed_at: Utc::now(),
                };
                self.idempotency
                    .mark_complete(provider, event_id, outcome.clone())
                    .await?;
                Ok(IngestOutcome::Processed(outcome))
            }
            Err(err) => {
                if let Err(release_err) = self.idempotency.release(provider, event_id).await {
                    warn!(provider, event_id, error = %release_err, "reservation release failed");
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::notify::NotificationDispatcher;
    use crate::quote::{RateCard, RateTier, WeightTable};
    use crate::store::{
        InMemoryCartStore, InMemoryIdempotencyStore, InMemoryNotificationStore,
        InMemoryOrderRepository, OrderRepository as _,
    };
    use crate::testing::{FakeCarrier, FakeEmailProvider};

    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;
    use tidepool_core::{CurrencyCode, OrderStatus};

    const PAYMENT_SECRET: &str = "payment-signing-secret";
    const EMAIL_KEY: &[u8] = b"email-webhook-key-32-bytes-long!";
    const CARRIER_TOKEN: &str = "carrier-shared-token";

    struct Harness {
        processor: WebhookProcessor,
        orders: Arc<InMemoryOrderRepository>,
        carrier: Arc<FakeCarrier>,
        email: Arc<FakeEmailProvider>,
    }

    fn harness() -> Harness {
        let orders = Arc::new(InMemoryOrderRepository::new());
        let carrier = Arc::new(FakeCarrier::new());
        let email = Arc::new(FakeEmailProvider::new());
        let dispatcher = NotificationDispatcher::new(
            email.clone(),
            Arc::new(InMemoryNotificationStore::new()),
            "Tidepool Supply",
        );
        let orchestrator = Orchestrator::new(
            orders.clone(),
            Arc::new(InMemoryCartStore::new()),
            carrier.clone(),
            dispatcher,
            RateCard::new(
                "Northline",
                CurrencyCode::Sek,
                WeightTable::new().with_product("tshirt-1", 180),
                vec![RateTier {
                    max_weight_grams: 20_000,
                    pickup_point_minor: 495,
                    home_delivery_minor: 795,
                }],
            ),
        );
        Harness {
            processor: WebhookProcessor::new(
                orchestrator,
                Arc::new(InMemoryIdempotencyStore::default()),
                SecretString::from(PAYMENT_SECRET),
                SecretString::from(format!("whsec_{}", BASE64.encode(EMAIL_KEY))),
                SecretString::from(CARRIER_TOKEN),
            ),
            orders,
            carrier,
            email,
        }
    }

    fn payment_body(event_id: &str, reference: &str) -> Vec<u8> {
        serde_json::json!({
            "id": event_id,
            "type": "payment.confirmed",
            "data": {
                "payment_id": reference,
                "amount_total": 4295,
                "currency": "SEK",
                "shipping_amount": 495,
                "customer": {"email": "jo@example.com", "name": "Jo Berg"},
                "delivery": {"method": "pickup", "pickup_point_id": "pp-77"},
                "items": [
                    {"product_id": "tshirt-1", "name": "T-shirt", "quantity": 2, "unit_price": 1900}
                ]
            }
        })
        .to_string()
        .into_bytes()
    }

    fn sign_payment(body: &[u8], timestamp: i64) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(PAYMENT_SECRET.as_bytes()).unwrap();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        format!(
            "t={timestamp},v1={}",
            hex::encode(mac.finalize().into_bytes())
        )
    }

    #[tokio::test]
    async fn test_payment_ingest_end_to_end() {
        let h = harness();
        let body = payment_body("evt_1", "pi_1");
        let now = 1_700_000_000;

        let outcome = h
            .processor
            .process_payment(&sign_payment(&body, now), &body, now)
            .await
            .unwrap();

        assert!(matches!(outcome, IngestOutcome::Processed(_)));
        assert!(outcome.summary().starts_with("order_created:"));
        assert_eq!(h.email.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_payment_duplicate_returns_cached_outcome() {
        let h = harness();
        let body = payment_body("evt_1", "pi_1");
        let now = 1_700_000_000;
        let header = sign_payment(&body, now);

        let first = h.processor.process_payment(&header, &body, now).await.unwrap();
        let second = h.processor.process_payment(&header, &body, now).await.unwrap();

        assert!(second.is_duplicate());
        assert_eq!(second.summary(), first.summary());
        // The work ran exactly once.
        assert_eq!(h.email.sent().len(), 1);
        assert_eq!(
            h.orders
                .list_by_status(OrderStatus::Paid)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_payment_bad_signature_rejected_before_any_work() {
        let h = harness();
        let body = payment_body("evt_1", "pi_1");
        let now = 1_700_000_000;

        let result = h
            .processor
            .process_payment(&format!("t={now},v1=deadbeef"), &body, now)
            .await;
        assert!(matches!(result, Err(FulfillmentError::InvalidSignature(_))));
        assert!(h.email.sent().is_empty());

        // The event ID was not consumed; a properly signed retry processes.
        let outcome = h
            .processor
            .process_payment(&sign_payment(&body, now), &body, now)
            .await
            .unwrap();
        assert!(matches!(outcome, IngestOutcome::Processed(_)));
    }

    #[tokio::test]
    async fn test_failed_work_releases_reservation_for_retry() {
        let h = harness();
        let now = 1_700_000_000;

        let body = payment_body("evt_1", "pi_1");
        h.processor
            .process_payment(&sign_payment(&body, now), &body, now)
            .await
            .unwrap();
        let order = h
            .orders
            .list_by_status(OrderStatus::Paid)
            .await
            .unwrap()
            .remove(0);

        // Attach a shipment ID while the order is still paid, so a
        // delivered push targets a known shipment but the transition is
        // illegal.
        h.orders
            .update_status(
                order.id,
                None,
                OrderStatus::Paid,
                crate::store::StatusFields {
                    shipment_id: Some(tidepool_core::ShipmentId::new("PKT-1")),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let carrier_body = serde_json::json!({
            "eventId": "car_1",
            "shipmentId": "PKT-1",
            "status": "delivered",
        })
        .to_string()
        .into_bytes();

        // Wrong token: rejected, nothing reserved.
        let result = h.processor.process_carrier("wrong-token", &carrier_body).await;
        assert!(matches!(result, Err(FulfillmentError::InvalidSignature(_))));

        // The delivered push fails while the order is paid, and the
        // reservation is released with it.
        let result = h.processor.process_carrier(CARRIER_TOKEN, &carrier_body).await;
        assert!(matches!(result, Err(FulfillmentError::StateConflict { .. })));

        // Once the order ships, the carrier's retry of the same event
        // processes instead of hitting a stale duplicate entry.
        h.orders
            .update_status(order.id, None, OrderStatus::Shipped, Default::default())
            .await
            .unwrap();
        let outcome = h
            .processor
            .process_carrier(CARRIER_TOKEN, &carrier_body)
            .await
            .unwrap();
        assert!(matches!(outcome, IngestOutcome::Processed(_)));
        assert!(outcome.summary().starts_with("order_delivered:"));

        // And the re-delivery after that is deduplicated.
        let replay = h
            .processor
            .process_carrier(CARRIER_TOKEN, &carrier_body)
            .await
            .unwrap();
        assert!(replay.is_duplicate());
    }

    #[tokio::test]
    async fn test_email_status_ingest() {
        let h = harness();
        let now = 1_700_000_000;

        let body = payment_body("evt_1", "pi_1");
        h.processor
            .process_payment(&sign_payment(&body, now), &body, now)
            .await
            .unwrap();

        // The fake provider hands out msg-test-1 for the first send.
        let email_body = serde_json::json!({
            "type": "email.delivered",
            "data": {"email_id": "msg-test-1"}
        })
        .to_string()
        .into_bytes();

        let timestamp = now.to_string();
        let mut mac = Hmac::<Sha256>::new_from_slice(EMAIL_KEY).unwrap();
        mac.update(b"wh_1");
        mac.update(b".");
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(&email_body);
        let signature = format!("v1,{}", BASE64.encode(mac.finalize().into_bytes()));

        let outcome = h
            .processor
            .process_email_status("wh_1", &timestamp, &signature, &email_body, now)
            .await
            .unwrap();
        assert!(outcome.summary().starts_with("notification_updated:"));
    }
}
