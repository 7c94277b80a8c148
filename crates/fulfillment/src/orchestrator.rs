//! Event orchestration.
//!
//! One orchestrator instance coordinates the whole pipeline: payment
//! confirmations become orders, status transitions drive the carrier and
//! the notification dispatcher, and carrier events feed back into order
//! state. Every method is a self-contained unit of work - external calls
//! that must not be retried blindly (shipment creation) happen before the
//! state commit, and notifications happen strictly after it.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use tidepool_core::{
    AbandonedCart, CartItem, NotificationKind, NotificationRecord, NotificationId, Order, OrderId,
    OrderStatus, Price, SessionId, TrackingState, TrackingStatus,
};

use crate::carrier::CarrierApi;
use crate::error::FulfillmentError;
use crate::notify::NotificationDispatcher;
use crate::quote::{QuoteItem, RateCard, ShippingQuote};
use crate::store::{
    CartCustomer, CartStore, OrderRepository, RepositoryError, StatusFields,
};
use crate::webhook::{CarrierStatusEvent, EmailStatusEvent, PaymentConfirmed};

/// Per-unit weight assumed for items with no weight entry when registering
/// a shipment.
const DEFAULT_ITEM_WEIGHT_GRAMS: u32 = 250;

/// Outcome of processing a payment confirmation.
#[derive(Debug)]
pub struct PaymentOutcome {
    pub order: Order,
    /// False when an order for this payment reference already existed.
    pub created: bool,
    /// Set when the order was committed but its notification failed.
    pub notification_error: Option<String>,
}

/// Outcome of a status transition request.
#[derive(Debug)]
pub struct TransitionOutcome {
    pub order: Order,
    /// False when the order was already at the requested status.
    pub changed: bool,
    /// Set when the transition was committed but its notification failed.
    pub notification_error: Option<String>,
}

/// Result of a reconciliation sweep over shipped orders.
#[derive(Debug, Default, serde::Serialize)]
pub struct ReconcileSummary {
    pub checked: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Coordinates orders, shipments, carts, and notifications.
#[derive(Clone)]
pub struct Orchestrator {
    orders: Arc<dyn OrderRepository>,
    carts: Arc<dyn CartStore>,
    carrier: Arc<dyn CarrierApi>,
    dispatcher: NotificationDispatcher,
    rate_card: RateCard,
}

impl Orchestrator {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        carts: Arc<dyn CartStore>,
        carrier: Arc<dyn CarrierApi>,
        dispatcher: NotificationDispatcher,
        rate_card: RateCard,
    ) -> Self {
        Self {
            orders,
            carts,
            carrier,
            dispatcher,
            rate_card,
        }
    }

    /// Turn a verified payment confirmation into a paid order.
    ///
    /// Safe to call with duplicate events: a payment reference that
    /// already has an order returns that order without side effects. The
    /// order confirmation email is sent only for a newly created order,
    /// and its failure does not undo the order.
    ///
    /// # Errors
    ///
    /// Returns a repository error if the order cannot be persisted.
    #[instrument(skip(self, event), fields(event_id = %event.event_id, payment_reference = %event.payment_reference))]
    pub async fn handle_payment_confirmed(
        &self,
        event: PaymentConfirmed,
    ) -> Result<PaymentOutcome, FulfillmentError> {
        let now = Utc::now();
        let order = Order {
            id: OrderId::generate(),
            payment_reference: event.payment_reference.clone(),
            customer: event.customer,
            delivery_point: event.delivery_point,
            items: event.items,
            status: OrderStatus::Paid,
            amount_total: event.amount_total,
            shipping_total: event.shipping_total,
            shipment_id: None,
            tracking_url: None,
            created_at: now,
            updated_at: now,
            shipped_at: None,
            delivered_at: None,
        };

        let order = match self.orders.create(order).await {
            Ok(order) => order,
            Err(RepositoryError::Conflict(_)) => {
                let existing = self
                    .orders
                    .get_by_payment_reference(&event.payment_reference)
                    .await?
                    .ok_or_else(|| {
                        RepositoryError::Storage(format!(
                            "conflict without existing order for {}",
                            event.payment_reference
                        ))
                    })?;
                info!(order_id = %existing.id, "payment reference already has an order");
                return Ok(PaymentOutcome {
                    order: existing,
                    created: false,
                    notification_error: None,
                });
            }
            Err(err) => return Err(err.into()),
        };

        if let Some(session_id) = &event.session_id {
            if let Err(err) = self.carts.mark_recovered(session_id).await {
                warn!(%session_id, error = %err, "cart recovery mark failed");
            }
        }

        info!(order_id = %order.id, "order created");
        let notification_error = self
            .notify(&order, NotificationKind::OrderConfirmation)
            .await;

        Ok(PaymentOutcome {
            order,
            created: true,
            notification_error,
        })
    }

    /// Advance an order to a target status.
    ///
    /// A request for the status the order already has is a no-op (replays
    /// must not duplicate side effects). Advancing to `Shipped` registers
    /// the carrier shipment first; a carrier rejection leaves the order
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns [`FulfillmentError::OrderNotFound`] for an unknown order,
    /// [`FulfillmentError::StateConflict`] for an illegal transition, and
    /// carrier errors when shipment registration fails.
    #[instrument(skip(self), fields(%order_id, ?target))]
    pub async fn advance_order_status(
        &self,
        order_id: OrderId,
        target: OrderStatus,
    ) -> Result<TransitionOutcome, FulfillmentError> {
        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(order_id))?;

        if order.status == target {
            return Ok(TransitionOutcome {
                order,
                changed: false,
                notification_error: None,
            });
        }
        if !order.status.can_transition_to(target) {
            return Err(FulfillmentError::StateConflict {
                from: order.status,
                to: target,
            });
        }

        let now = Utc::now();
        let mut fields = StatusFields::default();
        match target {
            OrderStatus::Shipped => {
                // Re-running after a failed notification must not register
                // a second shipment.
                if order.shipment_id.is_none() {
                    let weight = self
                        .rate_card
                        .order_weight_or_default(&order.items, DEFAULT_ITEM_WEIGHT_GRAMS);
                    let created = self.carrier.create_shipment(&order, weight).await?;
                    info!(shipment_id = %created.shipment_id, "shipment registered");
                    fields.shipment_id = Some(created.shipment_id);
                    fields.tracking_url = Some(created.tracking_url);
                }
                fields.shipped_at = Some(now);
            }
            OrderStatus::Delivered => {
                fields.delivered_at = Some(now);
            }
            _ => {}
        }

        let updated = self
            .orders
            .update_status(order_id, Some(order.status), target, fields)
            .await
            .map_err(|err| match err {
                RepositoryError::Conflict(_) => FulfillmentError::StateConflict {
                    from: order.status,
                    to: target,
                },
                RepositoryError::NotFound(_) => FulfillmentError::OrderNotFound(order_id),
                other => other.into(),
            })?;

        info!(from = %order.status, to = %updated.status, "order status advanced");

        let notification_error = match NotificationKind::for_transition(target) {
            Some(kind) => self.notify(&updated, kind).await,
            None => None,
        };

        Ok(TransitionOutcome {
            order: updated,
            changed: true,
            notification_error,
        })
    }

    /// Apply a carrier status push to the matching order.
    ///
    /// Returns `None` when the shipment is unknown or the status implies
    /// no order transition. Pushes for unknown shipments are logged and
    /// dropped rather than failed - the carrier would otherwise retry them
    /// forever.
    ///
    /// # Errors
    ///
    /// Propagates repository and transition errors for known shipments.
    #[instrument(skip(self, event), fields(event_id = %event.event_id, shipment_id = %event.shipment_id))]
    pub async fn handle_carrier_update(
        &self,
        event: &CarrierStatusEvent,
    ) -> Result<Option<TransitionOutcome>, FulfillmentError> {
        let Some(order) = self.orders.get_by_shipment_id(&event.shipment_id).await? else {
            warn!("carrier event for unknown shipment, ignoring");
            return Ok(None);
        };

        let target = match event.status {
            TrackingStatus::Delivered => OrderStatus::Delivered,
            TrackingStatus::ReturnedToSender => OrderStatus::Returned,
            _ => {
                info!(status = ?event.status, "carrier event without order transition");
                return Ok(None);
            }
        };

        self.advance_order_status(order.id, target).await.map(Some)
    }

    /// Apply an email delivery-status event to its notification record.
    ///
    /// # Errors
    ///
    /// Returns a repository error if the notification store fails.
    pub async fn handle_email_status(
        &self,
        event: &EmailStatusEvent,
    ) -> Result<bool, FulfillmentError> {
        self.dispatcher
            .apply_provider_status(&event.message_id, event.status)
            .await
    }

    /// Poll tracking for every shipped order and mark the delivered ones.
    ///
    /// The fallback for lost carrier webhooks. Per-order failures are
    /// counted and skipped so one bad shipment cannot stall the sweep.
    ///
    /// # Errors
    ///
    /// Returns a repository error only if the shipped-order listing itself
    /// fails.
    #[instrument(skip(self))]
    pub async fn reconcile_shipments(&self) -> Result<ReconcileSummary, FulfillmentError> {
        let shipped = self.orders.list_by_status(OrderStatus::Shipped).await?;
        let mut summary = ReconcileSummary::default();

        for order in shipped {
            let Some(shipment_id) = &order.shipment_id else {
                warn!(order_id = %order.id, "shipped order without shipment id");
                summary.failed += 1;
                continue;
            };
            summary.checked += 1;

            let state = match self.carrier.get_tracking(shipment_id).await {
                Ok(state) => state,
                Err(err) => {
                    warn!(order_id = %order.id, error = %err, "tracking lookup failed");
                    summary.failed += 1;
                    continue;
                }
            };
            if !state.is_delivered() {
                continue;
            }

            match self
                .advance_order_status(order.id, OrderStatus::Delivered)
                .await
            {
                Ok(outcome) if outcome.changed => summary.delivered += 1,
                Ok(_) => {}
                Err(err) => {
                    warn!(order_id = %order.id, error = %err, "reconcile transition failed");
                    summary.failed += 1;
                }
            }
        }

        info!(
            checked = summary.checked,
            delivered = summary.delivered,
            failed = summary.failed,
            "reconciliation sweep finished"
        );
        Ok(summary)
    }

    /// Fetch an order.
    ///
    /// # Errors
    ///
    /// Returns [`FulfillmentError::OrderNotFound`] for an unknown ID.
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order, FulfillmentError> {
        self.orders
            .get(order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(order_id))
    }

    /// Fetch an order together with live tracking, when it has a shipment.
    ///
    /// An unreachable carrier degrades the tracking half to
    /// [`TrackingStatus::Unknown`] instead of failing the lookup.
    ///
    /// # Errors
    ///
    /// Returns [`FulfillmentError::OrderNotFound`] for an unknown ID.
    pub async fn tracking_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<(Order, Option<TrackingState>), FulfillmentError> {
        let order = self.get_order(order_id).await?;
        let tracking = match &order.shipment_id {
            Some(shipment_id) => Some(match self.carrier.get_tracking(shipment_id).await {
                Ok(state) => state,
                Err(err) => {
                    warn!(order_id = %order.id, error = %err, "tracking lookup degraded");
                    TrackingState::unknown(shipment_id.clone())
                }
            }),
            None => None,
        };
        Ok((order, tracking))
    }

    /// Compute a shipping quote.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::quote::QuoteError`].
    pub fn quote(
        &self,
        items: &[QuoteItem],
        method: tidepool_core::DeliveryMethod,
    ) -> Result<ShippingQuote, FulfillmentError> {
        Ok(self.rate_card.quote(items, method)?)
    }

    /// Record or refresh a cart snapshot for a storefront session.
    ///
    /// # Errors
    ///
    /// Returns a repository error if the cart store fails.
    pub async fn track_cart(
        &self,
        session_id: SessionId,
        items: Vec<CartItem>,
        customer: CartCustomer,
        amount_total: Price,
    ) -> Result<AbandonedCart, FulfillmentError> {
        Ok(self
            .carts
            .upsert(session_id, items, customer, amount_total)
            .await?)
    }

    /// Mark a tracked cart abandoned. Returns `None` for unknown sessions
    /// and already-recovered carts.
    ///
    /// # Errors
    ///
    /// Returns a repository error if the cart store fails.
    pub async fn abandon_cart(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<AbandonedCart>, FulfillmentError> {
        Ok(self.carts.mark_abandoned(session_id).await?)
    }

    /// Send an ad hoc support reply about an order.
    ///
    /// # Errors
    ///
    /// See [`NotificationDispatcher::send_support_reply`].
    pub async fn send_support_reply(
        &self,
        order_id: OrderId,
        subject: String,
        html_body: String,
    ) -> Result<NotificationRecord, FulfillmentError> {
        let order = self.get_order(order_id).await?;
        self.dispatcher
            .send_support_reply(&order, subject, html_body)
            .await
    }

    /// Re-send a failed notification.
    ///
    /// # Errors
    ///
    /// See [`NotificationDispatcher::resend`].
    pub async fn resend_notification(
        &self,
        id: NotificationId,
    ) -> Result<NotificationRecord, FulfillmentError> {
        self.dispatcher.resend(id).await
    }

    async fn notify(&self, order: &Order, kind: NotificationKind) -> Option<String> {
        match self.dispatcher.send_order_notification(order, kind).await {
            Ok(_) => None,
            Err(err) => {
                warn!(order_id = %order.id, error = %err, "notification failed after commit");
                Some(err.to_string())
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::quote::{RateTier, WeightTable};
    use crate::store::{
        InMemoryCartStore, InMemoryNotificationStore, InMemoryOrderRepository,
        NotificationStore as _, OrderRepository as _,
    };
    use crate::testing::{FakeCarrier, FakeEmailProvider};
    use tidepool_core::{
        CurrencyCode, CustomerContact, DeliveryPoint, Email, LineItem, NotificationStatus,
        ShipmentId,
    };

    struct Harness {
        orchestrator: Orchestrator,
        orders: Arc<InMemoryOrderRepository>,
        carts: Arc<InMemoryCartStore>,
        notifications: Arc<InMemoryNotificationStore>,
        carrier: Arc<FakeCarrier>,
        email: Arc<FakeEmailProvider>,
    }

    fn harness() -> Harness {
        let orders = Arc::new(InMemoryOrderRepository::new());
        let carts = Arc::new(InMemoryCartStore::new());
        let notifications = Arc::new(InMemoryNotificationStore::new());
        let carrier = Arc::new(FakeCarrier::new());
        let email = Arc::new(FakeEmailProvider::new());
        let dispatcher = NotificationDispatcher::new(
            email.clone(),
            notifications.clone(),
            "Tidepool Supply",
        );
        let rate_card = RateCard::new(
            "Northline",
            CurrencyCode::Sek,
            WeightTable::new().with_product("tshirt-1", 180),
            vec![RateTier {
                max_weight_grams: 20_000,
                pickup_point_minor: 495,
                home_delivery_minor: 795,
            }],
        );
        Harness {
            orchestrator: Orchestrator::new(
                orders.clone(),
                carts.clone(),
                carrier.clone(),
                dispatcher,
                rate_card,
            ),
            orders,
            carts,
            notifications,
            carrier,
            email,
        }
    }

    fn payment_event(reference: &str, session: Option<&str>) -> PaymentConfirmed {
        PaymentConfirmed {
            event_id: format!("evt-{reference}"),
            payment_reference: reference.to_owned(),
            customer: CustomerContact {
                email: Email::parse("jo@example.com").unwrap(),
                name: "Jo Berg".to_owned(),
                phone: None,
            },
            delivery_point: DeliveryPoint::PickupPoint {
                id: "pp-77".to_owned(),
                name: "Corner Kiosk".to_owned(),
            },
            items: vec![LineItem {
                product_id: "tshirt-1".to_owned(),
                name: "T-shirt".to_owned(),
                quantity: 2,
                unit_price: Price::from_minor_units(1900, CurrencyCode::Sek),
                size: Some("M".to_owned()),
            }],
            amount_total: Price::from_minor_units(4295, CurrencyCode::Sek),
            shipping_total: Price::from_minor_units(495, CurrencyCode::Sek),
            session_id: session.map(SessionId::new),
        }
    }

    #[tokio::test]
    async fn test_payment_creates_paid_order_and_confirmation() {
        let h = harness();

        let outcome = h
            .orchestrator
            .handle_payment_confirmed(payment_event("pi_1", None))
            .await
            .unwrap();

        assert!(outcome.created);
        assert_eq!(outcome.order.status, OrderStatus::Paid);
        assert!(outcome.notification_error.is_none());
        assert_eq!(h.email.sent().len(), 1);
        assert!(h.email.sent()[0].subject.contains("order confirmed"));
    }

    #[tokio::test]
    async fn test_duplicate_payment_reference_is_idempotent() {
        let h = harness();

        let first = h
            .orchestrator
            .handle_payment_confirmed(payment_event("pi_1", None))
            .await
            .unwrap();
        // Same payment, different event ID (provider re-delivery with a
        // fresh envelope).
        let mut replay = payment_event("pi_1", None);
        replay.event_id = "evt-other".to_owned();
        let second = h.orchestrator.handle_payment_confirmed(replay).await.unwrap();

        assert!(!second.created);
        assert_eq!(second.order.id, first.order.id);
        // No second confirmation email.
        assert_eq!(h.email.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_payment_marks_cart_recovered() {
        let h = harness();
        h.carts
            .upsert(
                SessionId::new("sess-1"),
                vec![],
                CartCustomer::default(),
                Price::zero(CurrencyCode::Sek),
            )
            .await
            .unwrap();

        h.orchestrator
            .handle_payment_confirmed(payment_event("pi_1", Some("sess-1")))
            .await
            .unwrap();

        let cart = h.carts.get(&SessionId::new("sess-1")).await.unwrap().unwrap();
        assert!(cart.recovered_at.is_some());
    }

    #[tokio::test]
    async fn test_ship_registers_shipment_and_notifies() {
        let h = harness();
        h.carrier.set_next_shipment_id("PKT-123");
        let order = h
            .orchestrator
            .handle_payment_confirmed(payment_event("pi_1", None))
            .await
            .unwrap()
            .order;

        let outcome = h
            .orchestrator
            .advance_order_status(order.id, OrderStatus::Shipped)
            .await
            .unwrap();

        assert!(outcome.changed);
        assert_eq!(outcome.order.status, OrderStatus::Shipped);
        assert_eq!(
            outcome.order.shipment_id,
            Some(ShipmentId::new("PKT-123"))
        );
        assert!(outcome.order.tracking_url.is_some());
        assert!(outcome.order.shipped_at.is_some());
        // 2 shirts at 180g.
        assert_eq!(h.carrier.created(), vec![(ShipmentId::new("PKT-123"), 360)]);
        // Confirmation plus shipping notification.
        assert_eq!(h.email.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_same_target_transition_is_noop() {
        let h = harness();
        let order = h
            .orchestrator
            .handle_payment_confirmed(payment_event("pi_1", None))
            .await
            .unwrap()
            .order;
        h.orchestrator
            .advance_order_status(order.id, OrderStatus::Shipped)
            .await
            .unwrap();
        let sent_before = h.email.sent().len();

        let outcome = h
            .orchestrator
            .advance_order_status(order.id, OrderStatus::Shipped)
            .await
            .unwrap();

        assert!(!outcome.changed);
        assert_eq!(h.email.sent().len(), sent_before);
        assert_eq!(h.carrier.created().len(), 1);
    }

    #[tokio::test]
    async fn test_illegal_transition_rejected() {
        let h = harness();
        let order = h
            .orchestrator
            .handle_payment_confirmed(payment_event("pi_1", None))
            .await
            .unwrap()
            .order;

        let result = h
            .orchestrator
            .advance_order_status(order.id, OrderStatus::Delivered)
            .await;

        assert!(matches!(
            result,
            Err(FulfillmentError::StateConflict {
                from: OrderStatus::Paid,
                to: OrderStatus::Delivered,
            })
        ));
    }

    #[tokio::test]
    async fn test_carrier_rejection_leaves_order_untouched() {
        let h = harness();
        let order = h
            .orchestrator
            .handle_payment_confirmed(payment_event("pi_1", None))
            .await
            .unwrap()
            .order;
        h.carrier.reject_next(422, "no service to destination");

        let result = h
            .orchestrator
            .advance_order_status(order.id, OrderStatus::Shipped)
            .await;
        assert!(matches!(
            result,
            Err(FulfillmentError::CarrierRejected { status: 422, .. })
        ));

        let stored = h.orders.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Paid);
        assert!(stored.shipment_id.is_none());
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_roll_back_transition() {
        let h = harness();
        let order = h
            .orchestrator
            .handle_payment_confirmed(payment_event("pi_1", None))
            .await
            .unwrap()
            .order;
        h.email.fail_next_sends(1);

        let outcome = h
            .orchestrator
            .advance_order_status(order.id, OrderStatus::Shipped)
            .await
            .unwrap();

        assert!(outcome.changed);
        assert_eq!(outcome.order.status, OrderStatus::Shipped);
        assert!(outcome.notification_error.is_some());
        // The failure is on record for manual resend.
        let records = h.notifications.list_for_order(order.id).await.unwrap();
        assert!(
            records
                .iter()
                .any(|r| r.status == NotificationStatus::Failed)
        );
    }

    #[tokio::test]
    async fn test_carrier_delivered_event_completes_order() {
        let h = harness();
        let order = h
            .orchestrator
            .handle_payment_confirmed(payment_event("pi_1", None))
            .await
            .unwrap()
            .order;
        let shipped = h
            .orchestrator
            .advance_order_status(order.id, OrderStatus::Shipped)
            .await
            .unwrap()
            .order;

        let event = CarrierStatusEvent {
            event_id: "car_1".to_owned(),
            shipment_id: shipped.shipment_id.clone().unwrap(),
            status: TrackingStatus::Delivered,
            status_text: "Delivered".to_owned(),
            location: Some("Malmo".to_owned()),
            occurred_at: None,
        };
        let outcome = h
            .orchestrator
            .handle_carrier_update(&event)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.order.status, OrderStatus::Delivered);
        assert!(outcome.order.delivered_at.is_some());

        // Replay of the same push is a no-op.
        let replay = h
            .orchestrator
            .handle_carrier_update(&event)
            .await
            .unwrap()
            .unwrap();
        assert!(!replay.changed);
    }

    #[tokio::test]
    async fn test_carrier_event_unknown_shipment_ignored() {
        let h = harness();
        let event = CarrierStatusEvent {
            event_id: "car_9".to_owned(),
            shipment_id: ShipmentId::new("PKT-missing"),
            status: TrackingStatus::Delivered,
            status_text: "Delivered".to_owned(),
            location: None,
            occurred_at: None,
        };
        assert!(
            h.orchestrator
                .handle_carrier_update(&event)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_reconcile_marks_delivered_shipments() {
        let h = harness();
        let mut shipped_ids = Vec::new();
        for reference in ["pi_1", "pi_2"] {
            let order = h
                .orchestrator
                .handle_payment_confirmed(payment_event(reference, None))
                .await
                .unwrap()
                .order;
            let shipped = h
                .orchestrator
                .advance_order_status(order.id, OrderStatus::Shipped)
                .await
                .unwrap()
                .order;
            shipped_ids.push((shipped.id, shipped.shipment_id.unwrap()));
        }

        // Only the first shipment has reached the customer.
        let mut delivered_state = TrackingState::unknown(shipped_ids[0].1.clone());
        delivered_state.status = TrackingStatus::Delivered;
        h.carrier.set_tracking(delivered_state);

        let summary = h.orchestrator.reconcile_shipments().await.unwrap();
        assert_eq!(summary.checked, 2);
        assert_eq!(summary.delivered, 1);
        assert_eq!(summary.failed, 0);

        let first = h.orders.get(shipped_ids[0].0).await.unwrap().unwrap();
        assert_eq!(first.status, OrderStatus::Delivered);
        let second = h.orders.get(shipped_ids[1].0).await.unwrap().unwrap();
        assert_eq!(second.status, OrderStatus::Shipped);
    }

    #[tokio::test]
    async fn test_email_status_event_advances_record() {
        let h = harness();
        let order = h
            .orchestrator
            .handle_payment_confirmed(payment_event("pi_1", None))
            .await
            .unwrap()
            .order;
        let record = h
            .notifications
            .list_for_order(order.id)
            .await
            .unwrap()
            .remove(0);

        let event = EmailStatusEvent {
            message_id: record.provider_message_id.clone().unwrap(),
            status: NotificationStatus::Opened,
            occurred_at: None,
        };
        assert!(h.orchestrator.handle_email_status(&event).await.unwrap());

        let updated = h.notifications.get(record.id).await.unwrap().unwrap();
        assert_eq!(updated.status, NotificationStatus::Opened);
    }
}
