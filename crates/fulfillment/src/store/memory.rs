//! In-memory store implementations.
//!
//! Maps behind `tokio::sync::RwLock` for the entity stores; the
//! idempotency store sits on a `moka` future cache whose TTL doubles as
//! the event-ID retention window and whose atomic entry API carries the
//! check-and-reserve race.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use tidepool_core::{
    AbandonedCart, CartItem, NotificationId, NotificationRecord, NotificationStatus, Order,
    OrderId, OrderStatus, Price, ProviderMessageId, SessionId, ShipmentId,
};

use super::{
    CartCustomer, CartStore, IdempotencyStore, NotificationStore, OrderRepository,
    ProcessedOutcome, RepositoryError, Reservation, StatusFields,
};
use async_trait::async_trait;

/// In-memory [`OrderRepository`].
#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<OrderId, Order>>,
}

impl InMemoryOrderRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create(&self, order: Order) -> Result<Order, RepositoryError> {
        let mut orders = self.orders.write().await;
        if orders
            .values()
            .any(|o| o.payment_reference == order.payment_reference)
        {
            return Err(RepositoryError::Conflict(format!(
                "payment reference already exists: {}",
                order.payment_reference
            )));
        }
        orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn get_by_payment_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .find(|o| o.payment_reference == reference)
            .cloned())
    }

    async fn get_by_shipment_id(
        &self,
        shipment_id: &ShipmentId,
    ) -> Result<Option<Order>, RepositoryError> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .find(|o| o.shipment_id.as_ref() == Some(shipment_id))
            .cloned())
    }

    async fn update_status(
        &self,
        id: OrderId,
        expected: Option<OrderStatus>,
        new_status: OrderStatus,
        fields: StatusFields,
    ) -> Result<Order, RepositoryError> {
        // Write lock held across read-check-write: the whole transition is
        // one atomic read-modify-write.
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("order {id}")))?;

        if let Some(expected) = expected
            && order.status != expected
        {
            return Err(RepositoryError::Conflict(format!(
                "order {id} status is {}, expected {expected}",
                order.status
            )));
        }

        order.status = new_status;
        order.updated_at = Utc::now();
        if let Some(shipment_id) = fields.shipment_id {
            order.shipment_id = Some(shipment_id);
        }
        if let Some(tracking_url) = fields.tracking_url {
            order.tracking_url = Some(tracking_url);
        }
        if let Some(shipped_at) = fields.shipped_at {
            order.shipped_at = Some(shipped_at);
        }
        if let Some(delivered_at) = fields.delivered_at {
            order.delivered_at = Some(delivered_at);
        }

        Ok(order.clone())
    }

    async fn list_by_status(&self, status: OrderStatus) -> Result<Vec<Order>, RepositoryError> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.status == status)
            .cloned()
            .collect())
    }
}

/// State of an idempotency entry.
#[derive(Debug, Clone)]
enum IdemState {
    /// Reserved, processing not yet finished.
    Pending,
    Completed(ProcessedOutcome),
}

/// In-memory [`IdempotencyStore`] with a TTL retention window.
pub struct InMemoryIdempotencyStore {
    entries: moka::future::Cache<String, IdemState>,
}

impl InMemoryIdempotencyStore {
    /// Create a store that retains processed event IDs for `retention`.
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: moka::future::Cache::builder()
                .time_to_live(retention)
                .max_capacity(1_000_000)
                .build(),
        }
    }

    fn key(provider: &str, event_id: &str) -> String {
        format!("{provider}:{event_id}")
    }
}

impl Default for InMemoryIdempotencyStore {
    fn default() -> Self {
        // 30 days covers every provider's retry horizon.
        Self::new(Duration::from_secs(30 * 24 * 60 * 60))
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn try_reserve(
        &self,
        provider: &str,
        event_id: &str,
    ) -> Result<Reservation, RepositoryError> {
        let entry = self
            .entries
            .entry(Self::key(provider, event_id))
            .or_insert(IdemState::Pending)
            .await;

        if entry.is_fresh() {
            return Ok(Reservation::Fresh);
        }
        Ok(match entry.into_value() {
            IdemState::Pending => Reservation::InFlight,
            IdemState::Completed(outcome) => Reservation::Completed(outcome),
        })
    }

    async fn mark_complete(
        &self,
        provider: &str,
        event_id: &str,
        outcome: ProcessedOutcome,
    ) -> Result<(), RepositoryError> {
        self.entries
            .insert(Self::key(provider, event_id), IdemState::Completed(outcome))
            .await;
        Ok(())
    }

    async fn release(&self, provider: &str, event_id: &str) -> Result<(), RepositoryError> {
        self.entries.invalidate(&Self::key(provider, event_id)).await;
        Ok(())
    }
}

/// In-memory [`NotificationStore`].
#[derive(Default)]
pub struct InMemoryNotificationStore {
    records: RwLock<HashMap<NotificationId, NotificationRecord>>,
}

impl InMemoryNotificationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn insert(&self, record: NotificationRecord) -> Result<(), RepositoryError> {
        self.records.write().await.insert(record.id, record);
        Ok(())
    }

    async fn get(
        &self,
        id: NotificationId,
    ) -> Result<Option<NotificationRecord>, RepositoryError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn advance_status(
        &self,
        message_id: &ProviderMessageId,
        status: NotificationStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<bool>, RepositoryError> {
        // Write lock held across check and write; concurrent status
        // webhooks for one message serialize here.
        let mut records = self.records.write().await;
        Ok(records
            .values_mut()
            .find(|r| r.provider_message_id.as_ref() == Some(message_id))
            .map(|record| record.apply_status(status, at)))
    }

    async fn list_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<NotificationRecord>, RepositoryError> {
        let mut records: Vec<_> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.order_id == Some(order_id))
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }
}

/// In-memory [`CartStore`].
#[derive(Default)]
pub struct InMemoryCartStore {
    carts: RwLock<HashMap<SessionId, AbandonedCart>>,
}

impl InMemoryCartStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CartStore for InMemoryCartStore {
    async fn upsert(
        &self,
        session_id: SessionId,
        items: Vec<CartItem>,
        customer: CartCustomer,
        amount_total: Price,
    ) -> Result<AbandonedCart, RepositoryError> {
        let now = Utc::now();
        let mut carts = self.carts.write().await;
        let cart = carts
            .entry(session_id.clone())
            .and_modify(|cart| cart.apply_update(items.clone(), amount_total, now))
            .or_insert_with(|| AbandonedCart::new(session_id, items, amount_total, now));

        if customer.email.is_some() {
            cart.customer_email = customer.email;
        }
        if customer.name.is_some() {
            cart.customer_name = customer.name;
        }
        Ok(cart.clone())
    }

    async fn get(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<AbandonedCart>, RepositoryError> {
        Ok(self.carts.read().await.get(session_id).cloned())
    }

    async fn mark_abandoned(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<AbandonedCart>, RepositoryError> {
        let mut carts = self.carts.write().await;
        Ok(carts.get_mut(session_id).map(|cart| {
            cart.mark_abandoned(Utc::now());
            cart.clone()
        }))
    }

    async fn mark_recovered(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<AbandonedCart>, RepositoryError> {
        let mut carts = self.carts.write().await;
        Ok(carts.get_mut(session_id).map(|cart| {
            cart.mark_recovered(Utc::now());
            cart.clone()
        }))
    }
}
