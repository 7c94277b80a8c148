//! Collaborator traits for durable state.
//!
//! The persistent store is an external collaborator; the pipeline talks to
//! it only through these traits. [`memory`] provides in-process
//! implementations used in production wiring and in tests.

mod memory;

pub use memory::{
    InMemoryCartStore, InMemoryIdempotencyStore, InMemoryNotificationStore,
    InMemoryOrderRepository,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tidepool_core::{
    AbandonedCart, CartItem, Email, NotificationId, NotificationRecord, NotificationStatus, Order,
    OrderId, OrderStatus, Price, ProviderMessageId, SessionId, ShipmentId,
};

/// Errors from store collaborators.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Unique constraint or optimistic concurrency check failed.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The store itself failed.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Fields written alongside a status transition.
///
/// Only ever set, never cleared: an order keeps its shipment ID and
/// timestamps once they exist.
#[derive(Debug, Clone, Default)]
pub struct StatusFields {
    pub shipment_id: Option<ShipmentId>,
    pub tracking_url: Option<String>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Durable order storage.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persist a new order.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Conflict`] if an order with the same
    /// payment reference already exists.
    async fn create(&self, order: Order) -> Result<Order, RepositoryError>;

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    async fn get_by_payment_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Order>, RepositoryError>;

    async fn get_by_shipment_id(
        &self,
        shipment_id: &ShipmentId,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Atomically apply a status transition.
    ///
    /// When `expected` is set, the update only applies if the stored
    /// status still equals it - the optimistic check that keeps two
    /// concurrent transitions from interleaving.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Conflict`] if the expected-status check
    /// fails, [`RepositoryError::NotFound`] if the order does not exist.
    async fn update_status(
        &self,
        id: OrderId,
        expected: Option<OrderStatus>,
        new_status: OrderStatus,
        fields: StatusFields,
    ) -> Result<Order, RepositoryError>;

    async fn list_by_status(&self, status: OrderStatus) -> Result<Vec<Order>, RepositoryError>;
}

/// Result of attempting to reserve an inbound event ID.
#[derive(Debug, Clone)]
pub enum Reservation {
    /// First sight of this event ID; the caller owns processing it.
    Fresh,
    /// Another delivery of the same event is being processed right now.
    InFlight,
    /// The event was already processed; the cached outcome is returned.
    Completed(ProcessedOutcome),
}

/// Recorded outcome of a successfully processed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedOutcome {
    pub provider: String,
    /// Short machine-readable summary, e.g. `order_created:<id>`.
    pub summary: String,
    pub processed_at: DateTime<Utc>,
}

/// Tracks which inbound event IDs have been processed.
///
/// `try_reserve` must be atomic per event ID: two concurrent deliveries of
/// the same event must see exactly one `Fresh`. Completion is recorded
/// only after processing succeeds; a failed unit of work releases its
/// reservation so the provider's retry re-delivers.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn try_reserve(
        &self,
        provider: &str,
        event_id: &str,
    ) -> Result<Reservation, RepositoryError>;

    async fn mark_complete(
        &self,
        provider: &str,
        event_id: &str,
        outcome: ProcessedOutcome,
    ) -> Result<(), RepositoryError>;

    async fn release(&self, provider: &str, event_id: &str) -> Result<(), RepositoryError>;
}

/// Storage for notification records.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert(&self, record: NotificationRecord) -> Result<(), RepositoryError>;

    async fn get(&self, id: NotificationId)
        -> Result<Option<NotificationRecord>, RepositoryError>;

    /// Atomically advance the record matching a provider message ID.
    ///
    /// The monotonicity check must run inside the store, in the same
    /// critical section as the write: delivery-status webhooks arrive
    /// at-least-once and out of order, and two concurrent updates for one
    /// message must serialize so a stale write can never overwrite a
    /// further-advanced or terminal record. Returns `None` when no record
    /// matches, otherwise whether the record changed.
    async fn advance_status(
        &self,
        message_id: &ProviderMessageId,
        status: NotificationStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<bool>, RepositoryError>;

    async fn list_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<NotificationRecord>, RepositoryError>;
}

/// Optional customer details attached to a tracked cart.
#[derive(Debug, Clone, Default)]
pub struct CartCustomer {
    pub email: Option<Email>,
    pub name: Option<String>,
}

/// Storage for abandoned-cart tracking.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Create or refresh a cart snapshot for a session. Refreshing clears
    /// any abandoned marker.
    async fn upsert(
        &self,
        session_id: SessionId,
        items: Vec<CartItem>,
        customer: CartCustomer,
        amount_total: Price,
    ) -> Result<AbandonedCart, RepositoryError>;

    async fn get(&self, session_id: &SessionId)
        -> Result<Option<AbandonedCart>, RepositoryError>;

    /// Mark a cart abandoned (time-based sweep). Missing carts and
    /// already-recovered carts are left untouched.
    async fn mark_abandoned(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<AbandonedCart>, RepositoryError>;

    /// Mark a cart recovered after a matching payment confirmation.
    /// Returns `None` when no cart exists for the session.
    async fn mark_recovered(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<AbandonedCart>, RepositoryError>;
}
