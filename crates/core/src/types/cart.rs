//! Abandoned cart tracking entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Email, Price, SessionId};

/// Snapshot of a cart line as last seen by the storefront.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Price,
}

/// A cart tracked per browser session for abandonment follow-up.
///
/// `abandoned_at` and `recovered_at` are mutually exclusive: a cart is
/// either waiting, abandoned, or recovered, never two of those at once.
/// Any update to the cart contents clears `abandoned_at` - the customer is
/// active again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbandonedCart {
    pub session_id: SessionId,
    pub customer_email: Option<Email>,
    pub customer_name: Option<String>,
    pub items: Vec<CartItem>,
    pub amount_total: Price,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub abandoned_at: Option<DateTime<Utc>>,
    pub recovered_at: Option<DateTime<Utc>>,
    /// When a recovery email was sent, if any.
    pub email_sent_at: Option<DateTime<Utc>>,
}

impl AbandonedCart {
    /// Create a fresh cart snapshot for a session.
    #[must_use]
    pub fn new(
        session_id: SessionId,
        items: Vec<CartItem>,
        amount_total: Price,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            customer_email: None,
            customer_name: None,
            items,
            amount_total,
            created_at: now,
            updated_at: now,
            abandoned_at: None,
            recovered_at: None,
            email_sent_at: None,
        }
    }

    /// Replace the cart contents with a newer snapshot.
    ///
    /// Clears `abandoned_at`: activity on the cart means the customer is
    /// back.
    pub fn apply_update(
        &mut self,
        items: Vec<CartItem>,
        amount_total: Price,
        now: DateTime<Utc>,
    ) {
        self.items = items;
        self.amount_total = amount_total;
        self.abandoned_at = None;
        self.updated_at = now;
    }

    /// Mark the cart abandoned (time-based sweep).
    ///
    /// A recovered cart stays recovered; marking it abandoned is a no-op.
    pub fn mark_abandoned(&mut self, now: DateTime<Utc>) {
        if self.recovered_at.is_some() {
            return;
        }
        self.abandoned_at = Some(now);
        self.updated_at = now;
    }

    /// Mark the cart recovered after a matching payment confirmation.
    pub fn mark_recovered(&mut self, now: DateTime<Utc>) {
        self.recovered_at = Some(now);
        self.abandoned_at = None;
        self.updated_at = now;
    }
}
