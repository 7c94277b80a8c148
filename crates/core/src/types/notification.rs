//! Notification record entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Email, NotificationId, NotificationKind, NotificationStatus, OrderId, ProviderMessageId};

/// A recorded customer notification and its delivery lifecycle.
///
/// Created by the dispatcher when an email is sent (or fails to send);
/// mutated only by provider delivery-status webhooks, and only forward -
/// see [`NotificationStatus::can_advance_to`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: NotificationId,
    /// The order this notification concerns, if any (ad hoc support
    /// replies have none).
    pub order_id: Option<OrderId>,
    pub recipient: Email,
    pub kind: NotificationKind,
    pub status: NotificationStatus,
    /// Message ID assigned by the email provider; absent when the send
    /// call failed.
    pub provider_message_id: Option<ProviderMessageId>,
    pub subject: String,
    /// Rendered body, kept so a failed notification can be re-sent
    /// verbatim from the admin console.
    pub html_body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationRecord {
    /// Apply a provider delivery-status update.
    ///
    /// Returns true if the record changed. Downgrades, duplicates, and
    /// updates to a terminal record are silently ignored - status webhooks
    /// arrive at-least-once and out of order.
    pub fn apply_status(&mut self, next: NotificationStatus, now: DateTime<Utc>) -> bool {
        if !self.status.can_advance_to(next) {
            return false;
        }
        self.status = next;
        self.updated_at = now;
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn record(status: NotificationStatus) -> NotificationRecord {
        NotificationRecord {
            id: NotificationId::generate(),
            order_id: Some(OrderId::generate()),
            recipient: Email::parse("jo@example.com").unwrap(),
            kind: NotificationKind::OrderConfirmation,
            status,
            provider_message_id: Some(ProviderMessageId::new("msg-1")),
            subject: "Order confirmed".to_owned(),
            html_body: "<p>Thanks for your order.</p>".to_owned(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_forward_progress_applies() {
        let mut rec = record(NotificationStatus::Sent);
        assert!(rec.apply_status(NotificationStatus::Delivered, Utc::now()));
        assert!(rec.apply_status(NotificationStatus::Opened, Utc::now()));
        assert_eq!(rec.status, NotificationStatus::Opened);
    }

    #[test]
    fn test_opened_after_bounced_stays_bounced() {
        let mut rec = record(NotificationStatus::Bounced);
        assert!(!rec.apply_status(NotificationStatus::Opened, Utc::now()));
        assert_eq!(rec.status, NotificationStatus::Bounced);
    }

    #[test]
    fn test_delivered_after_opened_rejected() {
        let mut rec = record(NotificationStatus::Opened);
        assert!(!rec.apply_status(NotificationStatus::Delivered, Utc::now()));
        assert_eq!(rec.status, NotificationStatus::Opened);
    }

    #[test]
    fn test_duplicate_update_is_noop() {
        let mut rec = record(NotificationStatus::Delivered);
        assert!(!rec.apply_status(NotificationStatus::Delivered, Utc::now()));
    }
}
