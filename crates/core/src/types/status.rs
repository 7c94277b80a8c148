//! Status enums and the order transition table.
//!
//! Order status is a closed enumeration with an explicit transition table.
//! Unrecognized status strings are rejected at the boundary rather than
//! persisted, and a transition to the current status is a no-op rather than
//! an error, which keeps retried admin actions and webhooks idempotent.

use serde::{Deserialize, Serialize};

/// Order lifecycle status.
///
/// ```text
/// New ──► Paid ──► Processing ──► Shipped ──► Delivered
///  │        │           │            │
///  └────────┴───────────┴────────────┴──► Cancelled
/// ```
///
/// `Returned` is reached through the return-request sub-flow and is, like
/// `Delivered` and `Cancelled`, terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order exists without a confirmed payment (manual admin creation).
    #[default]
    New,
    /// Payment confirmed by the payment provider.
    Paid,
    /// Order is being picked and packed.
    Processing,
    /// Handed to the carrier; a shipment ID exists.
    Shipped,
    /// Carrier reported delivery. Terminal.
    Delivered,
    /// Cancelled before delivery. Terminal.
    Cancelled,
    /// Approved return. Terminal.
    Returned,
}

impl OrderStatus {
    /// Returns true if no further transitions are expected.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled | Self::Returned)
    }

    /// Whether a transition from `self` to `target` is legal.
    ///
    /// Transitions only move forward through the main lifecycle;
    /// `Cancelled` is reachable from any non-terminal state and `Returned`
    /// from anything that is not already `Cancelled` or `Returned` (the
    /// return sub-flow applies it after a delivered order's return is
    /// approved). A same-status "transition" is not legal here - callers
    /// treat it as a no-op before consulting this table.
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        if *self == target {
            return false;
        }
        match target {
            Self::New => false,
            Self::Paid => matches!(self, Self::New),
            Self::Processing => matches!(self, Self::New | Self::Paid),
            Self::Shipped => matches!(self, Self::Paid | Self::Processing),
            Self::Delivered => matches!(self, Self::Shipped),
            Self::Cancelled => !self.is_terminal(),
            Self::Returned => !matches!(self, Self::Cancelled | Self::Returned),
        }
    }

    /// The status name as stored and rendered.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Paid => "paid",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Returned => "returned",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "paid" => Ok(Self::Paid),
            "processing" => Ok(Self::Processing),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            "returned" => Ok(Self::Returned),
            _ => Err(format!("invalid order status: {s}")),
        }
    }
}

/// Kind of customer notification, keyed to an email template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderConfirmation,
    ShippingConfirmation,
    StatusUpdate,
    DeliveredConfirmation,
    SupportReply,
}

impl NotificationKind {
    /// The notification kind triggered by a transition into `target`, if any.
    ///
    /// `New` has no notification: orders only enter `New` through manual
    /// admin creation, which composes its own message if needed.
    #[must_use]
    pub const fn for_transition(target: OrderStatus) -> Option<Self> {
        match target {
            OrderStatus::Shipped => Some(Self::ShippingConfirmation),
            OrderStatus::Delivered => Some(Self::DeliveredConfirmation),
            OrderStatus::Paid
            | OrderStatus::Processing
            | OrderStatus::Cancelled
            | OrderStatus::Returned => Some(Self::StatusUpdate),
            OrderStatus::New => None,
        }
    }
}

/// Delivery lifecycle of a sent notification, as reported by the email
/// provider's webhooks.
///
/// Progression is monotonic: `Sent → Delivered → Opened`, with the terminal
/// `Bounced` reachable from any non-terminal state. `Failed` means the send
/// call itself failed and nothing went out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Sent,
    Delivered,
    Opened,
    Bounced,
    Failed,
}

impl NotificationStatus {
    /// Position in the delivery progression; higher means further along.
    const fn rank(self) -> u8 {
        match self {
            Self::Failed => 0,
            Self::Sent => 1,
            Self::Delivered => 2,
            Self::Opened => 3,
            Self::Bounced => 4,
        }
    }

    /// Returns true if no later webhook may change this status.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Bounced | Self::Failed)
    }

    /// Whether a provider update to `next` represents forward progress.
    ///
    /// Out-of-order and duplicate deliveries of status webhooks are common;
    /// an update is applied only if it moves the record forward.
    #[must_use]
    pub const fn can_advance_to(&self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        next.rank() > self.rank()
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Opened => "opened",
            Self::Bounced => "bounced",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Delivery method selected at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    /// Delivery to a carrier pickup point.
    PickupPoint,
    /// Delivery to the customer's address.
    HomeDelivery,
}

impl std::str::FromStr for DeliveryMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pickup_point" | "pickup" => Ok(Self::PickupPoint),
            "home_delivery" | "home" => Ok(Self::HomeDelivery),
            _ => Err(format!("invalid delivery method: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        assert!(OrderStatus::New.can_transition_to(OrderStatus::Paid));
        assert!(OrderStatus::Paid.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::New.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Paid.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Delivered));
    }

    #[test]
    fn test_no_backward_transitions() {
        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::New));
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Processing));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Shipped));
        assert!(!OrderStatus::New.can_transition_to(OrderStatus::Shipped));
        assert!(!OrderStatus::New.can_transition_to(OrderStatus::Delivered));
    }

    #[test]
    fn test_cancel_from_non_terminal_only() {
        assert!(OrderStatus::New.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Paid.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Returned.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn test_returned_reachable_after_delivery() {
        assert!(OrderStatus::Delivered.can_transition_to(OrderStatus::Returned));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Returned));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Returned));
    }

    #[test]
    fn test_same_status_is_not_a_transition() {
        for status in [
            OrderStatus::New,
            OrderStatus::Paid,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            assert!(!status.can_transition_to(status));
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Returned.is_terminal());
        assert!(!OrderStatus::Shipped.is_terminal());
    }

    #[test]
    fn test_status_from_str_rejects_unknown() {
        assert!("refunded".parse::<OrderStatus>().is_err());
        assert_eq!(
            "shipped".parse::<OrderStatus>(),
            Ok(OrderStatus::Shipped)
        );
    }

    #[test]
    fn test_notification_kind_for_transition() {
        assert_eq!(
            NotificationKind::for_transition(OrderStatus::Shipped),
            Some(NotificationKind::ShippingConfirmation)
        );
        assert_eq!(
            NotificationKind::for_transition(OrderStatus::Delivered),
            Some(NotificationKind::DeliveredConfirmation)
        );
        assert_eq!(
            NotificationKind::for_transition(OrderStatus::Cancelled),
            Some(NotificationKind::StatusUpdate)
        );
        assert_eq!(NotificationKind::for_transition(OrderStatus::New), None);
    }

    #[test]
    fn test_notification_status_monotonic() {
        assert!(NotificationStatus::Sent.can_advance_to(NotificationStatus::Delivered));
        assert!(NotificationStatus::Delivered.can_advance_to(NotificationStatus::Opened));
        assert!(NotificationStatus::Sent.can_advance_to(NotificationStatus::Bounced));
        assert!(NotificationStatus::Opened.can_advance_to(NotificationStatus::Bounced));

        // No downgrades, no escapes from terminal states.
        assert!(!NotificationStatus::Opened.can_advance_to(NotificationStatus::Delivered));
        assert!(!NotificationStatus::Bounced.can_advance_to(NotificationStatus::Opened));
        assert!(!NotificationStatus::Bounced.can_advance_to(NotificationStatus::Sent));
        assert!(!NotificationStatus::Delivered.can_advance_to(NotificationStatus::Sent));
    }

    #[test]
    fn test_delivery_method_from_str() {
        assert_eq!(
            "pickup".parse::<DeliveryMethod>(),
            Ok(DeliveryMethod::PickupPoint)
        );
        assert_eq!(
            "home_delivery".parse::<DeliveryMethod>(),
            Ok(DeliveryMethod::HomeDelivery)
        );
        assert!("drone".parse::<DeliveryMethod>().is_err());
    }
}
