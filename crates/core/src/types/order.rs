//! Order entity and its parts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Email, OrderId, OrderStatus, Price, ShipmentId};

/// A purchased line item.
///
/// Captured from the payment-confirmation event at order creation and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// Product identifier as known to the storefront catalog.
    pub product_id: String,
    /// Display name at time of purchase.
    pub name: String,
    /// Quantity purchased.
    pub quantity: u32,
    /// Unit price at time of purchase.
    pub unit_price: Price,
    /// Optional size variant (e.g. "M", "42").
    pub size: Option<String>,
}

/// Customer contact details captured from the payment event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerContact {
    pub email: Email,
    pub name: String,
    pub phone: Option<String>,
}

/// Where the shipment goes: a carrier pickup point or a street address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeliveryPoint {
    /// Carrier pickup point selected at checkout.
    PickupPoint {
        /// Carrier's pickup point identifier.
        id: String,
        /// Human-readable name of the location.
        name: String,
    },
    /// Home delivery to a street address.
    Address {
        street: String,
        postal_code: String,
        city: String,
        country: String,
    },
}

/// A customer order.
///
/// `amount_total` and `items` are set exactly once at creation from the
/// payment event; status updates never touch them. Orders are never hard
/// deleted - the lifecycle ends at a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    /// Payment provider's reference for the confirmed payment.
    pub payment_reference: String,
    pub customer: CustomerContact,
    pub delivery_point: DeliveryPoint,
    pub items: Vec<LineItem>,
    pub status: OrderStatus,
    pub amount_total: Price,
    pub shipping_total: Price,
    /// Set once the carrier accepts a shipment.
    pub shipment_id: Option<ShipmentId>,
    pub tracking_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Total item quantity across all line items.
    #[must_use]
    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::CurrencyCode;

    fn sample_order() -> Order {
        Order {
            id: OrderId::generate(),
            payment_reference: "pi_123".to_owned(),
            customer: CustomerContact {
                email: Email::parse("jo@example.com").unwrap(),
                name: "Jo Berg".to_owned(),
                phone: None,
            },
            delivery_point: DeliveryPoint::PickupPoint {
                id: "pp-77".to_owned(),
                name: "Corner Kiosk".to_owned(),
            },
            items: vec![
                LineItem {
                    product_id: "tshirt-1".to_owned(),
                    name: "T-shirt".to_owned(),
                    quantity: 2,
                    unit_price: Price::from_minor_units(1900, CurrencyCode::Sek),
                    size: Some("M".to_owned()),
                },
                LineItem {
                    product_id: "cap-1".to_owned(),
                    name: "Cap".to_owned(),
                    quantity: 1,
                    unit_price: Price::from_minor_units(900, CurrencyCode::Sek),
                    size: None,
                },
            ],
            status: OrderStatus::Paid,
            amount_total: Price::from_minor_units(4700, CurrencyCode::Sek),
            shipping_total: Price::from_minor_units(495, CurrencyCode::Sek),
            shipment_id: None,
            tracking_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            shipped_at: None,
            delivered_at: None,
        }
    }

    #[test]
    fn test_total_quantity() {
        assert_eq!(sample_order().total_quantity(), 3);
    }

    #[test]
    fn test_delivery_point_serde_tagged() {
        let point = DeliveryPoint::PickupPoint {
            id: "pp-77".to_owned(),
            name: "Corner Kiosk".to_owned(),
        };
        let json = serde_json::to_value(&point).unwrap();
        assert_eq!(json["type"], "pickup_point");
    }
}
