//! Provider payload parsing.
//!
//! Provider field names vary across payload versions (snake_case,
//! camelCase, renamed keys); serde aliases absorb the variance here so
//! nothing provider-specific leaks past the ingestion layer. Output is the
//! small set of typed events the orchestrator understands.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use tidepool_core::{
    CurrencyCode, CustomerContact, DeliveryPoint, Email, LineItem, NotificationStatus, Price,
    ProviderMessageId, SessionId, ShipmentId, TrackingStatus,
};

use crate::carrier::normalize_status;
use crate::error::FulfillmentError;

/// A verified, normalized payment confirmation.
#[derive(Debug, Clone)]
pub struct PaymentConfirmed {
    pub event_id: String,
    pub payment_reference: String,
    pub customer: CustomerContact,
    pub delivery_point: DeliveryPoint,
    pub items: Vec<LineItem>,
    pub amount_total: Price,
    pub shipping_total: Price,
    /// Browser session that produced this checkout, when the storefront
    /// attached one; used to mark a tracked cart recovered.
    pub session_id: Option<SessionId>,
}

/// A verified, normalized email delivery-status update.
#[derive(Debug, Clone)]
pub struct EmailStatusEvent {
    pub message_id: ProviderMessageId,
    pub status: NotificationStatus,
    pub occurred_at: Option<DateTime<Utc>>,
}

/// A verified, normalized carrier status push.
#[derive(Debug, Clone)]
pub struct CarrierStatusEvent {
    pub event_id: String,
    pub shipment_id: ShipmentId,
    pub status: TrackingStatus,
    pub status_text: String,
    pub location: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct PaymentEnvelope {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    data: PaymentData,
}

#[derive(Debug, Deserialize)]
struct PaymentData {
    #[serde(alias = "paymentId", alias = "payment_intent")]
    payment_id: String,
    #[serde(alias = "amountTotal", alias = "amount")]
    amount_total: i64,
    currency: String,
    #[serde(alias = "shippingAmount", default)]
    shipping_amount: i64,
    customer: PaymentCustomer,
    #[serde(alias = "sessionId", default)]
    session_id: Option<String>,
    delivery: PaymentDelivery,
    #[serde(alias = "lineItems", alias = "line_items")]
    items: Vec<PaymentItem>,
}

#[derive(Debug, Deserialize)]
struct PaymentCustomer {
    email: String,
    name: String,
    #[serde(default)]
    phone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentDelivery {
    #[serde(alias = "deliveryMethod")]
    method: String,
    #[serde(alias = "pickupPointId", default)]
    pickup_point_id: Option<String>,
    #[serde(alias = "pickupPointName", default)]
    pickup_point_name: Option<String>,
    #[serde(default)]
    street: Option<String>,
    #[serde(alias = "postalCode", alias = "zip", default)]
    postal_code: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentItem {
    #[serde(alias = "productId")]
    product_id: String,
    name: String,
    quantity: u32,
    #[serde(alias = "unitAmount", alias = "unit_amount")]
    unit_price: i64,
    #[serde(default)]
    size: Option<String>,
}

/// Parse a verified payment webhook body.
///
/// # Errors
///
/// Returns [`FulfillmentError::Validation`] for malformed JSON, an
/// unsupported event type, an invalid email, or an incomplete delivery
/// block.
pub fn parse_payment_event(body: &[u8]) -> Result<PaymentConfirmed, FulfillmentError> {
    let envelope: PaymentEnvelope = serde_json::from_slice(body)
        .map_err(|e| FulfillmentError::Validation(format!("payment payload: {e}")))?;

    if envelope.kind != "payment.confirmed" {
        return Err(FulfillmentError::Validation(format!(
            "unsupported payment event type: {}",
            envelope.kind
        )));
    }

    let data = envelope.data;
    let currency: CurrencyCode = data
        .currency
        .parse()
        .map_err(|e: String| FulfillmentError::Validation(e))?;

    let email = Email::parse(&data.customer.email)
        .map_err(|e| FulfillmentError::Validation(format!("customer email: {e}")))?;

    let delivery_point = parse_delivery(data.delivery)?;

    let items = data
        .items
        .into_iter()
        .map(|item| LineItem {
            product_id: item.product_id,
            name: item.name,
            quantity: item.quantity,
            unit_price: Price::from_minor_units(item.unit_price, currency),
            size: item.size,
        })
        .collect::<Vec<_>>();

    if items.is_empty() {
        return Err(FulfillmentError::Validation(
            "payment event has no line items".into(),
        ));
    }

    Ok(PaymentConfirmed {
        event_id: envelope.id,
        payment_reference: data.payment_id,
        customer: CustomerContact {
            email,
            name: data.customer.name,
            phone: data.customer.phone,
        },
        delivery_point,
        items,
        amount_total: Price::from_minor_units(data.amount_total, currency),
        shipping_total: Price::from_minor_units(data.shipping_amount, currency),
        session_id: data.session_id.map(SessionId::new),
    })
}

fn parse_delivery(delivery: PaymentDelivery) -> Result<DeliveryPoint, FulfillmentError> {
    match delivery.method.as_str() {
        "pickup_point" | "pickup" => {
            let id = delivery.pickup_point_id.ok_or_else(|| {
                FulfillmentError::Validation("pickup delivery without pickup point id".into())
            })?;
            Ok(DeliveryPoint::PickupPoint {
                name: delivery.pickup_point_name.unwrap_or_else(|| id.clone()),
                id,
            })
        }
        "home_delivery" | "home" => {
            let (Some(street), Some(postal_code), Some(city), Some(country)) = (
                delivery.street,
                delivery.postal_code,
                delivery.city,
                delivery.country,
            ) else {
                return Err(FulfillmentError::Validation(
                    "home delivery without a complete address".into(),
                ));
            };
            Ok(DeliveryPoint::Address {
                street,
                postal_code,
                city,
                country,
            })
        }
        other => Err(FulfillmentError::Validation(format!(
            "invalid delivery method: {other}"
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct EmailEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(alias = "createdAt", default)]
    created_at: Option<DateTime<Utc>>,
    data: EmailData,
}

#[derive(Debug, Deserialize)]
struct EmailData {
    #[serde(alias = "emailId", alias = "message_id")]
    email_id: String,
}

/// Parse a verified email delivery-status webhook body.
///
/// # Errors
///
/// Returns [`FulfillmentError::Validation`] for malformed JSON or an
/// unrecognized event type.
pub fn parse_email_event(body: &[u8]) -> Result<EmailStatusEvent, FulfillmentError> {
    let envelope: EmailEnvelope = serde_json::from_slice(body)
        .map_err(|e| FulfillmentError::Validation(format!("email payload: {e}")))?;

    let status = match envelope.kind.as_str() {
        "email.delivered" => NotificationStatus::Delivered,
        "email.opened" => NotificationStatus::Opened,
        "email.bounced" => NotificationStatus::Bounced,
        other => {
            return Err(FulfillmentError::Validation(format!(
                "unsupported email event type: {other}"
            )));
        }
    };

    Ok(EmailStatusEvent {
        message_id: ProviderMessageId::new(envelope.data.email_id),
        status,
        occurred_at: envelope.created_at,
    })
}

#[derive(Debug, Deserialize)]
struct CarrierEnvelope {
    #[serde(alias = "eventId", alias = "id")]
    event_id: String,
    #[serde(alias = "shipmentId", alias = "parcel_id")]
    shipment_id: String,
    #[serde(alias = "statusCode", alias = "status_code")]
    status: String,
    #[serde(alias = "statusText", default)]
    status_text: Option<String>,
    #[serde(alias = "currentLocation", default)]
    location: Option<String>,
    #[serde(alias = "occurredAt", alias = "timestamp", default)]
    occurred_at: Option<DateTime<Utc>>,
}

/// Parse a carrier status push body.
///
/// # Errors
///
/// Returns [`FulfillmentError::Validation`] for malformed JSON. An
/// unrecognized status string is not an error - it normalizes to
/// [`TrackingStatus::Unknown`].
pub fn parse_carrier_event(body: &[u8]) -> Result<CarrierStatusEvent, FulfillmentError> {
    let envelope: CarrierEnvelope = serde_json::from_slice(body)
        .map_err(|e| FulfillmentError::Validation(format!("carrier payload: {e}")))?;

    Ok(CarrierStatusEvent {
        event_id: envelope.event_id,
        shipment_id: ShipmentId::new(envelope.shipment_id),
        status: normalize_status(&envelope.status),
        status_text: envelope.status_text.unwrap_or_else(|| envelope.status.clone()),
        location: envelope.location,
        occurred_at: envelope.occurred_at,
    })
}
