//! Fulfillment pipeline error taxonomy.
//!
//! Verification and validation errors are raised before any state is
//! touched; repository and provider errors abort the current unit of work
//! entirely, so there is never partial order or notification state.

use thiserror::Error;

use tidepool_core::{OrderId, OrderStatus};

use crate::carrier::CarrierError;
use crate::notify::EmailError;
use crate::quote::QuoteError;
use crate::store::RepositoryError;
use crate::webhook::SignatureError;

/// Errors surfaced by the fulfillment pipeline.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// Webhook signature did not verify. No state was touched.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Malformed or unrecognized payload. Retrying will not help.
    #[error("invalid payload: {0}")]
    Validation(String),

    /// Referenced order does not exist.
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// Attempted transition from an unexpected current status.
    #[error("illegal status transition from {from} to {to}")]
    StateConflict {
        from: OrderStatus,
        to: OrderStatus,
    },

    /// Carrier refused the shipment. The order was not updated.
    #[error("carrier rejected shipment: {status} {message}")]
    CarrierRejected { status: u16, message: String },

    /// A provider call failed or timed out. Retryable; surfaced to the
    /// caller so the provider's own retry mechanism re-delivers.
    #[error("upstream unavailable: {0}")]
    Upstream(String),

    /// Store operation failed.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Shipping quote could not be computed.
    #[error(transparent)]
    Quote(#[from] QuoteError),
}

impl From<SignatureError> for FulfillmentError {
    fn from(err: SignatureError) -> Self {
        Self::InvalidSignature(err.to_string())
    }
}

impl From<CarrierError> for FulfillmentError {
    fn from(err: CarrierError) -> Self {
        match err {
            CarrierError::Rejected { status, message } => {
                Self::CarrierRejected { status, message }
            }
            CarrierError::Http(e) => Self::Upstream(e.to_string()),
            CarrierError::Parse(msg) => Self::Upstream(format!("carrier response: {msg}")),
        }
    }
}

impl From<EmailError> for FulfillmentError {
    fn from(err: EmailError) -> Self {
        Self::Upstream(format!("email provider: {err}"))
    }
}
