//! Tidepool Fulfillment - the order fulfillment pipeline.
//!
//! Turns an external payment confirmation into a durable order record, a
//! carrier shipment, and a set of customer-visible status notifications,
//! while tolerating duplicate deliveries, out-of-order events, and
//! third-party API failures.
//!
//! # Components
//!
//! - [`webhook`] - signature verification, payload normalization, and
//!   idempotent ingestion for the payment, email, and carrier providers
//! - [`store`] - collaborator traits (orders, idempotency, notifications,
//!   carts) plus in-memory implementations
//! - [`quote`] - the pure shipping-rate computation engine
//! - [`carrier`] - shipment creation and tracking, normalized at the
//!   boundary
//! - [`notify`] - the notification dispatcher and email provider client
//! - [`orchestrator`] - coordinates the above per inbound event
//!
//! Each component takes its collaborators by injection; nothing in this
//! crate holds ambient global state.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod carrier;
pub mod error;
pub mod notify;
pub mod orchestrator;
pub mod quote;
pub mod store;
pub mod testing;
pub mod webhook;

pub use error::FulfillmentError;
pub use orchestrator::Orchestrator;
pub use webhook::WebhookProcessor;
