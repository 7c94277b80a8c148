//! Tidepool server - HTTP surface for the order fulfillment pipeline.
//!
//! Exposes the webhook ingestion endpoints, the admin order commands, the
//! customer tracking lookup, the quote and cart surfaces, and health
//! checks. The binary in `main.rs` wires configuration, Sentry, and the
//! background reconciliation loop around [`routes::build_router`].

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use routes::build_router;
