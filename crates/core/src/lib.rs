//! Tidepool Core - Shared types library.
//!
//! This crate provides common types used across all Tidepool components:
//! - `fulfillment` - Order fulfillment pipeline library
//! - `server` - HTTP service exposing webhook, admin, and cart surfaces
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access, no HTTP
//! clients. The order status transition table and notification status
//! progression live here so they can be tested without any collaborator.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, emails, prices, statuses, and the order,
//!   cart, notification, and tracking entities

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
