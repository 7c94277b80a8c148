//! Shipping quote route handler.

use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use tracing::instrument;

use tidepool_fulfillment::FulfillmentError;
use tidepool_fulfillment::quote::{QuoteItem, ShippingQuote, parse_delivery_method};

use crate::error::Result;
use crate::state::AppState;

/// Body for a speculative shipping quote.
#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub items: Vec<QuoteItem>,
    pub delivery_method: String,
}

/// Compute a shipping quote. Pure lookup, nothing is persisted.
#[instrument(skip(state, request))]
pub async fn quote(
    State(state): State<AppState>,
    Json(request): Json<QuoteRequest>,
) -> Result<Json<ShippingQuote>> {
    let method =
        parse_delivery_method(&request.delivery_method).map_err(FulfillmentError::Quote)?;
    let quote = state.orchestrator().quote(&request.items, method)?;
    Ok(Json(quote))
}
