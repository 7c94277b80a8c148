//! Abandoned-cart tracking route handlers.

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use tidepool_core::{CartItem, CurrencyCode, Email, Price, SessionId};
use tidepool_fulfillment::store::CartCustomer;

use crate::error::{AppError, Result};
use crate::state::AppState;

/// Body for a cart snapshot upsert.
#[derive(Debug, Deserialize)]
pub struct CartRequest {
    pub session_id: String,
    pub items: Vec<CartItemRequest>,
    pub amount_total_minor: i64,
    pub currency: String,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
}

/// One cart line in the snapshot.
#[derive(Debug, Deserialize)]
pub struct CartItemRequest {
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price_minor: i64,
}

/// Record or refresh a cart snapshot for a storefront session.
#[instrument(skip(state, request), fields(session_id = %request.session_id))]
pub async fn upsert(
    State(state): State<AppState>,
    Json(request): Json<CartRequest>,
) -> Result<Json<Value>> {
    let currency: CurrencyCode = request
        .currency
        .parse()
        .map_err(|e: String| AppError::BadRequest(e))?;

    let email = request
        .customer_email
        .as_deref()
        .map(Email::parse)
        .transpose()
        .map_err(|e| AppError::BadRequest(format!("customer email: {e}")))?;

    let items = request
        .items
        .into_iter()
        .map(|item| CartItem {
            product_id: item.product_id,
            name: item.name,
            quantity: item.quantity,
            unit_price: Price::from_minor_units(item.unit_price_minor, currency),
        })
        .collect();

    let cart = state
        .orchestrator()
        .track_cart(
            SessionId::new(request.session_id),
            items,
            CartCustomer {
                email,
                name: request.customer_name,
            },
            Price::from_minor_units(request.amount_total_minor, currency),
        )
        .await?;

    Ok(Json(json!({ "cart": cart })))
}

/// Mark a tracked cart abandoned (called by the external sweep).
///
/// Unknown sessions and already-recovered carts are a no-op, not an
/// error - the sweep runs on a timer and its view can be stale.
#[instrument(skip(state))]
pub async fn abandon(
    State(state): State<AppState>,
    Path(session): Path<String>,
) -> Result<Json<Value>> {
    let session_id = SessionId::new(session);
    let cart = state.orchestrator().abandon_cart(&session_id).await?;

    let abandoned = cart
        .as_ref()
        .is_some_and(|cart| cart.abandoned_at.is_some());
    Ok(Json(json!({ "abandoned": abandoned, "cart": cart })))
}
