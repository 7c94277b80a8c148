//! HTTP routes and router assembly.

mod cart;
mod orders;
mod quotes;
mod webhooks;

use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use secrecy::ExposeSecret;
use tower_http::trace::TraceLayer;

use tidepool_fulfillment::webhook::constant_time_eq;

use crate::error::{AppError, Result};
use crate::state::AppState;

/// Build the full application router.
///
/// Sentry tower layers are added by `main` so the router stays usable in
/// tests without a Sentry hub.
pub fn build_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/api/orders/{id}/status", post(orders::advance_status))
        .route(
            "/api/orders/{id}/notifications",
            post(orders::send_support_reply),
        )
        .route(
            "/api/notifications/{id}/resend",
            post(orders::resend_notification),
        )
        .route("/internal/reconcile", post(orders::reconcile))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_admin,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .route("/webhooks/payment", post(webhooks::payment))
        .route("/webhooks/email", post(webhooks::email))
        .route("/webhooks/carrier", post(webhooks::carrier))
        .route("/api/orders/{id}/tracking", get(orders::tracking))
        .route("/api/quotes", post(quotes::quote))
        .route("/api/cart", post(cart::upsert))
        .route("/api/cart/{session}/abandon", post(cart::abandon))
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// The pipeline's stores are in-process, so readiness follows liveness.
async fn readiness() -> StatusCode {
    StatusCode::OK
}

/// Bearer-token check for the admin/internal surface.
///
/// Auth proper lives at the deployment edge; this is the stand-in that
/// keeps the admin surface from being open in any environment.
async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))?;

    if !constant_time_eq(
        token.as_bytes(),
        state.config().admin_api_token.expose_secret().as_bytes(),
    ) {
        return Err(AppError::Unauthorized("invalid bearer token".to_string()));
    }

    Ok(next.run(request).await)
}
