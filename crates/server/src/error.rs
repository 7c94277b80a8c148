//! Unified error handling with Sentry integration.
//!
//! `AppError` maps pipeline errors onto HTTP statuses and captures server
//! faults to Sentry before responding. All route handlers return
//! `Result<T, AppError>`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use tidepool_fulfillment::FulfillmentError;
use tidepool_fulfillment::quote::QuoteError;
use tidepool_fulfillment::store::RepositoryError;

/// Application-level error type for the server.
#[derive(Debug, Error)]
pub enum AppError {
    /// Pipeline operation failed.
    #[error(transparent)]
    Fulfillment(#[from] FulfillmentError),

    /// Missing or malformed request data at the HTTP edge.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid admin credentials.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Fulfillment(err) => match err {
                FulfillmentError::InvalidSignature(_) => StatusCode::UNAUTHORIZED,
                FulfillmentError::Validation(_) => StatusCode::BAD_REQUEST,
                FulfillmentError::OrderNotFound(_) => StatusCode::NOT_FOUND,
                FulfillmentError::StateConflict { .. } => StatusCode::CONFLICT,
                FulfillmentError::CarrierRejected { .. } | FulfillmentError::Upstream(_) => {
                    StatusCode::BAD_GATEWAY
                }
                FulfillmentError::Repository(repo) => match repo {
                    RepositoryError::NotFound(_) => StatusCode::NOT_FOUND,
                    RepositoryError::Conflict(_) => StatusCode::CONFLICT,
                    RepositoryError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                },
                FulfillmentError::Quote(quote) => match quote {
                    QuoteError::UnresolvableItem { .. } | QuoteError::Overweight { .. } => {
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                    QuoteError::InvalidDeliveryMethod(_) => StatusCode::BAD_REQUEST,
                },
            },
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server faults to Sentry; client errors are just noise.
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        // Don't expose internals for storage faults.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
