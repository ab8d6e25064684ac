//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use confirmation_store::StoreError;
use resources::ResourceError;
use serde_json::json;
use thiserror::Error;
use trip::TripError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Resource service error.
    Resource(ResourceError),
    /// Trip orchestrator error.
    Trip(TripError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": msg, "kind": "invalid_request" }),
            ),
            ApiError::Resource(err) => resource_error_to_response(err),
            ApiError::Trip(err) => trip_error_to_response(err),
        };
        (status, axum::Json(body)).into_response()
    }
}

fn resource_error_to_response(err: ResourceError) -> (StatusCode, serde_json::Value) {
    let status = match &err {
        ResourceError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        ResourceError::NotFound(_) => StatusCode::NOT_FOUND,
        ResourceError::AlreadyExists(_) | ResourceError::CompensationFailed { .. } => {
            StatusCode::CONFLICT
        }
        ResourceError::Unavailable(_) => {
            tracing::warn!(error = %err, "resource service unavailable");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let mut body = json!({ "error": err.to_string(), "kind": err.code() });
    if err.is_retryable() {
        body["retryable"] = json!(true);
    }
    (status, body)
}

fn trip_error_to_response(err: TripError) -> (StatusCode, serde_json::Value) {
    let message = err.to_string();
    let kind = err.code();
    match err {
        TripError::InvalidRequest(_) => (
            StatusCode::BAD_REQUEST,
            json!({ "error": message, "kind": kind }),
        ),
        TripError::NotFound(_) => (
            StatusCode::NOT_FOUND,
            json!({ "error": message, "kind": kind }),
        ),
        TripError::IdempotencyConflict(_) => (
            StatusCode::CONFLICT,
            json!({ "error": message, "kind": kind }),
        ),
        // Transient: still a 500, flagged so callers retry with the same key.
        TripError::Unavailable(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": message, "kind": kind, "retryable": true }),
        ),
        TripError::PartialBookingFailure(report) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({
                "error": message,
                "kind": kind,
                "manual_intervention_required": false,
                "report": report,
            }),
        ),
        TripError::CompensationFailed(report) => {
            tracing::error!(trip_ref = %report.trip_ref, "trip left with uncompensated legs");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "error": message,
                    "kind": kind,
                    "manual_intervention_required": true,
                    "report": report,
                }),
            )
        }
        TripError::PartialReadFailure { trip, failures } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({
                "error": message,
                "kind": kind,
                "trip": trip,
                "failures": failures,
            }),
        ),
    }
}

impl From<ResourceError> for ApiError {
    fn from(err: ResourceError) -> Self {
        ApiError::Resource(err)
    }
}

impl From<TripError> for ApiError {
    fn from(err: TripError) -> Self {
        ApiError::Trip(err)
    }
}

/// Errors raised while assembling the application at start-up.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The confirmation store could not be reached or migrated.
    #[error("Confirmation store error: {0}")]
    Store(#[from] StoreError),

    /// A resource client could not be built.
    #[error("Resource client error: {0}")]
    Resource(#[from] ResourceError),
}
