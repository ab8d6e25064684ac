//! Trip orchestrator error types.

use common::Ref;
use confirmation_store::StoreError;
use resources::ResourceError;
use thiserror::Error;

use crate::report::{BookingFailureReport, LegFailure};
use crate::state::TripConfirmation;

/// Errors reported by the trip orchestrator.
#[derive(Debug, Clone, Error)]
pub enum TripError {
    /// The trip request failed validation. No service was called.
    #[error("{0}")]
    InvalidRequest(String),

    /// No trip or leg exists for the reference.
    #[error("no such booking: {0}")]
    NotFound(Ref),

    /// Transient failure with nothing left booked. Retry with the same
    /// idempotency key.
    #[error("trip booking unavailable: {0}")]
    Unavailable(String),

    /// The idempotency key was already used for a different trip.
    #[error("idempotency conflict: {0}")]
    IdempotencyConflict(String),

    /// Some legs failed; every leg that landed was cancelled.
    #[error("trip {} failed: {}", .0.trip_ref, .0.cause)]
    PartialBookingFailure(Box<BookingFailureReport>),

    /// At least one landed leg could not be cancelled.
    #[error(
        "trip {} failed and {} leg(s) could not be cancelled; manual intervention required",
        .0.trip_ref,
        .0.compensation_failed.len()
    )]
    CompensationFailed(Box<BookingFailureReport>),

    /// The trip exists but some legs could not be read.
    #[error("trip {} read degraded: {} leg(s) unavailable", .trip.trip_ref, .failures.len())]
    PartialReadFailure {
        trip: Box<TripConfirmation>,
        failures: Vec<LegFailure>,
    },
}

impl TripError {
    /// Returns true if the caller may retry with the same idempotency key.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TripError::Unavailable(_))
    }

    /// Returns a stable machine-readable code for the error.
    pub fn code(&self) -> &'static str {
        match self {
            TripError::InvalidRequest(_) => "invalid_request",
            TripError::NotFound(_) => "not_found",
            TripError::Unavailable(_) => "unavailable",
            TripError::IdempotencyConflict(_) => "idempotency_conflict",
            TripError::PartialBookingFailure(_) => "partial_booking_failure",
            TripError::CompensationFailed(_) => "compensation_failed",
            TripError::PartialReadFailure { .. } => "partial_read_failure",
        }
    }
}

impl From<StoreError> for TripError {
    fn from(err: StoreError) -> Self {
        TripError::Unavailable(err.to_string())
    }
}

impl From<ResourceError> for TripError {
    fn from(err: ResourceError) -> Self {
        match err {
            ResourceError::InvalidRequest(msg) => TripError::InvalidRequest(msg),
            ResourceError::NotFound(r) => TripError::NotFound(r),
            other => TripError::Unavailable(other.to_string()),
        }
    }
}

/// Convenience type alias for trip results.
pub type Result<T> = std::result::Result<T, TripError>;
