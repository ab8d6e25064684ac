//! Resource booking error types.

use common::Ref;
use confirmation_store::StoreError;
use thiserror::Error;

/// Errors a resource booking client can report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    /// The request failed local validation. Carries the first violated field.
    #[error("{0}")]
    InvalidRequest(String),

    /// No booking exists for the reference.
    #[error("no such booking: {0}")]
    NotFound(Ref),

    /// Transport or storage failure. Safe to retry with the same reference.
    #[error("resource unavailable: {0}")]
    Unavailable(String),

    /// The reference is already taken by a different request.
    #[error("booking already exists: {0}")]
    AlreadyExists(Ref),

    /// The resource refused to cancel; a real-world commitment is dangling.
    #[error("compensation failed for {booking_ref}: {reason}")]
    CompensationFailed { booking_ref: Ref, reason: String },
}

impl ResourceError {
    /// Returns true if the caller may retry the same call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ResourceError::Unavailable(_))
    }

    /// Returns a stable machine-readable code for the error.
    pub fn code(&self) -> &'static str {
        match self {
            ResourceError::InvalidRequest(_) => "invalid_request",
            ResourceError::NotFound(_) => "not_found",
            ResourceError::Unavailable(_) => "unavailable",
            ResourceError::AlreadyExists(_) => "already_exists",
            ResourceError::CompensationFailed { .. } => "compensation_failed",
        }
    }
}

impl From<StoreError> for ResourceError {
    fn from(err: StoreError) -> Self {
        ResourceError::Unavailable(err.to_string())
    }
}

/// Convenience type alias for resource client results.
pub type Result<T> = std::result::Result<T, ResourceError>;
