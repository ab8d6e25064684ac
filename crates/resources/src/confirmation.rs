//! Booking confirmation record and its lifecycle.

use chrono::{DateTime, Utc};
use common::{Ref, ResourceKind};
use serde::{Deserialize, Serialize};

use crate::requests::BookingRequest;
use crate::validation::ValidationOutcome;

/// Downstream confirmation state of a booking.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Validated
///           └──► Failed
/// ```
/// Both non-pending states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ValidationState {
    /// Recorded but not yet confirmed downstream.
    #[default]
    Pending,
    /// Confirmed downstream (terminal state).
    Validated,
    /// Rejected downstream after booking (terminal state).
    Failed,
}

impl ValidationState {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ValidationState::Pending)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationState::Pending => "Pending",
            ValidationState::Validated => "Validated",
            ValidationState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for ValidationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a booking still holds the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BookingStatus {
    #[default]
    Active,
    /// Logically cancelled; the record is kept for audit.
    Cancelled,
}

/// A recorded booking of one resource.
///
/// Created once after a successful store write. Only the validation fields
/// and the cancellation tombstone change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confirmation {
    #[serde(rename = "ref")]
    pub booking_ref: Ref,
    pub request: BookingRequest,
    pub validation_state: ValidationState,
    /// Why downstream validation rejected the booking, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub status: BookingStatus,
    pub booked_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Confirmation {
    /// Creates a pending, active confirmation.
    pub fn new(booking_ref: Ref, request: BookingRequest) -> Self {
        Self {
            booking_ref,
            request,
            validation_state: ValidationState::Pending,
            rejection_reason: None,
            status: BookingStatus::Active,
            booked_at: Utc::now(),
            validated_at: None,
            cancelled_at: None,
        }
    }

    /// Returns the resource kind of the booking.
    pub fn kind(&self) -> ResourceKind {
        self.request.kind()
    }

    /// Returns true if the booking has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.status == BookingStatus::Cancelled
    }

    /// Returns true if a read should trigger validation.
    pub fn needs_validation(&self) -> bool {
        !self.is_cancelled() && !self.validation_state.is_terminal()
    }

    /// Records a validation outcome. Has no effect once terminal.
    pub fn apply_validation(&mut self, outcome: ValidationOutcome) {
        if self.validation_state.is_terminal() {
            return;
        }
        match outcome {
            ValidationOutcome::Validated => {
                self.validation_state = ValidationState::Validated;
            }
            ValidationOutcome::Rejected(reason) => {
                self.validation_state = ValidationState::Failed;
                self.rejection_reason = Some(reason);
            }
        }
        self.validated_at = Some(Utc::now());
    }

    /// Tombstones the booking.
    pub fn cancel(&mut self) {
        if !self.is_cancelled() {
            self.status = BookingStatus::Cancelled;
            self.cancelled_at = Some(Utc::now());
        }
    }
}
