//! Structured detail of a failed trip booking.

use common::{Ref, ResourceKind};
use resources::ResourceError;
use serde::{Deserialize, Serialize};

use crate::state::TripStatus;

/// A leg identified by resource type and booking reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegRef {
    pub kind: ResourceKind,
    #[serde(rename = "ref")]
    pub booking_ref: Ref,
}

/// A leg operation that failed, with a machine-readable code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegFailure {
    pub kind: ResourceKind,
    #[serde(rename = "ref")]
    pub booking_ref: Ref,
    pub code: String,
    pub reason: String,
}

impl LegFailure {
    pub fn new(
        kind: ResourceKind,
        booking_ref: Ref,
        code: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            booking_ref,
            code: code.into(),
            reason: reason.into(),
        }
    }

    pub fn from_error(kind: ResourceKind, booking_ref: Ref, error: &ResourceError) -> Self {
        Self::new(kind, booking_ref, error.code(), error.to_string())
    }
}

/// What happened to each leg of a trip that failed to book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingFailureReport {
    #[serde(rename = "ref")]
    pub trip_ref: Ref,
    pub status: TripStatus,
    /// The primary failure, in one line.
    pub cause: String,
    /// Legs that failed to book, were cut short, or never started.
    pub failed: Vec<LegFailure>,
    /// Legs that landed and were cancelled.
    pub compensated: Vec<LegRef>,
    /// Legs that landed and could not be cancelled.
    pub compensation_failed: Vec<LegFailure>,
    pub manual_intervention_required: bool,
}

impl BookingFailureReport {
    pub fn new(trip_ref: Ref, cause: impl Into<String>) -> Self {
        Self {
            trip_ref,
            status: TripStatus::PartiallyFailed,
            cause: cause.into(),
            failed: Vec::new(),
            compensated: Vec::new(),
            compensation_failed: Vec::new(),
            manual_intervention_required: false,
        }
    }

    /// Returns true if no leg landed at all.
    pub fn nothing_landed(&self) -> bool {
        self.compensated.is_empty() && self.compensation_failed.is_empty()
    }
}
