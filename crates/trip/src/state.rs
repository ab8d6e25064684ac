//! Trip record and its status.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{Ref, ResourceKind};
use resources::Confirmation;
use serde::{Deserialize, Serialize};

/// Outcome status of a trip booking.
///
/// Only `Booked` trips are ever persisted; `PartiallyFailed` appears in
/// failure reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TripStatus {
    /// Every leg was booked and none was compensated.
    Booked,
    /// At least one leg failed and compensation was issued.
    PartiallyFailed,
}

impl TripStatus {
    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Booked => "Booked",
            TripStatus::PartiallyFailed => "PartiallyFailed",
        }
    }
}

impl std::fmt::Display for TripStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A booked trip: one confirmation per resource type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripConfirmation {
    #[serde(rename = "ref")]
    pub trip_ref: Ref,
    pub legs: BTreeMap<ResourceKind, Confirmation>,
    pub status: TripStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub booked_at: DateTime<Utc>,
}

impl TripConfirmation {
    /// Creates a booked trip from its leg confirmations.
    pub fn booked(
        trip_ref: Ref,
        legs: BTreeMap<ResourceKind, Confirmation>,
        idempotency_key: Option<String>,
    ) -> Self {
        Self {
            trip_ref,
            legs,
            status: TripStatus::Booked,
            idempotency_key,
            booked_at: Utc::now(),
        }
    }

    /// Returns the confirmation of the leg of `kind`, if the trip has one.
    pub fn leg(&self, kind: ResourceKind) -> Option<&Confirmation> {
        self.legs.get(&kind)
    }

    /// Returns true if every leg reached a terminal validation state.
    pub fn is_fully_validated(&self) -> bool {
        self.legs.values().all(|c| c.validation_state.is_terminal())
    }
}
