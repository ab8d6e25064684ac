//! Booking requests, one variant per resource type.

pub mod car_rental;
pub mod flight;

use chrono::{DateTime, Utc};
use common::ResourceKind;
use serde::{Deserialize, Serialize};

use crate::error::{ResourceError, Result};

pub use car_rental::CarRentalRequest;
pub use flight::FlightRequest;

/// A caller-supplied request to book one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BookingRequest {
    Flight(FlightRequest),
    CarRental(CarRentalRequest),
}

impl BookingRequest {
    /// Returns the resource kind this request targets.
    pub fn kind(&self) -> ResourceKind {
        match self {
            BookingRequest::Flight(_) => ResourceKind::Flight,
            BookingRequest::CarRental(_) => ResourceKind::CarRental,
        }
    }

    /// Checks every required field, reporting the first violation.
    pub fn validate(&self) -> Result<()> {
        match self {
            BookingRequest::Flight(r) => r.validate(),
            BookingRequest::CarRental(r) => r.validate(),
        }
    }
}

impl From<FlightRequest> for BookingRequest {
    fn from(r: FlightRequest) -> Self {
        BookingRequest::Flight(r)
    }
}

impl From<CarRentalRequest> for BookingRequest {
    fn from(r: CarRentalRequest) -> Self {
        BookingRequest::CarRental(r)
    }
}

/// Seconds from the Unix epoch to `0001-01-01T00:00:00Z`, the zero instant
/// other booking services emit for an unset timestamp.
const ZERO_INSTANT_SECS: i64 = -62_135_596_800;

/// Returns true if a timestamp is missing or the zero instant.
pub(crate) fn is_unset(time: &Option<DateTime<Utc>>) -> bool {
    match time {
        None => true,
        Some(t) => t.timestamp() == ZERO_INSTANT_SECS,
    }
}

pub(crate) fn invalid(field: &str) -> ResourceError {
    ResourceError::InvalidRequest(format!("invalid {field}"))
}
