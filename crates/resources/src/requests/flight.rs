//! Flight booking request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{invalid, is_unset};
use crate::error::Result;

/// A request to reserve seats on a flight.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FlightRequest {
    #[serde(default)]
    pub airline: String,
    #[serde(default)]
    pub flight_number: String,
    /// Departure time.
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
    /// Passenger names, one per seat.
    #[serde(default)]
    pub passengers: Vec<String>,
}

impl FlightRequest {
    /// Creates a flight request.
    pub fn new(
        airline: impl Into<String>,
        flight_number: impl Into<String>,
        time: DateTime<Utc>,
        passengers: Vec<String>,
    ) -> Self {
        Self {
            airline: airline.into(),
            flight_number: flight_number.into(),
            time: Some(time),
            passengers,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.airline.is_empty() {
            return Err(invalid("airline"));
        }
        if self.flight_number.is_empty() {
            return Err(invalid("flight number"));
        }
        if is_unset(&self.time) {
            return Err(invalid("flight time"));
        }
        if self.passengers.is_empty() {
            return Err(invalid("passengers"));
        }
        if self.passengers.iter().any(|p| p.is_empty()) {
            return Err(invalid("passenger name"));
        }
        Ok(())
    }
}
