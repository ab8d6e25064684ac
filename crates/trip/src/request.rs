//! Trip booking request.

use std::collections::HashSet;

use resources::BookingRequest;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TripError};

/// A request to book a trip: at most one leg per resource type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRequest {
    pub legs: Vec<BookingRequest>,
    /// Client-chosen key making retries of the same trip safe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl TripRequest {
    pub fn new(legs: Vec<BookingRequest>) -> Self {
        Self {
            legs,
            idempotency_key: None,
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Checks the trip shape and every leg, reporting the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.legs.is_empty() {
            return Err(TripError::InvalidRequest("invalid trip: no legs".into()));
        }
        if matches!(&self.idempotency_key, Some(key) if key.trim().is_empty()) {
            return Err(TripError::InvalidRequest(
                "invalid trip: empty idempotency key".into(),
            ));
        }

        let mut seen = HashSet::new();
        for leg in &self.legs {
            if !seen.insert(leg.kind()) {
                return Err(TripError::InvalidRequest(format!(
                    "invalid trip: duplicate {} leg",
                    leg.kind()
                )));
            }
        }
        for leg in &self.legs {
            leg.validate()?;
        }
        Ok(())
    }
}
