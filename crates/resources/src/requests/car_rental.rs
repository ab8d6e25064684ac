//! Car rental booking request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{invalid, is_unset};
use crate::error::Result;

/// A request to reserve a rental car.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CarRentalRequest {
    /// Rental agency.
    #[serde(default)]
    pub agent: String,
    #[serde(default)]
    pub pick_up: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pick_up_location: String,
    #[serde(default)]
    pub drop_off: Option<DateTime<Utc>>,
    #[serde(default)]
    pub drop_off_location: String,
    /// Name of the renter.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub vehicle_class: String,
}

impl CarRentalRequest {
    pub fn validate(&self) -> Result<()> {
        if self.agent.is_empty() {
            return Err(invalid("agent"));
        }
        if is_unset(&self.pick_up) {
            return Err(invalid("pick up"));
        }
        if self.pick_up_location.is_empty() {
            return Err(invalid("pick up location"));
        }
        if is_unset(&self.drop_off) {
            return Err(invalid("drop off"));
        }
        // A car cannot be returned before it is collected.
        if self.drop_off < self.pick_up {
            return Err(invalid("drop off"));
        }
        if self.drop_off_location.is_empty() {
            return Err(invalid("drop off location"));
        }
        if self.name.is_empty() {
            return Err(invalid("name"));
        }
        if self.vehicle_class.is_empty() {
            return Err(invalid("vehicle class"));
        }
        Ok(())
    }
}
