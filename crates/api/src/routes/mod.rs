//! HTTP route handlers.

pub mod health;
pub mod metrics;
pub mod services;
pub mod trips;

use common::Ref;
use serde::Deserialize;

use crate::error::ApiError;

/// `?ref=` query parameter shared by booking routes.
#[derive(Debug, Default, Deserialize)]
pub struct RefQuery {
    #[serde(rename = "ref")]
    pub booking_ref: Option<String>,
}

impl RefQuery {
    /// Returns the reference, or `None` if it is missing or blank.
    pub fn get(&self) -> Option<Ref> {
        self.booking_ref
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(Ref::new)
    }

    /// Returns the reference, rejecting the request if it is missing.
    pub fn require(&self) -> Result<Ref, ApiError> {
        self.get()
            .ok_or_else(|| ApiError::BadRequest("missing ref".to_string()))
    }
}
