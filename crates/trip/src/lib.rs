//! Trip orchestration over independently-owned resource booking services.
//!
//! A trip books one leg per resource type (flight, car rental) without a
//! shared transaction:
//! 1. Every leg is validated before any service is called
//! 2. All legs are booked concurrently; the first failure cancels the rest
//! 3. On full success the trip record is persisted with create-if-absent
//! 4. On any failure, every leg that may have landed is cancelled
//!
//! Compensation failures are never swallowed: they surface as
//! `TripError::CompensationFailed` with a manual-intervention flag.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod report;
pub mod request;
pub mod state;

pub use config::OrchestratorConfig;
pub use error::{Result, TripError};
pub use orchestrator::{BookedTrip, IDEMPOTENCY_TABLE, TRIPS_TABLE, TripOrchestrator};
pub use report::{BookingFailureReport, LegFailure, LegRef};
pub use request::TripRequest;
pub use state::{TripConfirmation, TripStatus};
