//! Resource booking clients for the trip booking system.
//!
//! Each travel resource (flight, car rental) is fulfilled by an autonomous
//! booking service. This crate defines the capability every such service
//! exposes to the orchestrator (`ResourceBookingClient`: book, get, cancel),
//! the per-resource request types, the booking `Confirmation` record, and the
//! Validation Engine that confirms a booking lazily on first read.
//!
//! Implementations:
//! - `StoreBackedClient`: a resource service backed by a confirmation store
//! - `HttpResourceClient`: a remote resource service reached over HTTP
//! - `FaultInjectingClient`: a decorator for failure drills and tests

pub mod client;
pub mod clients;
pub mod confirmation;
pub mod error;
pub mod requests;
pub mod validation;

pub use client::ResourceBookingClient;
pub use clients::{FaultInjectingClient, HttpResourceClient, StoreBackedClient};
pub use confirmation::{BookingStatus, Confirmation, ValidationState};
pub use error::{ResourceError, Result};
pub use requests::{BookingRequest, CarRentalRequest, FlightRequest};
pub use validation::{
    FixedValidator, SimulatedValidator, ValidationConfig, ValidationEngine, ValidationOutcome,
};
