//! The capability every resource booking service exposes to the orchestrator.

use async_trait::async_trait;
use common::{Ref, ResourceKind};

use crate::confirmation::Confirmation;
use crate::error::Result;
use crate::requests::BookingRequest;

/// Book, read, and cancel bookings of one resource type.
///
/// References are chosen by the caller, so a retry with the same reference
/// and request lands on the same record instead of creating a duplicate.
#[async_trait]
pub trait ResourceBookingClient: Send + Sync {
    /// The resource type this client books.
    fn kind(&self) -> ResourceKind;

    /// Validates `request` locally, then records it under `booking_ref` with
    /// create-if-absent semantics.
    ///
    /// Fails with `InvalidRequest` before any I/O if validation fails, and
    /// with `AlreadyExists` if `booking_ref` holds a different request.
    async fn book(&self, booking_ref: &Ref, request: &BookingRequest) -> Result<Confirmation>;

    /// Reads a booking, triggering validation if it is still pending.
    async fn get(&self, booking_ref: &Ref) -> Result<Confirmation>;

    /// Cancels a booking. Cancelling twice is not an error.
    async fn cancel(&self, booking_ref: &Ref) -> Result<()>;
}
