//! Confirmation storage for the trip booking system.
//!
//! A durable key-value table keyed by booking reference. Every write names a
//! precondition; create-if-absent (`WritePrecondition::DoesNotExist`) is the
//! primitive that makes bookings retry-safe.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryConfirmationStore;
pub use postgres::PostgresConfirmationStore;
pub use record::{StoredRecord, Version, Versioned, WritePrecondition, WriteResult};
pub use store::{ConfirmationStore, ConfirmationStoreExt};
