//! Shared types for the trip booking system.

pub mod refs;
pub mod types;

pub use refs::{RefGenerator, SequentialRefGenerator, UuidRefGenerator};
pub use types::{Ref, ResourceKind};
