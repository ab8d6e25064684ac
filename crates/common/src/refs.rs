//! Injectable reference generation.

use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

use crate::types::Ref;

/// Source of fresh booking references.
///
/// Implementations must never hand out the same reference twice.
pub trait RefGenerator: Send + Sync {
    /// Returns a new, never-before-issued reference.
    fn next_ref(&self) -> Ref;
}

/// Generates random UUID-backed references.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRefGenerator;

impl UuidRefGenerator {
    /// Creates a new UUID reference generator.
    pub fn new() -> Self {
        Self
    }
}

impl RefGenerator for UuidRefGenerator {
    fn next_ref(&self) -> Ref {
        Ref::new(Uuid::new_v4().simple().to_string().to_uppercase())
    }
}

/// Generates predictable references of the form `PREFIX-0001`.
#[derive(Debug)]
pub struct SequentialRefGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SequentialRefGenerator {
    /// Creates a generator whose references start with `prefix`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }

    /// Returns how many references have been issued so far.
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::SeqCst) - 1
    }
}

impl Default for SequentialRefGenerator {
    fn default() -> Self {
        Self::with_prefix("REF")
    }
}

impl RefGenerator for SequentialRefGenerator {
    fn next_ref(&self) -> Ref {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        Ref::new(format!("{}-{:04}", self.prefix, n))
    }
}
