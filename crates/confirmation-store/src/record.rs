use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version number of a stored record, used for compare-and-swap updates.
///
/// Every successful write moves a record to a higher version, and a record
/// recreated under the same key never goes back to an earlier one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the version of a newly created record.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Condition that must hold for a write to be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePrecondition {
    /// Create-if-absent. Expired records count as absent.
    DoesNotExist,
    /// Compare-and-swap against the record's current version.
    MatchesVersion(Version),
    /// Unconditional upsert.
    None,
}

/// Outcome of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteResult {
    /// The write was applied; the record is now at `version`.
    Success { version: Version },
    /// The precondition did not hold and nothing was written.
    PreconditionFailed { current_version: Option<Version> },
}

impl WriteResult {
    /// Returns true if the write was applied.
    pub fn is_success(&self) -> bool {
        matches!(self, WriteResult::Success { .. })
    }
}

/// A record as held by the store: `{ref, payload}` plus bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Logical table (partition) the record lives in.
    pub table: String,
    /// The partition key, i.e. the booking reference.
    pub key: String,
    /// Serialized confirmation payload.
    pub payload: serde_json::Value,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Records past this instant are treated as absent.
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredRecord {
    /// Returns true if the record has expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// A typed value read from the store together with its version.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: Version,
}

/// Computes the absolute expiry for a record written at `now`.
pub(crate) fn expiry_from(now: DateTime<Utc>, ttl: Option<Duration>) -> Option<DateTime<Utc>> {
    ttl.and_then(|ttl| chrono::Duration::from_std(ttl).ok())
        .and_then(|ttl| now.checked_add_signed(ttl))
}
