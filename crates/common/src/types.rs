use serde::{Deserialize, Serialize};

/// Opaque, globally unique booking reference.
///
/// Used for both individual resource bookings and composite trips. The
/// value is treated as an opaque string; only the generator that produced
/// it knows its structure.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ref(String);

impl Ref {
    /// Creates a reference from any string-like value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the reference as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the reference is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for Ref {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Ref {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Ref {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for Ref {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The type of travel resource a booking leg targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// An airline seat reservation.
    Flight,
    /// A car rental reservation.
    CarRental,
}

impl ResourceKind {
    /// All known resource kinds.
    pub const ALL: [ResourceKind; 2] = [ResourceKind::Flight, ResourceKind::CarRental];

    /// Returns the kind name as used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Flight => "flight",
            ResourceKind::CarRental => "car_rental",
        }
    }

    /// Returns the storage table holding confirmations of this kind.
    pub fn table(&self) -> &'static str {
        match self {
            ResourceKind::Flight => "flights",
            ResourceKind::CarRental => "rentals",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flight" => Ok(ResourceKind::Flight),
            "car_rental" => Ok(ResourceKind::CarRental),
            other => Err(format!("unknown resource kind: {other}")),
        }
    }
}
