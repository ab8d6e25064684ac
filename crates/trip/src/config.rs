//! Orchestrator timing and concurrency settings.

use std::time::Duration;

/// Tunables for `TripOrchestrator`.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Bound on each leg `book` and `get` call.
    pub call_timeout: Duration,
    /// Bound on each compensating `cancel` call.
    pub compensation_timeout: Duration,
    /// Deadline for the whole booking fan-out.
    pub trip_timeout: Duration,
    /// How long an idempotency key keeps replaying its booked trip.
    pub idempotency_ttl: Duration,
    /// Cap on legs booked at once. `None` books every leg at once.
    pub max_concurrent_legs: Option<usize>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(5),
            compensation_timeout: Duration::from_secs(5),
            trip_timeout: Duration::from_secs(15),
            idempotency_ttl: Duration::from_secs(24 * 60 * 60),
            max_concurrent_legs: None,
        }
    }
}
