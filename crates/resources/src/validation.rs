//! Validation Engine: lazily confirms bookings with the downstream system.
//!
//! A booking is recorded as `Pending`; the first read hands it to a
//! `ValidationEngine`, whose outcome becomes the terminal state. Engines are
//! injected so latency and outcome can be made deterministic in tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::confirmation::Confirmation;
use crate::error::{ResourceError, Result};
use crate::requests::BookingRequest;

/// Result of a downstream validation check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Validated,
    /// Business-rule rejection discovered late, with a reason.
    Rejected(String),
}

/// Confirms a booking with the downstream system.
///
/// Returning an error leaves the booking `Pending`; the next read retries.
#[async_trait]
pub trait ValidationEngine: Send + Sync {
    async fn validate(&self, confirmation: &Confirmation) -> Result<ValidationOutcome>;
}

/// Latency window and rejection rate of the simulated downstream system.
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    pub min_latency: Duration,
    pub max_latency: Duration,
    /// Probability in `[0, 1]` that a booking is rejected.
    pub failure_rate: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_latency: Duration::from_millis(500),
            max_latency: Duration::from_millis(1500),
            failure_rate: 0.0,
        }
    }
}

/// Validation engine that models a slow, occasionally-rejecting downstream
/// confirmation system.
#[derive(Debug, Clone, Default)]
pub struct SimulatedValidator {
    config: ValidationConfig,
}

impl SimulatedValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    fn sample(&self) -> (Duration, bool) {
        let mut rng = rand::thread_rng();
        let min = self.config.min_latency;
        let max = self.config.max_latency.max(min);
        let delay = if max > min {
            rng.gen_range(min..=max)
        } else {
            min
        };
        let rate = if self.config.failure_rate.is_finite() {
            self.config.failure_rate.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let reject = rng.gen_bool(rate);
        (delay, reject)
    }
}

#[async_trait]
impl ValidationEngine for SimulatedValidator {
    async fn validate(&self, confirmation: &Confirmation) -> Result<ValidationOutcome> {
        let (delay, reject) = self.sample();
        tokio::time::sleep(delay).await;

        if reject {
            tracing::warn!(
                booking_ref = %confirmation.booking_ref,
                kind = %confirmation.kind(),
                "downstream rejected reservation"
            );
            return Ok(ValidationOutcome::Rejected(
                "inventory no longer available".to_string(),
            ));
        }

        match &confirmation.request {
            BookingRequest::Flight(f) => tracing::info!(
                booking_ref = %confirmation.booking_ref,
                airline = %f.airline,
                flight = %f.flight_number,
                passengers = ?f.passengers,
                "validated flight reservation"
            ),
            BookingRequest::CarRental(c) => tracing::info!(
                booking_ref = %confirmation.booking_ref,
                agent = %c.agent,
                pick_up = ?c.pick_up,
                pick_up_location = %c.pick_up_location,
                drop_off = ?c.drop_off,
                drop_off_location = %c.drop_off_location,
                name = %c.name,
                vehicle_class = %c.vehicle_class,
                "validated car reservation"
            ),
        }
        Ok(ValidationOutcome::Validated)
    }
}

#[derive(Debug, Clone)]
enum FixedBehavior {
    Outcome(ValidationOutcome),
    Error(String),
}

/// Deterministic validation engine for tests.
#[derive(Debug, Clone)]
pub struct FixedValidator {
    behavior: FixedBehavior,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl FixedValidator {
    /// Validates every booking immediately.
    pub fn validated() -> Self {
        Self::with_behavior(FixedBehavior::Outcome(ValidationOutcome::Validated))
    }

    /// Rejects every booking with `reason`.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::with_behavior(FixedBehavior::Outcome(ValidationOutcome::Rejected(
            reason.into(),
        )))
    }

    /// Fails every validation attempt, leaving bookings pending.
    pub fn erroring(message: impl Into<String>) -> Self {
        Self::with_behavior(FixedBehavior::Error(message.into()))
    }

    fn with_behavior(behavior: FixedBehavior) -> Self {
        Self {
            behavior,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Adds a fixed latency to every validation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Returns how many times the engine has been invoked.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ValidationEngine for FixedValidator {
    async fn validate(&self, _confirmation: &Confirmation) -> Result<ValidationOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.behavior {
            FixedBehavior::Outcome(outcome) => Ok(outcome.clone()),
            FixedBehavior::Error(msg) => Err(ResourceError::Unavailable(msg.clone())),
        }
    }
}
