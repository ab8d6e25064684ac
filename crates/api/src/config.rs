//! Application configuration loaded from environment variables.

use std::time::Duration;

use common::ResourceKind;
use resources::ValidationConfig;
use trip::OrchestratorConfig;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `8000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` — `text` or `json` (default: `text`)
/// - `FLIGHT_SERVICE_URL`, `CAR_SERVICE_URL` — remote resource services;
///   unset means the resource is served in-process
/// - `DATABASE_URL` — PostgreSQL confirmation store; unset means in-memory
/// - `BOOKING_CALL_TIMEOUT_MS` (5000), `COMPENSATION_TIMEOUT_MS` (5000),
///   `TRIP_TIMEOUT_MS` (15000), `IDEMPOTENCY_KEY_TTL_SECS` (86400),
///   `MAX_CONCURRENT_LEGS` (unset)
/// - `VALIDATION_MIN_LATENCY_MS` (500), `VALIDATION_MAX_LATENCY_MS` (1500),
///   `VALIDATION_FAILURE_RATE` (0.0)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub flight_service_url: Option<String>,
    pub car_service_url: Option<String>,
    pub database_url: Option<String>,
    pub booking_call_timeout: Duration,
    pub compensation_timeout: Duration,
    pub trip_timeout: Duration,
    pub idempotency_ttl: Duration,
    pub max_concurrent_legs: Option<usize>,
    pub validation_min_latency: Duration,
    pub validation_max_latency: Duration,
    pub validation_failure_rate: f64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    ///
    /// Unparseable values fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let parsed = |key: &str| non_empty(key).and_then(|v| v.trim().parse::<u64>().ok());
        let millis = |key: &str, default: Duration| {
            parsed(key).map(Duration::from_millis).unwrap_or(default)
        };

        Self {
            host: non_empty("HOST").unwrap_or(defaults.host),
            port: non_empty("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: non_empty("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match non_empty("LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            flight_service_url: non_empty("FLIGHT_SERVICE_URL"),
            car_service_url: non_empty("CAR_SERVICE_URL"),
            database_url: non_empty("DATABASE_URL"),
            booking_call_timeout: millis("BOOKING_CALL_TIMEOUT_MS", defaults.booking_call_timeout),
            compensation_timeout: millis("COMPENSATION_TIMEOUT_MS", defaults.compensation_timeout),
            trip_timeout: millis("TRIP_TIMEOUT_MS", defaults.trip_timeout),
            idempotency_ttl: parsed("IDEMPOTENCY_KEY_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.idempotency_ttl),
            max_concurrent_legs: parsed("MAX_CONCURRENT_LEGS")
                .and_then(|n| usize::try_from(n).ok())
                .filter(|n| *n > 0),
            validation_min_latency: millis(
                "VALIDATION_MIN_LATENCY_MS",
                defaults.validation_min_latency,
            ),
            validation_max_latency: millis(
                "VALIDATION_MAX_LATENCY_MS",
                defaults.validation_max_latency,
            ),
            validation_failure_rate: non_empty("VALIDATION_FAILURE_RATE")
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|r| r.is_finite() && (0.0..=1.0).contains(r))
                .unwrap_or(defaults.validation_failure_rate),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the remote endpoint serving `kind`, if it is not in-process.
    pub fn service_url(&self, kind: ResourceKind) -> Option<&str> {
        match kind {
            ResourceKind::Flight => self.flight_service_url.as_deref(),
            ResourceKind::CarRental => self.car_service_url.as_deref(),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            call_timeout: self.booking_call_timeout,
            compensation_timeout: self.compensation_timeout,
            trip_timeout: self.trip_timeout,
            idempotency_ttl: self.idempotency_ttl,
            max_concurrent_legs: self.max_concurrent_legs,
        }
    }

    pub fn validation_config(&self) -> ValidationConfig {
        ValidationConfig {
            min_latency: self.validation_min_latency,
            max_latency: self.validation_max_latency,
            failure_rate: self.validation_failure_rate,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let orchestrator = OrchestratorConfig::default();
        let validation = ValidationConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            flight_service_url: None,
            car_service_url: None,
            database_url: None,
            booking_call_timeout: orchestrator.call_timeout,
            compensation_timeout: orchestrator.compensation_timeout,
            trip_timeout: orchestrator.trip_timeout,
            idempotency_ttl: orchestrator.idempotency_ttl,
            max_concurrent_legs: orchestrator.max_concurrent_legs,
            validation_min_latency: validation.min_latency,
            validation_max_latency: validation.max_latency,
            validation_failure_rate: validation.failure_rate,
        }
    }
}
