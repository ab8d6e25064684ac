//! Trip orchestrator: fan-out, join, compensate.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use common::{Ref, RefGenerator, ResourceKind};
use confirmation_store::{
    ConfirmationStore, ConfirmationStoreExt, Version, WritePrecondition, WriteResult,
};
use resources::{BookingRequest, Confirmation, ResourceBookingClient, ResourceError};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::OrchestratorConfig;
use crate::error::{Result, TripError};
use crate::report::{BookingFailureReport, LegFailure, LegRef};
use crate::request::TripRequest;
use crate::state::TripConfirmation;

/// Table holding persisted trips.
pub const TRIPS_TABLE: &str = "trips";

/// Table mapping idempotency keys to the trip they booked.
pub const IDEMPOTENCY_TABLE: &str = "trip_idempotency";

const CLAIM_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// A successfully booked trip.
#[derive(Debug, Clone, PartialEq)]
pub struct BookedTrip {
    pub trip: TripConfirmation,
    /// True if the trip was booked by an earlier call with the same key.
    pub replayed: bool,
}

/// Record stored under an idempotency key.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IdempotencyClaim {
    trip_ref: Ref,
    legs: Vec<BookingRequest>,
}

enum Claim {
    /// The key is ours under a short lease at `version`.
    Fresh { trip_ref: Ref, version: Version },
    Replay(TripConfirmation),
}

/// How one leg's booking attempt ended.
#[derive(Debug)]
enum LegResult {
    Booked(Confirmation),
    /// The service answered with an error.
    Failed(ResourceError),
    /// Cut short by cancellation, timeout or panic while the call was in
    /// flight; the booking may have landed.
    Abandoned { code: &'static str, reason: String },
    /// Never dispatched.
    Skipped { code: &'static str, reason: String },
}

impl LegResult {
    fn may_have_landed(&self) -> bool {
        match self {
            LegResult::Booked(_) | LegResult::Abandoned { .. } => true,
            LegResult::Failed(e) => e.is_retryable(),
            LegResult::Skipped { .. } => false,
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            LegResult::Booked(_) => true,
            LegResult::Failed(e) => e.is_retryable(),
            LegResult::Abandoned { .. } | LegResult::Skipped { .. } => true,
        }
    }

    fn failure(&self, kind: ResourceKind, booking_ref: &Ref) -> Option<LegFailure> {
        match self {
            LegResult::Booked(_) => None,
            LegResult::Failed(e) => Some(LegFailure::from_error(kind, booking_ref.clone(), e)),
            LegResult::Abandoned { code, reason } | LegResult::Skipped { code, reason } => Some(
                LegFailure::new(kind, booking_ref.clone(), *code, reason.clone()),
            ),
        }
    }
}

struct LegOutcome {
    kind: ResourceKind,
    booking_ref: Ref,
    result: LegResult,
}

/// A leg that must be cancelled.
struct CompensationTarget {
    kind: ResourceKind,
    booking_ref: Ref,
    /// True if the service confirmed the booking.
    confirmed: bool,
}

/// Books trips across registered resource clients.
///
/// The store holds trip records and idempotency claims; each leg's own
/// confirmation lives with its resource service.
pub struct TripOrchestrator<S> {
    store: S,
    refs: Arc<dyn RefGenerator>,
    clients: HashMap<ResourceKind, Arc<dyn ResourceBookingClient>>,
    config: OrchestratorConfig,
}

impl<S: ConfirmationStore> TripOrchestrator<S> {
    /// Creates an orchestrator with no clients registered.
    pub fn new(store: S, refs: Arc<dyn RefGenerator>, config: OrchestratorConfig) -> Self {
        Self {
            store,
            refs,
            clients: HashMap::new(),
            config,
        }
    }

    /// Registers the client serving its resource kind, replacing any previous one.
    pub fn with_client(mut self, client: Arc<dyn ResourceBookingClient>) -> Self {
        self.clients.insert(client.kind(), client);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Returns the kinds that can be booked, in order.
    pub fn kinds(&self) -> Vec<ResourceKind> {
        let mut kinds: Vec<_> = self.clients.keys().copied().collect();
        kinds.sort();
        kinds
    }

    fn client(&self, kind: ResourceKind) -> Result<Arc<dyn ResourceBookingClient>> {
        self.clients
            .get(&kind)
            .cloned()
            .ok_or_else(|| TripError::InvalidRequest(format!("invalid trip: {kind} is not bookable")))
    }

    /// Books every leg of `request` or none of them.
    ///
    /// With an idempotency key, repeating the call returns the trip booked by
    /// the first call instead of booking again.
    #[tracing::instrument(
        skip(self, request),
        fields(legs = request.legs.len(), trip_ref = tracing::field::Empty)
    )]
    pub async fn book_trip(&self, request: TripRequest) -> Result<BookedTrip> {
        metrics::counter!("trip_bookings_total").increment(1);
        let started = std::time::Instant::now();

        request.validate()?;
        for leg in &request.legs {
            self.client(leg.kind())?;
        }

        let mut lease = None;
        let trip_ref = match &request.idempotency_key {
            Some(key) => match self.claim(key, &request).await? {
                Claim::Fresh { trip_ref, version } => {
                    lease = Some((key.as_str(), version));
                    trip_ref
                }
                Claim::Replay(trip) => {
                    metrics::counter!("trip_idempotent_replays_total").increment(1);
                    tracing::info!(trip_ref = %trip.trip_ref, "idempotent replay");
                    return Ok(BookedTrip {
                        trip,
                        replayed: true,
                    });
                }
            },
            None => self.refs.next_ref(),
        };
        tracing::Span::current().record("trip_ref", tracing::field::display(&trip_ref));

        let result = self.run_booking(&trip_ref, &request).await;

        match (&result, lease) {
            (Ok(_), Some((key, version))) => {
                self.keep_claim(key, &trip_ref, &request, version).await;
            }
            (Err(_), Some((key, _))) => self.release_claim(key).await,
            _ => {}
        }
        if result.is_err() {
            metrics::counter!("trip_booking_failed_total").increment(1);
        } else {
            metrics::counter!("trip_booked_total").increment(1);
        }
        metrics::histogram!("trip_booking_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        result.map(|trip| BookedTrip {
            trip,
            replayed: false,
        })
    }

    /// Loads a trip and refreshes every leg from its service.
    ///
    /// Reading a leg is what triggers its validation. If any leg cannot be
    /// read the trip is returned inside `TripError::PartialReadFailure`.
    #[tracing::instrument(skip(self))]
    pub async fn get_booking(&self, trip_ref: &Ref) -> Result<TripConfirmation> {
        metrics::counter!("trip_reads_total").increment(1);

        let mut trip = self
            .store
            .get_json::<TripConfirmation>(TRIPS_TABLE, trip_ref.as_str())
            .await?
            .ok_or_else(|| TripError::NotFound(trip_ref.clone()))?
            .value;

        let mut readers = JoinSet::new();
        let mut reading = HashMap::new();
        let mut failures = Vec::new();
        for (kind, leg) in &trip.legs {
            let (kind, booking_ref) = (*kind, leg.booking_ref.clone());
            let Some(client) = self.clients.get(&kind).cloned() else {
                failures.push(LegFailure::new(
                    kind,
                    booking_ref,
                    "unavailable",
                    format!("no client registered for {kind}"),
                ));
                continue;
            };
            let timeout = self.config.call_timeout;
            let target = booking_ref.clone();
            let handle = readers.spawn(
                async move {
                    match tokio::time::timeout(timeout, client.get(&target)).await {
                        Ok(result) => result,
                        Err(_) => Err(ResourceError::Unavailable(format!(
                            "read timed out after {timeout:?}"
                        ))),
                    }
                }
                .in_current_span(),
            );
            reading.insert(handle.id(), (kind, booking_ref));
        }

        while let Some(joined) = readers.join_next_with_id().await {
            let (id, result) = match joined {
                Ok((id, result)) => (id, result),
                Err(e) => (
                    e.id(),
                    Err(ResourceError::Unavailable(format!("leg reader failed: {e}"))),
                ),
            };
            let Some((kind, booking_ref)) = reading.remove(&id) else {
                continue;
            };
            match result {
                Ok(confirmation) => {
                    trip.legs.insert(kind, confirmation);
                }
                Err(e) => {
                    tracing::warn!(%kind, %booking_ref, error = %e, "leg read failed");
                    failures.push(LegFailure::from_error(kind, booking_ref, &e));
                }
            }
        }

        if failures.is_empty() {
            Ok(trip)
        } else {
            metrics::counter!("trip_partial_reads_total").increment(1);
            failures.sort_by_key(|f| f.kind);
            Err(TripError::PartialReadFailure {
                trip: Box::new(trip),
                failures,
            })
        }
    }

    /// Reads one leg through its service, e.g. to inspect a compensated leg.
    #[tracing::instrument(skip(self))]
    pub async fn get_leg(&self, kind: ResourceKind, booking_ref: &Ref) -> Result<Confirmation> {
        let client = self.client(kind)?;
        match tokio::time::timeout(self.config.call_timeout, client.get(booking_ref)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(TripError::Unavailable(format!(
                "{kind} read timed out after {:?}",
                self.config.call_timeout
            ))),
        }
    }

    /// How long a fresh claim holds its key before the booking behind it is
    /// presumed dead. Covers the fan-out and its compensation.
    fn claim_lease(&self) -> Duration {
        self.config.trip_timeout + self.config.compensation_timeout
    }

    /// Claims `key` for a new trip, or resolves it to the trip it already booked.
    ///
    /// The claim is written under a short lease; `keep_claim` extends it to
    /// the full idempotency TTL once the trip is persisted.
    async fn claim(&self, key: &str, request: &TripRequest) -> Result<Claim> {
        let deadline = Instant::now() + self.config.trip_timeout;
        loop {
            let trip_ref = self.refs.next_ref();
            let claim = IdempotencyClaim {
                trip_ref: trip_ref.clone(),
                legs: request.legs.clone(),
            };
            let written = self
                .store
                .put_json(
                    IDEMPOTENCY_TABLE,
                    key,
                    &claim,
                    WritePrecondition::DoesNotExist,
                    Some(self.claim_lease()),
                )
                .await?;
            if let WriteResult::Success { version } = written {
                return Ok(Claim::Fresh { trip_ref, version });
            }

            // Someone holds the key; wait for their trip, their release or
            // the end of their lease.
            loop {
                let Some(existing) = self
                    .store
                    .get_json::<IdempotencyClaim>(IDEMPOTENCY_TABLE, key)
                    .await?
                else {
                    break;
                };
                if existing.value.legs != request.legs {
                    return Err(TripError::IdempotencyConflict(format!(
                        "idempotency key {key} was used for a different trip"
                    )));
                }
                if let Some(trip) = self
                    .store
                    .get_json::<TripConfirmation>(TRIPS_TABLE, existing.value.trip_ref.as_str())
                    .await?
                {
                    return Ok(Claim::Replay(trip.value));
                }
                if Instant::now() >= deadline {
                    return Err(TripError::Unavailable(format!(
                        "a booking for idempotency key {key} is still in progress"
                    )));
                }
                tokio::time::sleep(CLAIM_POLL_INTERVAL).await;
            }
        }
    }

    /// Extends a claim whose trip is persisted to the full idempotency TTL.
    async fn keep_claim(
        &self,
        key: &str,
        trip_ref: &Ref,
        request: &TripRequest,
        version: Version,
    ) {
        let claim = IdempotencyClaim {
            trip_ref: trip_ref.clone(),
            legs: request.legs.clone(),
        };
        let written = self
            .store
            .put_json(
                IDEMPOTENCY_TABLE,
                key,
                &claim,
                WritePrecondition::MatchesVersion(version),
                Some(self.config.idempotency_ttl),
            )
            .await;
        match written {
            Ok(WriteResult::Success { .. }) => {}
            Ok(WriteResult::PreconditionFailed { .. }) => {
                tracing::warn!(key, %trip_ref, "idempotency lease lapsed before the trip was booked");
            }
            Err(e) => {
                tracing::warn!(key, %trip_ref, error = %e, "failed to extend idempotency key");
            }
        }
    }

    async fn release_claim(&self, key: &str) {
        if let Err(e) = self.store.delete(IDEMPOTENCY_TABLE, key).await {
            tracing::warn!(key, error = %e, "failed to release idempotency key");
        }
    }

    async fn run_booking(&self, trip_ref: &Ref, request: &TripRequest) -> Result<TripConfirmation> {
        let mut legs = Vec::with_capacity(request.legs.len());
        for leg in &request.legs {
            legs.push((self.client(leg.kind())?, self.refs.next_ref(), leg.clone()));
        }

        let outcomes = self.dispatch(legs).await;

        if outcomes
            .iter()
            .all(|o| matches!(o.result, LegResult::Booked(_)))
        {
            let legs: BTreeMap<_, _> = outcomes
                .into_iter()
                .filter_map(|o| match o.result {
                    LegResult::Booked(c) => Some((o.kind, c)),
                    _ => None,
                })
                .collect();
            return self.persist(trip_ref, legs, request).await;
        }

        let cause = outcomes
            .iter()
            .find_map(|o| match &o.result {
                LegResult::Failed(e) => Some(format!("{} booking failed: {e}", o.kind)),
                _ => None,
            })
            .or_else(|| {
                outcomes.iter().find_map(|o| match &o.result {
                    LegResult::Abandoned { reason, .. } | LegResult::Skipped { reason, .. } => {
                        Some(format!("{} booking {reason}", o.kind))
                    }
                    _ => None,
                })
            })
            .unwrap_or_else(|| "booking failed".to_string());
        tracing::warn!(cause = %cause, "trip booking failed, compensating");

        let mut report = BookingFailureReport::new(trip_ref.clone(), cause.clone());
        report.failed = outcomes
            .iter()
            .filter_map(|o| o.result.failure(o.kind, &o.booking_ref))
            .collect();
        let retryable = outcomes.iter().all(|o| o.result.is_retryable());

        let targets = outcomes
            .iter()
            .filter(|o| o.result.may_have_landed())
            .map(|o| CompensationTarget {
                kind: o.kind,
                booking_ref: o.booking_ref.clone(),
                confirmed: matches!(o.result, LegResult::Booked(_)),
            })
            .collect();
        self.compensate(targets, &mut report).await;

        Err(self.failure(report, retryable))
    }

    /// Books every leg concurrently and waits for all of them.
    ///
    /// The first failure cancels the legs still in flight.
    async fn dispatch(
        &self,
        legs: Vec<(Arc<dyn ResourceBookingClient>, Ref, BookingRequest)>,
    ) -> Vec<LegOutcome> {
        let token = CancellationToken::new();
        let deadline = Instant::now() + self.config.trip_timeout;
        let limiter = self
            .config
            .max_concurrent_legs
            .map(|n| Arc::new(Semaphore::new(n.max(1))));

        let mut workers = JoinSet::new();
        let mut in_flight = HashMap::new();
        for (client, booking_ref, request) in legs {
            let kind = client.kind();
            let span = tracing::info_span!("book_leg", %kind, %booking_ref);
            let worker = book_leg(
                client,
                booking_ref.clone(),
                request,
                token.child_token(),
                limiter.clone(),
                self.config.call_timeout,
                deadline,
            );
            let handle = workers.spawn(worker.instrument(span));
            in_flight.insert(handle.id(), (kind, booking_ref));
        }

        let mut outcomes = Vec::with_capacity(in_flight.len());
        while let Some(joined) = workers.join_next_with_id().await {
            let (id, result) = match joined {
                Ok((id, result)) => (id, result),
                Err(e) => (
                    e.id(),
                    LegResult::Abandoned {
                        code: "panicked",
                        reason: format!("worker panicked: {e}"),
                    },
                ),
            };
            let Some((kind, booking_ref)) = in_flight.remove(&id) else {
                continue;
            };

            match &result {
                LegResult::Booked(_) => tracing::info!(%kind, %booking_ref, "leg booked"),
                LegResult::Failed(e) => {
                    tracing::warn!(%kind, %booking_ref, error = %e, "leg booking failed");
                    token.cancel();
                }
                LegResult::Abandoned { reason, .. } | LegResult::Skipped { reason, .. } => {
                    tracing::warn!(%kind, %booking_ref, reason = %reason, "leg abandoned");
                    token.cancel();
                }
            }
            outcomes.push(LegOutcome {
                kind,
                booking_ref,
                result,
            });
        }
        outcomes.sort_by_key(|o| o.kind);
        outcomes
    }

    async fn persist(
        &self,
        trip_ref: &Ref,
        legs: BTreeMap<ResourceKind, Confirmation>,
        request: &TripRequest,
    ) -> Result<TripConfirmation> {
        let trip = TripConfirmation::booked(trip_ref.clone(), legs, request.idempotency_key.clone());
        let written = self
            .store
            .put_json(
                TRIPS_TABLE,
                trip_ref.as_str(),
                &trip,
                WritePrecondition::DoesNotExist,
                None,
            )
            .await;

        let cause = match written {
            Ok(WriteResult::Success { .. }) => {
                tracing::info!("trip booked");
                return Ok(trip);
            }
            Ok(WriteResult::PreconditionFailed { .. }) => {
                format!("trip reference {trip_ref} already in use")
            }
            Err(e) => format!("failed to persist trip: {e}"),
        };
        tracing::error!(cause = %cause, "trip record not written, compensating every leg");

        let mut report = BookingFailureReport::new(trip_ref.clone(), cause);
        let targets = trip
            .legs
            .iter()
            .map(|(kind, c)| CompensationTarget {
                kind: *kind,
                booking_ref: c.booking_ref.clone(),
                confirmed: true,
            })
            .collect();
        self.compensate(targets, &mut report).await;

        if report.compensation_failed.is_empty() {
            Err(TripError::Unavailable(report.cause))
        } else {
            Err(self.failure(report, false))
        }
    }

    /// Cancels every target concurrently, recording each outcome in `report`.
    ///
    /// All cancellations are attempted regardless of individual failures.
    async fn compensate(&self, targets: Vec<CompensationTarget>, report: &mut BookingFailureReport) {
        let mut cancels = JoinSet::new();
        let mut cancelling = HashMap::new();
        for target in targets {
            let Some(client) = self.clients.get(&target.kind).cloned() else {
                report.compensation_failed.push(LegFailure::new(
                    target.kind,
                    target.booking_ref,
                    "unavailable",
                    "no client registered",
                ));
                continue;
            };
            let timeout = self.config.compensation_timeout;
            let span = tracing::info_span!(
                "compensate_leg",
                kind = %target.kind,
                booking_ref = %target.booking_ref
            );
            let booking_ref = target.booking_ref.clone();
            let handle = cancels.spawn(
                async move {
                    metrics::counter!("trip_compensations_total").increment(1);
                    match tokio::time::timeout(timeout, client.cancel(&booking_ref)).await {
                        Ok(result) => result,
                        Err(_) => Err(ResourceError::Unavailable(format!(
                            "cancel timed out after {timeout:?}"
                        ))),
                    }
                }
                .instrument(span),
            );
            cancelling.insert(handle.id(), target);
        }

        while let Some(joined) = cancels.join_next_with_id().await {
            let (id, result) = match joined {
                Ok((id, result)) => (id, result),
                Err(e) => (
                    e.id(),
                    Err(ResourceError::Unavailable(format!(
                        "compensation worker failed: {e}"
                    ))),
                ),
            };
            let Some(target) = cancelling.remove(&id) else {
                continue;
            };
            let leg = LegRef {
                kind: target.kind,
                booking_ref: target.booking_ref,
            };
            match result {
                Ok(()) => {
                    tracing::info!(kind = %leg.kind, booking_ref = %leg.booking_ref, "leg compensated");
                    report.compensated.push(leg);
                }
                Err(ResourceError::NotFound(_)) if !target.confirmed => {
                    tracing::debug!(kind = %leg.kind, booking_ref = %leg.booking_ref, "abandoned leg never landed");
                }
                Err(e) => {
                    metrics::counter!("trip_compensation_failed_total").increment(1);
                    tracing::error!(
                        kind = %leg.kind,
                        booking_ref = %leg.booking_ref,
                        error = %e,
                        "compensation failed; manual intervention required"
                    );
                    report
                        .compensation_failed
                        .push(LegFailure::from_error(leg.kind, leg.booking_ref, &e));
                }
            }
        }

        report.compensated.sort_by_key(|l| l.kind);
        report.compensation_failed.sort_by_key(|f| f.kind);
        report.manual_intervention_required = !report.compensation_failed.is_empty();
    }

    fn failure(&self, report: BookingFailureReport, retryable: bool) -> TripError {
        if report.manual_intervention_required {
            TripError::CompensationFailed(Box::new(report))
        } else if retryable && report.nothing_landed() {
            TripError::Unavailable(report.cause)
        } else {
            TripError::PartialBookingFailure(Box::new(report))
        }
    }
}

/// Books one leg, racing the call against cancellation and the deadlines.
async fn book_leg(
    client: Arc<dyn ResourceBookingClient>,
    booking_ref: Ref,
    request: BookingRequest,
    token: CancellationToken,
    limiter: Option<Arc<Semaphore>>,
    call_timeout: Duration,
    trip_deadline: Instant,
) -> LegResult {
    let _permit = match limiter {
        Some(limiter) => tokio::select! {
            biased;
            _ = token.cancelled() => {
                return LegResult::Skipped {
                    code: "cancelled",
                    reason: "cancelled before dispatch".into(),
                };
            }
            _ = tokio::time::sleep_until(trip_deadline) => {
                return LegResult::Skipped {
                    code: "timeout",
                    reason: "trip deadline passed before dispatch".into(),
                };
            }
            permit = limiter.acquire_owned() => match permit {
                Ok(permit) => Some(permit),
                Err(_) => {
                    return LegResult::Skipped {
                        code: "cancelled",
                        reason: "dispatch limiter closed".into(),
                    };
                }
            },
        },
        None => None,
    };

    if token.is_cancelled() {
        return LegResult::Skipped {
            code: "cancelled",
            reason: "cancelled before dispatch".into(),
        };
    }

    let call_deadline = trip_deadline.min(Instant::now() + call_timeout);
    tokio::select! {
        biased;
        _ = token.cancelled() => LegResult::Abandoned {
            code: "cancelled",
            reason: "cancelled after a sibling leg failed".into(),
        },
        result = tokio::time::timeout_at(call_deadline, client.book(&booking_ref, &request)) => {
            match result {
                Ok(Ok(confirmation)) => LegResult::Booked(confirmation),
                Ok(Err(e)) => LegResult::Failed(e),
                Err(_) => LegResult::Abandoned {
                    code: "timeout",
                    reason: "timed out waiting for the booking service".into(),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::SequentialRefGenerator;
    use confirmation_store::InMemoryConfirmationStore;
    use resources::{
        BookingStatus, CarRentalRequest, FaultInjectingClient, FixedValidator, FlightRequest,
        StoreBackedClient,
    };

    type Client = FaultInjectingClient<StoreBackedClient<InMemoryConfirmationStore>>;

    struct Harness {
        orchestrator: TripOrchestrator<InMemoryConfirmationStore>,
        store: InMemoryConfirmationStore,
        flights: Client,
        cars: Client,
    }

    fn harness() -> Harness {
        let store = InMemoryConfirmationStore::new();
        let validator = Arc::new(FixedValidator::validated());
        let flights = FaultInjectingClient::new(StoreBackedClient::new(
            ResourceKind::Flight,
            store.clone(),
            validator.clone(),
        ));
        let cars = FaultInjectingClient::new(StoreBackedClient::new(
            ResourceKind::CarRental,
            store.clone(),
            validator,
        ));
        let orchestrator = TripOrchestrator::new(
            store.clone(),
            Arc::new(SequentialRefGenerator::with_prefix("T")),
            OrchestratorConfig::default(),
        )
        .with_client(Arc::new(flights.clone()))
        .with_client(Arc::new(cars.clone()));
        Harness {
            orchestrator,
            store,
            flights,
            cars,
        }
    }

    fn trip() -> TripRequest {
        let flight = FlightRequest::new("Delta", "DL100", Utc::now(), vec!["Ada".into()]);
        let car = CarRentalRequest {
            agent: "Hertz".into(),
            pick_up: Some(Utc::now()),
            pick_up_location: "SFO".into(),
            drop_off: Some(Utc::now() + chrono::Duration::days(3)),
            drop_off_location: "SFO".into(),
            name: "Ada".into(),
            vehicle_class: "compact".into(),
        };
        TripRequest::new(vec![flight.into(), car.into()])
    }

    #[tokio::test]
    async fn books_every_leg() {
        let h = harness();
        let booked = h.orchestrator.book_trip(trip()).await.unwrap();

        assert!(!booked.replayed);
        assert_eq!(booked.trip.status, crate::TripStatus::Booked);
        assert_eq!(booked.trip.legs.len(), 2);
        assert_eq!(h.store.record_count(TRIPS_TABLE).await, 1);
        assert_eq!(h.store.record_count("flights").await, 1);
        assert_eq!(h.store.record_count("rentals").await, 1);
    }

    #[tokio::test]
    async fn trip_and_leg_refs_are_distinct() {
        let h = harness();
        let trip = h.orchestrator.book_trip(trip()).await.unwrap().trip;
        let flight = &trip.legs[&ResourceKind::Flight].booking_ref;
        let car = &trip.legs[&ResourceKind::CarRental].booking_ref;
        assert_ne!(flight, car);
        assert_ne!(flight, &trip.trip_ref);
    }

    #[tokio::test]
    async fn unregistered_kind_is_invalid() {
        let store = InMemoryConfirmationStore::new();
        let orchestrator = TripOrchestrator::new(
            store.clone(),
            Arc::new(SequentialRefGenerator::default()),
            OrchestratorConfig::default(),
        );
        let err = orchestrator.book_trip(trip()).await.unwrap_err();
        assert!(matches!(err, TripError::InvalidRequest(_)));
        assert_eq!(store.record_count(TRIPS_TABLE).await, 0);
    }

    #[tokio::test]
    async fn failed_leg_compensates_sibling() {
        let h = harness();
        h.cars
            .set_fail_on_book(Some(ResourceError::AlreadyExists(Ref::new("x"))))
            .await;

        let err = h.orchestrator.book_trip(trip()).await.unwrap_err();
        let TripError::PartialBookingFailure(report) = err else {
            panic!("expected PartialBookingFailure, got {err:?}");
        };
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].kind, ResourceKind::CarRental);
        assert_eq!(report.compensated.len(), 1);
        assert_eq!(report.compensated[0].kind, ResourceKind::Flight);
        assert!(!report.manual_intervention_required);

        let flight = h
            .orchestrator
            .get_leg(ResourceKind::Flight, &report.compensated[0].booking_ref)
            .await
            .unwrap();
        assert_eq!(flight.status, BookingStatus::Cancelled);
        assert_eq!(h.store.record_count(TRIPS_TABLE).await, 0);
    }

    #[tokio::test]
    async fn lost_response_is_compensated() {
        let h = harness();
        h.cars.set_fail_after_book(true).await;
        h.flights
            .set_fail_on_book(Some(ResourceError::AlreadyExists(Ref::new("x"))))
            .await;

        let err = h.orchestrator.book_trip(trip()).await.unwrap_err();
        let TripError::PartialBookingFailure(report) = err else {
            panic!("expected PartialBookingFailure, got {err:?}");
        };
        assert!(report
            .compensated
            .iter()
            .any(|l| l.kind == ResourceKind::CarRental));
    }

    #[tokio::test]
    async fn transient_failure_with_nothing_landed_is_unavailable() {
        let h = harness();
        h.flights
            .set_fail_on_book(Some(ResourceError::Unavailable("down".into())))
            .await;
        h.cars
            .set_fail_on_book(Some(ResourceError::Unavailable("down".into())))
            .await;

        let err = h.orchestrator.book_trip(trip()).await.unwrap_err();
        assert!(err.is_retryable(), "got {err:?}");
    }

    #[tokio::test]
    async fn get_booking_refreshes_legs() {
        let h = harness();
        let booked = h.orchestrator.book_trip(trip()).await.unwrap().trip;

        let read = h.orchestrator.get_booking(&booked.trip_ref).await.unwrap();
        assert!(read.is_fully_validated());
        assert_eq!(read.trip_ref, booked.trip_ref);
    }

    #[tokio::test]
    async fn get_booking_unknown_ref_is_not_found() {
        let h = harness();
        let err = h
            .orchestrator
            .get_booking(&Ref::new("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, TripError::NotFound(_)));
    }

    #[tokio::test]
    async fn degraded_read_keeps_trip() {
        let h = harness();
        let booked = h.orchestrator.book_trip(trip()).await.unwrap().trip;
        h.cars
            .set_fail_on_get(Some(ResourceError::Unavailable("down".into())))
            .await;

        let err = h
            .orchestrator
            .get_booking(&booked.trip_ref)
            .await
            .unwrap_err();
        let TripError::PartialReadFailure { trip, failures } = err else {
            panic!("expected PartialReadFailure, got {err:?}");
        };
        assert_eq!(trip.trip_ref, booked.trip_ref);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, ResourceKind::CarRental);
        assert!(trip.legs[&ResourceKind::Flight].validation_state.is_terminal());
    }
}
