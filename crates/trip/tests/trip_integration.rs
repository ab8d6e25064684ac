//! Integration tests for trip booking across resource services.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{Ref, ResourceKind, SequentialRefGenerator};
use confirmation_store::{ConfirmationStoreExt, InMemoryConfirmationStore, WritePrecondition};
use resources::{
    BookingStatus, CarRentalRequest, FaultInjectingClient, FixedValidator, FlightRequest,
    ResourceError, SimulatedValidator, StoreBackedClient, ValidationConfig, ValidationEngine,
    ValidationState,
};
use trip::{
    IDEMPOTENCY_TABLE, OrchestratorConfig, TRIPS_TABLE, TripError, TripOrchestrator, TripRequest,
};

type Client = FaultInjectingClient<StoreBackedClient<InMemoryConfirmationStore>>;

struct TestHarness {
    orchestrator: TripOrchestrator<InMemoryConfirmationStore>,
    store: InMemoryConfirmationStore,
    flights: Client,
    cars: Client,
}

impl TestHarness {
    fn new() -> Self {
        Self::with(OrchestratorConfig::default(), Arc::new(FixedValidator::validated()))
    }

    fn with(config: OrchestratorConfig, validator: Arc<dyn ValidationEngine>) -> Self {
        let store = InMemoryConfirmationStore::new();
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
            Arc::new(SequentialRefGenerator::with_prefix("TRIP")),
            config,
        )
        .with_client(Arc::new(flights.clone()))
        .with_client(Arc::new(cars.clone()));

        Self {
            orchestrator,
            store,
            flights,
            cars,
        }
    }
}

fn flight() -> FlightRequest {
    FlightRequest::new(
        "Delta",
        "DL100",
        Utc::now(),
        vec!["Ada Lovelace".into(), "Charles Babbage".into()],
    )
}

fn car() -> CarRentalRequest {
    CarRentalRequest {
        agent: "Hertz".into(),
        pick_up: Some(Utc::now()),
        pick_up_location: "SFO".into(),
        drop_off: Some(Utc::now() + chrono::Duration::days(4)),
        drop_off_location: "LAX".into(),
        name: "Ada Lovelace".into(),
        vehicle_class: "compact".into(),
    }
}

fn trip() -> TripRequest {
    TripRequest::new(vec![flight().into(), car().into()])
}

#[tokio::test]
async fn test_missing_vehicle_class_fails_fast() {
    let h = TestHarness::new();
    let request = TripRequest::new(vec![
        flight().into(),
        CarRentalRequest {
            vehicle_class: String::new(),
            ..car()
        }
        .into(),
    ]);

    let err = h.orchestrator.book_trip(request).await.unwrap_err();

    assert!(matches!(&err, TripError::InvalidRequest(msg) if msg == "invalid vehicle class"));
    assert_eq!(h.flights.book_calls().await, 0);
    assert_eq!(h.cars.book_calls().await, 0);
    assert_eq!(h.store.record_count("flights").await, 0);
    assert_eq!(h.store.record_count("rentals").await, 0);
    assert_eq!(h.store.record_count(TRIPS_TABLE).await, 0);
}

#[tokio::test]
async fn test_invalid_request_with_key_claims_nothing() {
    let h = TestHarness::new();
    let request = TripRequest::new(vec![FlightRequest::default().into()])
        .with_idempotency_key("trip-key");

    let err = h.orchestrator.book_trip(request).await.unwrap_err();

    assert!(matches!(err, TripError::InvalidRequest(_)));
    assert_eq!(h.store.record_count(IDEMPOTENCY_TABLE).await, 0);
}

#[tokio::test]
async fn test_car_unavailable_compensates_flight() {
    let h = TestHarness::new();
    h.cars
        .set_fail_on_book(Some(ResourceError::Unavailable("connection refused".into())))
        .await;

    let err = h.orchestrator.book_trip(trip()).await.unwrap_err();
    let TripError::PartialBookingFailure(report) = err else {
        panic!("expected PartialBookingFailure, got {err:?}");
    };

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].kind, ResourceKind::CarRental);
    assert_eq!(report.failed[0].code, "unavailable");
    assert_eq!(report.compensated.len(), 1);
    assert_eq!(report.compensated[0].kind, ResourceKind::Flight);
    assert!(report.compensation_failed.is_empty());
    assert!(!report.manual_intervention_required);

    assert_eq!(h.flights.cancel_calls().await, 1);
    assert_eq!(h.store.record_count(TRIPS_TABLE).await, 0);

    let flight = h
        .orchestrator
        .get_leg(ResourceKind::Flight, &report.compensated[0].booking_ref)
        .await
        .unwrap();
    assert_eq!(flight.status, BookingStatus::Cancelled);
}

#[tokio::test]
async fn test_no_orphan_when_either_leg_fails() {
    for failing in ResourceKind::ALL {
        let h = TestHarness::new();
        let client = match failing {
            ResourceKind::Flight => &h.flights,
            ResourceKind::CarRental => &h.cars,
        };
        client
            .set_fail_on_book(Some(ResourceError::AlreadyExists(Ref::new("taken"))))
            .await;

        let err = h.orchestrator.book_trip(trip()).await.unwrap_err();
        let TripError::PartialBookingFailure(report) = err else {
            panic!("expected PartialBookingFailure, got {err:?}");
        };

        for leg in &report.compensated {
            assert_ne!(leg.kind, failing);
            let c = h.orchestrator.get_leg(leg.kind, &leg.booking_ref).await.unwrap();
            assert!(c.is_cancelled(), "{} leg left active", leg.kind);
        }
    }
}

#[tokio::test]
async fn test_compensation_failure_requires_manual_intervention() {
    let h = TestHarness::new();
    h.cars
        .set_fail_on_book(Some(ResourceError::Unavailable("down".into())))
        .await;
    h.flights
        .set_fail_on_cancel(Some(ResourceError::CompensationFailed {
            booking_ref: Ref::new("ignored"),
            reason: "ticket already issued".into(),
        }))
        .await;

    let err = h.orchestrator.book_trip(trip()).await.unwrap_err();
    let TripError::CompensationFailed(report) = err else {
        panic!("expected CompensationFailed, got {err:?}");
    };

    assert!(report.manual_intervention_required);
    assert!(report.compensated.is_empty());
    assert_eq!(report.compensation_failed.len(), 1);
    assert_eq!(report.compensation_failed[0].kind, ResourceKind::Flight);
    assert_eq!(report.compensation_failed[0].code, "compensation_failed");
}

#[tokio::test]
async fn test_all_compensations_attempted_when_one_fails() {
    let h = TestHarness::new();
    h.flights.set_fail_after_book(true).await;
    h.cars.set_fail_after_book(true).await;
    h.flights
        .set_fail_on_cancel(Some(ResourceError::Unavailable("down".into())))
        .await;

    let err = h.orchestrator.book_trip(trip()).await.unwrap_err();
    let TripError::CompensationFailed(report) = err else {
        panic!("expected CompensationFailed, got {err:?}");
    };

    assert_eq!(h.flights.cancel_calls().await, 1);
    assert_eq!(h.cars.cancel_calls().await, 1);
    assert_eq!(report.compensated.len(), 1);
    assert_eq!(report.compensated[0].kind, ResourceKind::CarRental);
    assert_eq!(report.compensation_failed[0].kind, ResourceKind::Flight);
}

#[tokio::test]
async fn test_sequential_retry_with_same_key_returns_first_trip() {
    let h = TestHarness::new();
    let request = trip().with_idempotency_key("trip-key");

    let first = h.orchestrator.book_trip(request.clone()).await.unwrap();
    let second = h.orchestrator.book_trip(request).await.unwrap();

    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(first.trip, second.trip);
    assert_eq!(h.store.record_count(TRIPS_TABLE).await, 1);
    assert_eq!(h.store.record_count("flights").await, 1);
    assert_eq!(h.flights.book_calls().await, 1);
}

#[tokio::test]
async fn test_concurrent_calls_with_same_key_book_once() {
    let h = TestHarness::new();
    h.flights.set_book_delay(Duration::from_millis(50)).await;
    let request = trip().with_idempotency_key("trip-key");

    let (a, b) = tokio::join!(
        h.orchestrator.book_trip(request.clone()),
        h.orchestrator.book_trip(request)
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.trip.trip_ref, b.trip.trip_ref);
    assert!(a.replayed != b.replayed);
    assert_eq!(h.store.record_count(TRIPS_TABLE).await, 1);
    assert_eq!(h.store.record_count("flights").await, 1);
    assert_eq!(h.store.record_count("rentals").await, 1);
}

#[tokio::test]
async fn test_same_key_different_trip_conflicts() {
    let h = TestHarness::new();
    h.orchestrator
        .book_trip(trip().with_idempotency_key("trip-key"))
        .await
        .unwrap();

    let other = TripRequest::new(vec![flight().into()]).with_idempotency_key("trip-key");
    let err = h.orchestrator.book_trip(other).await.unwrap_err();

    assert!(matches!(err, TripError::IdempotencyConflict(_)));
    assert_eq!(h.store.record_count(TRIPS_TABLE).await, 1);
}

#[tokio::test]
async fn test_failed_booking_releases_key_for_retry() {
    let h = TestHarness::new();
    let request = trip().with_idempotency_key("trip-key");
    h.cars
        .set_fail_on_book(Some(ResourceError::Unavailable("down".into())))
        .await;

    assert!(h.orchestrator.book_trip(request.clone()).await.is_err());
    assert_eq!(h.store.record_count(IDEMPOTENCY_TABLE).await, 0);

    h.cars.set_fail_on_book(None).await;
    let retried = h.orchestrator.book_trip(request).await.unwrap();
    assert!(!retried.replayed);
    assert_eq!(h.store.record_count(TRIPS_TABLE).await, 1);
}

#[tokio::test]
async fn test_reads_validate_each_leg_once() {
    let validator = FixedValidator::validated();
    let h = TestHarness::with(OrchestratorConfig::default(), Arc::new(validator.clone()));
    let booked = h.orchestrator.book_trip(trip()).await.unwrap().trip;
    assert_eq!(validator.call_count(), 0);

    let first = h.orchestrator.get_booking(&booked.trip_ref).await.unwrap();
    let second = h.orchestrator.get_booking(&booked.trip_ref).await.unwrap();
    let third = h.orchestrator.get_booking(&booked.trip_ref).await.unwrap();

    assert_eq!(validator.call_count(), 2);
    assert_eq!(first, second);
    assert_eq!(second, third);
    for leg in first.legs.values() {
        assert_eq!(leg.validation_state, ValidationState::Validated);
    }
}

#[tokio::test(start_paused = true)]
async fn test_read_after_booking_settles_to_stable_state() {
    let validator = SimulatedValidator::new(ValidationConfig {
        min_latency: Duration::from_millis(500),
        max_latency: Duration::from_millis(1500),
        failure_rate: 0.5,
    });
    let h = TestHarness::with(OrchestratorConfig::default(), Arc::new(validator));
    let booked = h.orchestrator.book_trip(trip()).await.unwrap().trip;
    for leg in booked.legs.values() {
        assert_eq!(leg.validation_state, ValidationState::Pending);
    }

    let first = h.orchestrator.get_booking(&booked.trip_ref).await.unwrap();
    let second = h.orchestrator.get_booking(&booked.trip_ref).await.unwrap();

    assert!(first.is_fully_validated());
    for (kind, leg) in &first.legs {
        assert_eq!(leg.validation_state, second.legs[kind].validation_state);
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_leg_times_out_and_sibling_is_compensated() {
    let config = OrchestratorConfig {
        call_timeout: Duration::from_millis(100),
        ..Default::default()
    };
    let h = TestHarness::with(config, Arc::new(FixedValidator::validated()));
    h.flights.set_book_delay(Duration::from_secs(10)).await;

    let err = h.orchestrator.book_trip(trip()).await.unwrap_err();
    let TripError::PartialBookingFailure(report) = err else {
        panic!("expected PartialBookingFailure, got {err:?}");
    };

    assert_eq!(report.failed[0].kind, ResourceKind::Flight);
    assert_eq!(report.failed[0].code, "timeout");
    assert_eq!(report.compensated.len(), 1);
    assert_eq!(report.compensated[0].kind, ResourceKind::CarRental);
    // The abandoned flight never reached the store.
    assert_eq!(h.store.record_count("flights").await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_first_failure_cancels_in_flight_legs() {
    let h = TestHarness::new();
    h.flights.set_book_delay(Duration::from_secs(10)).await;
    h.cars
        .set_fail_on_book(Some(ResourceError::AlreadyExists(Ref::new("taken"))))
        .await;

    let started = tokio::time::Instant::now();
    let err = h.orchestrator.book_trip(trip()).await.unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(1));
    let TripError::PartialBookingFailure(report) = err else {
        panic!("expected PartialBookingFailure, got {err:?}");
    };
    let flight = report
        .failed
        .iter()
        .find(|f| f.kind == ResourceKind::Flight)
        .unwrap();
    assert_eq!(flight.code, "cancelled");
    assert!(report.compensated.is_empty());
    assert_eq!(h.store.record_count("flights").await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_cap_serialises_legs() {
    let delay = Duration::from_millis(100);

    let uncapped = TestHarness::new();
    uncapped.flights.set_book_delay(delay).await;
    uncapped.cars.set_book_delay(delay).await;
    let started = tokio::time::Instant::now();
    uncapped.orchestrator.book_trip(trip()).await.unwrap();
    assert!(started.elapsed() < delay * 2);

    let config = OrchestratorConfig {
        max_concurrent_legs: Some(1),
        ..Default::default()
    };
    let capped = TestHarness::with(config, Arc::new(FixedValidator::validated()));
    capped.flights.set_book_delay(delay).await;
    capped.cars.set_book_delay(delay).await;
    let started = tokio::time::Instant::now();
    capped.orchestrator.book_trip(trip()).await.unwrap();
    assert!(started.elapsed() >= delay * 2);
}

#[tokio::test]
async fn test_degraded_read_reports_failed_leg() {
    let h = TestHarness::new();
    let booked = h.orchestrator.book_trip(trip()).await.unwrap().trip;
    h.flights
        .set_fail_on_get(Some(ResourceError::Unavailable("timeout".into())))
        .await;

    let err = h.orchestrator.get_booking(&booked.trip_ref).await.unwrap_err();
    let TripError::PartialReadFailure { trip, failures } = err else {
        panic!("expected PartialReadFailure, got {err:?}");
    };
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].kind, ResourceKind::Flight);
    assert_eq!(
        trip.legs[&ResourceKind::CarRental].validation_state,
        ValidationState::Validated
    );
    assert_eq!(h.flights.get_calls().await, 1);
    assert_eq!(h.cars.get_calls().await, 1);
}

#[tokio::test]
async fn test_store_outage_before_booking_is_retryable() {
    let h = TestHarness::new();
    h.store.set_unavailable(true);

    let err = h
        .orchestrator
        .book_trip(trip().with_idempotency_key("trip-key"))
        .await
        .unwrap_err();
    assert!(err.is_retryable(), "got {err:?}");
    assert_eq!(h.flights.book_calls().await, 0);
    assert_eq!(h.cars.book_calls().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_compensation_times_out_and_is_reported() {
    let config = OrchestratorConfig {
        compensation_timeout: Duration::from_millis(100),
        ..Default::default()
    };
    let h = TestHarness::with(config, Arc::new(FixedValidator::validated()));
    h.cars
        .set_fail_on_book(Some(ResourceError::Unavailable("down".into())))
        .await;
    h.flights.set_cancel_delay(Duration::from_secs(10)).await;

    let started = tokio::time::Instant::now();
    let err = h.orchestrator.book_trip(trip()).await.unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(1));
    let TripError::CompensationFailed(report) = err else {
        panic!("expected CompensationFailed, got {err:?}");
    };
    assert!(report.manual_intervention_required);
    assert_eq!(report.compensation_failed.len(), 1);
    assert_eq!(report.compensation_failed[0].kind, ResourceKind::Flight);
    assert_eq!(report.compensation_failed[0].code, "unavailable");
    assert_eq!(h.flights.cancel_calls().await, 1);
}

fn short_lease_config() -> OrchestratorConfig {
    OrchestratorConfig {
        trip_timeout: Duration::from_millis(200),
        compensation_timeout: Duration::from_millis(100),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_abandoned_claim_expires_and_retry_books() {
    let h = TestHarness::with(short_lease_config(), Arc::new(FixedValidator::validated()));
    let request = trip().with_idempotency_key("trip-key");

    // A claim left behind by a booking that died before finishing.
    h.store
        .put_json(
            IDEMPOTENCY_TABLE,
            "trip-key",
            &serde_json::json!({ "trip_ref": "DEAD-TRIP", "legs": request.legs }),
            WritePrecondition::DoesNotExist,
            Some(Duration::from_millis(300)),
        )
        .await
        .unwrap();

    let err = h.orchestrator.book_trip(request.clone()).await.unwrap_err();
    assert!(matches!(err, TripError::Unavailable(_)), "got {err:?}");
    assert!(err.is_retryable());
    assert_eq!(h.flights.book_calls().await, 0);

    tokio::time::sleep(Duration::from_millis(150)).await;
    let retried = h.orchestrator.book_trip(request).await.unwrap();

    assert!(!retried.replayed);
    assert_ne!(retried.trip.trip_ref, Ref::new("DEAD-TRIP"));
    assert_eq!(h.store.record_count(TRIPS_TABLE).await, 1);
}

#[tokio::test]
async fn test_booked_claim_outlives_its_lease() {
    let h = TestHarness::with(short_lease_config(), Arc::new(FixedValidator::validated()));
    let request = trip().with_idempotency_key("trip-key");

    let first = h.orchestrator.book_trip(request.clone()).await.unwrap();
    // Well past the 300ms lease; the key now lives for the full TTL.
    tokio::time::sleep(Duration::from_millis(400)).await;
    let second = h.orchestrator.book_trip(request).await.unwrap();

    assert!(second.replayed);
    assert_eq!(first.trip.trip_ref, second.trip.trip_ref);
    assert_eq!(h.flights.book_calls().await, 1);
    assert_eq!(h.store.record_count(TRIPS_TABLE).await, 1);
}
