//! Trip booking endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use common::ResourceKind;
use confirmation_store::ConfirmationStore;
use resources::Confirmation;
use serde::Deserialize;
use trip::{TripConfirmation, TripOrchestrator, TripRequest};

use super::RefQuery;
use super::services::ResourceService;
use crate::error::ApiError;

/// Header carrying a client-chosen idempotency key. Takes precedence over
/// `idempotency_key` in the body.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Response header set to `true` when an idempotency key replayed an earlier
/// trip instead of booking a new one.
pub const IDEMPOTENT_REPLAY_HEADER: &str = "idempotent-replayed";

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub orchestrator: TripOrchestrator<Arc<dyn ConfirmationStore>>,
    /// Resource services hosted by this process, mounted under their table name.
    pub services: BTreeMap<ResourceKind, ResourceService>,
}

#[derive(Debug, Deserialize)]
pub struct LegQuery {
    pub kind: Option<String>,
    #[serde(rename = "ref")]
    pub booking_ref: Option<String>,
}

/// POST /trips/booking — book every leg of a trip or none of them.
///
/// Answers 201 with the trip, including when an idempotency key replays an
/// earlier booking; replays carry `idempotent-replayed: true`.
#[tracing::instrument(skip(state, headers, payload))]
pub async fn book(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<TripRequest>, JsonRejection>,
) -> Result<(StatusCode, [(&'static str, &'static str); 1], Json<TripConfirmation>), ApiError> {
    let Json(mut request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    if let Some(value) = headers.get(IDEMPOTENCY_KEY_HEADER) {
        let key = value
            .to_str()
            .map_err(|_| ApiError::BadRequest("invalid idempotency key".to_string()))?;
        request.idempotency_key = Some(key.to_string());
    }

    let booked = state.orchestrator.book_trip(request).await?;
    let replayed = if booked.replayed { "true" } else { "false" };
    Ok((
        StatusCode::CREATED,
        [(IDEMPOTENT_REPLAY_HEADER, replayed)],
        Json(booked.trip),
    ))
}

/// GET /trips/booking?ref= — load a trip, refreshing each leg.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RefQuery>,
) -> Result<Json<TripConfirmation>, ApiError> {
    let trip_ref = query.require()?;
    let trip = state.orchestrator.get_booking(&trip_ref).await?;
    Ok(Json(trip))
}

/// GET /trips/booking/legs?kind=&ref= — read a single leg.
#[tracing::instrument(skip(state))]
pub async fn leg(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LegQuery>,
) -> Result<Json<Confirmation>, ApiError> {
    let kind: ResourceKind = query
        .kind
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("missing kind".to_string()))?
        .parse()
        .map_err(ApiError::BadRequest)?;
    let booking_ref = RefQuery {
        booking_ref: query.booking_ref,
    }
    .require()?;

    let confirmation = state.orchestrator.get_leg(kind, &booking_ref).await?;
    Ok(Json(confirmation))
}
