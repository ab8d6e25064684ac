//! Resource service endpoints, mounted per in-process resource under its
//! table name (`/flights`, `/rentals`).
//!
//! These are the routes `HttpResourceClient` talks to.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use common::RefGenerator;
use resources::{BookingRequest, Confirmation, ResourceBookingClient};

use super::RefQuery;
use crate::error::ApiError;

/// A resource booking service hosted by this process.
#[derive(Clone)]
pub struct ResourceService {
    pub client: Arc<dyn ResourceBookingClient>,
    /// Generates a reference when the caller does not supply one.
    pub refs: Arc<dyn RefGenerator>,
}

/// Builds the routes of one resource service.
pub fn router(service: ResourceService) -> Router {
    Router::new()
        .route("/booking", post(book).get(get))
        .route("/booking/cancel", post(cancel))
        .with_state(service)
}

/// POST /{table}/booking?ref= — record a booking.
#[tracing::instrument(skip(service, payload), fields(kind = %service.client.kind()))]
pub async fn book(
    State(service): State<ResourceService>,
    Query(query): Query<RefQuery>,
    payload: Result<Json<BookingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Confirmation>), ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let booking_ref = query.get().unwrap_or_else(|| service.refs.next_ref());

    let confirmation = service.client.book(&booking_ref, &request).await?;
    metrics::counter!("resource_bookings_total", "kind" => service.client.kind().as_str())
        .increment(1);
    Ok((StatusCode::CREATED, Json(confirmation)))
}

/// GET /{table}/booking?ref= — read a booking, validating it if pending.
#[tracing::instrument(skip(service), fields(kind = %service.client.kind()))]
pub async fn get(
    State(service): State<ResourceService>,
    Query(query): Query<RefQuery>,
) -> Result<Json<Confirmation>, ApiError> {
    let booking_ref = query.require()?;
    let confirmation = service.client.get(&booking_ref).await?;
    Ok(Json(confirmation))
}

/// POST /{table}/booking/cancel?ref= — cancel a booking.
#[tracing::instrument(skip(service), fields(kind = %service.client.kind()))]
pub async fn cancel(
    State(service): State<ResourceService>,
    Query(query): Query<RefQuery>,
) -> Result<StatusCode, ApiError> {
    let booking_ref = query.require()?;
    service.client.cancel(&booking_ref).await?;
    Ok(StatusCode::NO_CONTENT)
}
