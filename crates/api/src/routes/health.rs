//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use common::ResourceKind;
use serde::Serialize;

use super::trips::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Resource kinds a trip may include.
    pub bookable: Vec<ResourceKind>,
    /// Resource kinds whose booking service runs in this process.
    pub hosted: Vec<ResourceKind>,
}

/// GET /health — reports liveness and which resources are wired up.
pub async fn check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        bookable: state.orchestrator.kinds(),
        hosted: state.services.keys().copied().collect(),
    })
}
