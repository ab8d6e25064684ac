//! HTTP API server with observability for the trip booking system.
//!
//! Serves trip booking and lookup, the resource services hosted in-process,
//! with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use common::{ResourceKind, UuidRefGenerator};
use confirmation_store::{
    ConfirmationStore, InMemoryConfirmationStore, PostgresConfirmationStore, StoreError,
};
use metrics_exporter_prometheus::PrometheusHandle;
use resources::{
    HttpResourceClient, ResourceBookingClient, SimulatedValidator, StoreBackedClient,
    ValidationEngine,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use trip::{OrchestratorConfig, TripOrchestrator};

use config::Config;
use error::StartupError;
use routes::services::ResourceService;
use routes::trips::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    let mut app = Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/trips/booking",
            get(routes::trips::get).post(routes::trips::book),
        )
        .route("/trips/booking/legs", get(routes::trips::leg))
        .with_state(state.clone());

    for (kind, service) in &state.services {
        app = app.nest(
            &format!("/{}", kind.table()),
            routes::services::router(service.clone()),
        );
    }

    app.merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates an in-memory application state with every resource hosted
/// in-process and validated by `validator`.
pub fn create_default_state(
    validator: Arc<dyn ValidationEngine>,
    config: OrchestratorConfig,
) -> Arc<AppState> {
    create_hosted_state(Arc::new(InMemoryConfirmationStore::new()), validator, config)
}

/// Creates application state over `store` with every resource hosted
/// in-process.
pub fn create_hosted_state(
    store: Arc<dyn ConfirmationStore>,
    validator: Arc<dyn ValidationEngine>,
    config: OrchestratorConfig,
) -> Arc<AppState> {
    let clients = ResourceKind::ALL
        .into_iter()
        .map(|kind| hosted(kind, store.clone(), validator.clone()))
        .collect();
    assemble(store, clients, config)
}

/// Creates the application state described by `config`.
///
/// Uses PostgreSQL when `DATABASE_URL` is set and reaches resources with a
/// configured URL over HTTP; the rest are hosted in-process.
pub async fn create_state(config: &Config) -> Result<Arc<AppState>, StartupError> {
    let store: Arc<dyn ConfirmationStore> = match &config.database_url {
        Some(url) => {
            let store = PostgresConfirmationStore::connect(url).await?;
            store.run_migrations().await.map_err(StoreError::from)?;
            tracing::info!("using PostgreSQL confirmation store");
            Arc::new(store)
        }
        None => {
            tracing::info!("using in-memory confirmation store");
            Arc::new(InMemoryConfirmationStore::new())
        }
    };

    let validator: Arc<dyn ValidationEngine> =
        Arc::new(SimulatedValidator::new(config.validation_config()));

    let mut clients = Vec::new();
    for kind in ResourceKind::ALL {
        match config.service_url(kind) {
            Some(url) => {
                tracing::info!(%kind, url, "using remote resource service");
                let client = HttpResourceClient::new(kind, url, config.booking_call_timeout)?;
                clients.push((Arc::new(client) as Arc<dyn ResourceBookingClient>, false));
            }
            None => clients.push(hosted(kind, store.clone(), validator.clone())),
        }
    }

    Ok(assemble(store, clients, config.orchestrator_config()))
}

fn hosted(
    kind: ResourceKind,
    store: Arc<dyn ConfirmationStore>,
    validator: Arc<dyn ValidationEngine>,
) -> (Arc<dyn ResourceBookingClient>, bool) {
    (
        Arc::new(StoreBackedClient::new(kind, store, validator)),
        true,
    )
}

/// Wires clients into the orchestrator. Clients flagged `true` are hosted
/// here and get their own routes.
fn assemble(
    store: Arc<dyn ConfirmationStore>,
    clients: Vec<(Arc<dyn ResourceBookingClient>, bool)>,
    config: OrchestratorConfig,
) -> Arc<AppState> {
    let refs = Arc::new(UuidRefGenerator::new());
    let mut orchestrator = TripOrchestrator::new(store, refs.clone(), config);
    let mut services = BTreeMap::new();

    for (client, is_hosted) in clients {
        if is_hosted {
            services.insert(
                client.kind(),
                ResourceService {
                    client: client.clone(),
                    refs: refs.clone(),
                },
            );
        }
        orchestrator = orchestrator.with_client(client);
    }

    Arc::new(AppState {
        orchestrator,
        services,
    })
}
