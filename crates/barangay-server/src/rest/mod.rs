mod handlers;
mod types;

use std::sync::Arc;

use axum::Router;
use axum::extract::{DefaultBodyLimit, State};
use axum::middleware;
use axum::response::Response;
use axum::routing::{get, post, put};

use barangay_storage::RegistryStore;

const MAX_REQUEST_BODY_SIZE: usize = 8 * 1024 * 1024; // reference data uploads

use crate::coordinator::MutationCoordinator;
use crate::metrics::{self, Metrics};
use crate::middleware::identity::identity_middleware;

pub use types::{ErrorResponse, GeographyResponse, RefreshResponse, ResidentPageResponse};

pub struct AppState<S: RegistryStore> {
    pub coordinator: Arc<MutationCoordinator<S>>,
    pub metrics: Arc<Metrics>,
}

impl<S: RegistryStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            coordinator: self.coordinator.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

async fn metrics_middleware<S: RegistryStore>(
    State(state): State<AppState<S>>,
    request: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> Response {
    state.metrics.record_request();

    let path = request.uri().path().to_string();
    let method = request.method().clone();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    if response.status().is_success() {
        state.metrics.record_success();
    } else {
        state.metrics.record_error();
    }
    tracing::debug!(
        %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "request handled"
    );

    response
}

pub fn create_router<S: RegistryStore + 'static>(state: AppState<S>) -> Router {
    let metrics_route = Router::new()
        .route("/metrics", get(metrics::metrics_handler))
        .with_state(Arc::clone(&state.metrics));

    Router::new()
        .route("/v1/residents", post(handlers::register_resident))
        .route(
            "/v1/residents/{id}",
            get(handlers::get_resident).patch(handlers::update_resident),
        )
        .route(
            "/v1/residents/{id}/deactivate",
            post(handlers::deactivate_resident),
        )
        .route(
            "/v1/residents/{id}/rederive",
            post(handlers::rederive_resident),
        )
        .route(
            "/v1/units/{code}/residents",
            get(handlers::list_unit_residents),
        )
        .route("/v1/households", post(handlers::create_household))
        .route("/v1/households/{id}", get(handlers::get_household))
        .route(
            "/v1/households/{id}/head",
            put(handlers::set_household_head),
        )
        .route("/v1/geography/refresh", post(handlers::refresh_geography))
        .route("/v1/geography/{code}", get(handlers::get_geography))
        .route("/healthz", get(handlers::healthz))
        .merge(metrics_route)
        .layer(middleware::from_fn(identity_middleware))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_SIZE))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            metrics_middleware,
        ))
        .with_state(state)
}
