pub mod auth;
pub mod dto;
pub mod errors;
pub mod extract;
pub mod handlers;

use axum::{
    routing::{delete, get, post},
    Router,
};
use chrono::Duration;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::{ingest::IngestionPipeline, stats::WindowedAggregator, store::StorePtr};
use handlers::ApiDoc;

/// Defaults applied when a query omits its parameters.
#[derive(Debug, Clone, Copy)]
pub struct QuerySettings {
    pub default_window: Duration,
    pub active_threshold: Duration,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            default_window: Duration::hours(24),
            active_threshold: Duration::minutes(5),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: StorePtr,
    pub aggregator: WindowedAggregator,
    pub pipeline: IngestionPipeline,
    pub settings: QuerySettings,
}

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route("/sensors/status", get(handlers::get_sensor_status))
        .route("/sensors/{class}/latest", get(handlers::get_sensor_latest))
        .route("/sensors/{class}/history", get(handlers::get_sensor_history))
        .route("/admin/sensors/stats", get(handlers::get_admin_stats))
        .route("/admin/sensors/{class}/count", get(handlers::get_class_count))
        .route("/admin/sensors/{class}", delete(handlers::clear_class))
        .route("/data/api/sensor-data", post(handlers::push_sensor_data))
        .with_state(state)
        .split_for_parts();

    router
        .route("/health", get(handlers::health))
        .route(
            "/api-docs/openapi.json",
            get(move || async move { axum::Json(api) }),
        )
}
