//! API Route Configuration
//!
//! Central route definition for the SCADA bridge HTTP API

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use common::admin_api;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;
use utoipa::OpenApi;

use super::handlers;
use super::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::query_all,
        handlers::set_unit_vars,
        handlers::live,
        handlers::ready,
        handlers::status,
        common::admin_api::get_log_level,
        common::admin_api::set_log_level
    ),
    components(
        schemas(
            super::dto::QueryStateResponse,
            super::dto::UnitStateDto,
            super::dto::CommandAcceptedResponse,
            super::dto::ProbeResponse,
            crate::domain::UnitProperties,
            crate::service::BridgeStatus,
            crate::runtime::HealthStats,
            crate::runtime::HealthState,
            crate::printsrv::PoolStats,
            crate::store::PendingBufferStatsSnapshot,
            crate::runtime::ScanCycleStatsSnapshot,
            common::ErrorResponse,
            common::ErrorInfo,
            common::admin_api::SetLogLevelRequest,
            common::admin_api::LogLevelResponse
        )
    ),
    tags(
        (name = "commands", description = "SCADA state reads and command writes"),
        (name = "health", description = "Probes and diagnostics"),
        (name = "admin", description = "Runtime administration")
    )
)]
pub struct ApiDoc;

/// Create all API routes for the bridge
pub fn create_routes(state: AppState, cors_allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/openapi.json", get(handlers::openapi_json))
        .route("/api/v1/commands/queryAll", get(handlers::query_all))
        .route("/api/v1/commands/setUnitVars", post(handlers::set_unit_vars))
        .route("/api/v1/commands/health/live", get(handlers::live))
        .route("/api/v1/commands/health/ready", get(handlers::ready))
        .route("/api/v1/status", get(handlers::status))
        .route(
            admin_api::LOG_LEVEL_PATH,
            get(admin_api::get_log_level).post(admin_api::set_log_level),
        )
        .layer(cors_layer(cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(common::logging::request_context))
        .with_state(state)
}

/// Any origin when the list is empty, otherwise exactly the listed ones
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            },
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}
