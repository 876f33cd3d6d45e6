//! HTTP handlers
//!
//! Thin translation between HTTP and [`ScadaService`](crate::service::ScadaService).
//! Writes are accepted into the pending buffer and applied on the next scan
//! cycle; reads are served from the latest snapshot.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::Json,
};
use common::{AppError, SuccessResponse};
use tracing::debug;
use utoipa::OpenApi;

use super::dto::{CommandAcceptedResponse, ProbeResponse, QueryStateResponse, SetUnitVarsParams};
use super::routes::ApiDoc;
use super::AppState;
use crate::service::BridgeStatus;

/// Latest device state
///
/// @route GET /api/v1/commands/queryAll
/// @status 200 - Snapshot from the most recent successful scan cycle
/// @status 503 - No snapshot yet
#[utoipa::path(
    get,
    path = "/api/v1/commands/queryAll",
    responses(
        (status = 200, description = "Latest snapshot", body = QueryStateResponse),
        (status = 503, description = "No snapshot received from PrintSrv yet", body = common::ErrorResponse)
    ),
    tag = "commands"
)]
pub async fn query_all(State(state): State<AppState>) -> Result<Json<QueryStateResponse>, AppError> {
    let snapshot = state
        .service
        .latest_snapshot()
        .map_err(|e| AppError::from(e).with_path("/api/v1/commands/queryAll"))?;
    Ok(Json(QueryStateResponse::from(snapshot.as_ref())))
}

/// Queue a command value for a unit
///
/// Returns as soon as the command is buffered. Several commands for the same
/// unit before the next cycle collapse into the last one.
///
/// @route POST /api/v1/commands/setUnitVars?unit=&value=
/// @status 200 - Command accepted
/// @status 400 - Missing or invalid unit/value
/// @status 503 - Pending buffer full
#[utoipa::path(
    post,
    path = "/api/v1/commands/setUnitVars",
    params(SetUnitVarsParams),
    responses(
        (status = 200, description = "Command queued for the next scan cycle", body = CommandAcceptedResponse),
        (status = 400, description = "unit or value missing, not an integer, or below 1", body = common::ErrorResponse),
        (status = 503, description = "Pending buffer is full", body = common::ErrorResponse)
    ),
    tag = "commands"
)]
pub async fn set_unit_vars(
    State(state): State<AppState>,
    params: Result<Query<SetUnitVarsParams>, QueryRejection>,
) -> Result<Json<CommandAcceptedResponse>, AppError> {
    const PATH: &str = "/api/v1/commands/setUnitVars";

    let Query(params) = params.map_err(|e| {
        AppError::bad_request("unit and value must be integer query parameters")
            .with_details(e.body_text())
            .with_path(PATH)
    })?;

    let unit = u32::try_from(params.unit)
        .ok()
        .filter(|u| *u >= 1)
        .ok_or_else(|| {
            AppError::bad_request(format!("unit must be >= 1, got {}", params.unit)).with_path(PATH)
        })?;
    let value = i32::try_from(params.value)
        .ok()
        .filter(|v| *v >= 1)
        .ok_or_else(|| {
            AppError::bad_request(format!(
                "value must be between 1 and {}, got {}",
                i32::MAX,
                params.value
            ))
            .with_path(PATH)
        })?;

    debug!("setUnitVars request: unit={}, value={}", unit, value);
    state
        .service
        .submit_write(unit, value)
        .map_err(|e| AppError::from(e).with_path(PATH))?;

    Ok(Json(CommandAcceptedResponse::set_unit_vars(
        state.service.device_name(),
        unit,
        value,
    )))
}

/// Liveness probe; does not look at PrintSrv
#[utoipa::path(
    get,
    path = "/api/v1/commands/health/live",
    responses((status = 200, description = "Process is running", body = ProbeResponse)),
    tag = "health"
)]
pub async fn live(State(state): State<AppState>) -> Json<ProbeResponse> {
    Json(ProbeResponse::new(state.service.is_alive(), None))
}

/// Readiness probe; ready once a snapshot has been received
#[utoipa::path(
    get,
    path = "/api/v1/commands/health/ready",
    responses(
        (status = 200, description = "Snapshot available", body = ProbeResponse),
        (status = 503, description = "No snapshot yet", body = ProbeResponse)
    ),
    tag = "health"
)]
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ProbeResponse>) {
    let ready = state.service.is_ready();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ProbeResponse::new(ready, Some(ready))))
}

/// Bridge diagnostics
#[utoipa::path(
    get,
    path = "/api/v1/status",
    responses((status = 200, description = "Health policy, pool, buffer and scan cycle state", body = BridgeStatus)),
    tag = "health"
)]
pub async fn status(State(state): State<AppState>) -> Json<SuccessResponse<BridgeStatus>> {
    Json(SuccessResponse::new(state.service.status()))
}

/// OpenAPI document
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
