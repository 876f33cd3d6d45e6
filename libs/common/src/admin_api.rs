//! Runtime administration endpoints shared by bridge services
//!
//! Handlers take no state, so they mount on any router:
//!
//! ```ignore
//! Router::new().route(
//!     common::admin_api::LOG_LEVEL_PATH,
//!     get(common::admin_api::get_log_level).post(common::admin_api::set_log_level),
//! )
//! ```

use axum::response::Json;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::api_types::{AppError, SuccessResponse};
use crate::logging;

/// Route serving the log filter
pub const LOG_LEVEL_PATH: &str = "/api/v1/admin/logs/level";

/// New log filter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct SetLogLevelRequest {
    /// Filter directive, e.g. `debug` or `info,scadasrv=trace`
    pub level: String,
}

/// Active log filter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct LogLevelResponse {
    pub level: String,
}

/// Current log filter
///
/// @route GET /api/v1/admin/logs/level
/// @status 200 - Active filter (`unknown` before logging is initialised)
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/v1/admin/logs/level",
    responses((status = 200, description = "Active log filter", body = LogLevelResponse)),
    tag = "admin"
))]
pub async fn get_log_level() -> Json<SuccessResponse<LogLevelResponse>> {
    Json(SuccessResponse::new(LogLevelResponse {
        level: logging::get_log_level(),
    }))
}

/// Replace the log filter without restarting
///
/// @route POST /api/v1/admin/logs/level
/// @status 200 - Filter applied
/// @status 400 - Empty or unparsable filter directive
/// @status 503 - Logging was not initialised with reload support
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/v1/admin/logs/level",
    request_body = SetLogLevelRequest,
    responses(
        (status = 200, description = "Filter applied", body = LogLevelResponse),
        (status = 400, description = "Invalid filter directive", body = crate::ErrorResponse),
        (status = 503, description = "Runtime reload unavailable", body = crate::ErrorResponse)
    ),
    tag = "admin"
))]
pub async fn set_log_level(
    Json(request): Json<SetLogLevelRequest>,
) -> Result<Json<SuccessResponse<LogLevelResponse>>, AppError> {
    let level = request.level.trim();
    if level.is_empty() {
        return Err(AppError::bad_request("level must not be empty").with_path(LOG_LEVEL_PATH));
    }
    if let Err(e) = EnvFilter::try_new(level) {
        return Err(AppError::bad_request(format!("invalid log level '{}'", level))
            .with_details(e.to_string())
            .with_path(LOG_LEVEL_PATH));
    }

    logging::set_log_level(level)
        .map_err(|e| AppError::service_unavailable(e).with_path(LOG_LEVEL_PATH))?;

    Ok(Json(SuccessResponse::new(LogLevelResponse {
        level: logging::get_log_level(),
    })))
}
