use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::core::readiness::ReadinessReport;
use crate::state::AppState;

pub const LIVENESS_MESSAGE: &str = "Backend is running";
pub const ROOT_MESSAGE: &str = "Ecommerce backend API";

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiMessage {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LivenessResponse {
    pub success: bool,
    pub message: String,
    /// ISO-8601 UTC, millisecond precision
    pub timestamp: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessSuccess {
    pub success: bool,
    pub message: String,
    pub supabase_auth_mode: String,
    pub warnings: Vec<String>,
    pub timestamp: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadinessFailure {
    pub success: bool,
    pub message: String,
    pub details: Option<String>,
}

pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[utoipa::path(
    get,
    path = "/",
    tag = "health",
    responses((status = 200, description = "API banner", body = ApiMessage))
)]
pub async fn root() -> impl IntoResponse {
    Json(ApiMessage {
        success: true,
        message: ROOT_MESSAGE.to_string(),
    })
}

/// Liveness: answers without touching any dependency.
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses((status = 200, description = "Process is up", body = LivenessResponse))
)]
pub async fn live() -> impl IntoResponse {
    debug!("Liveness check");
    Json(LivenessResponse {
        success: true,
        message: LIVENESS_MESSAGE.to_string(),
        timestamp: timestamp(),
    })
}

/// Readiness: runs the configured dependency checks in order.
#[utoipa::path(
    get,
    path = "/api/health/db",
    tag = "health",
    responses(
        (status = 200, description = "All dependencies reachable", body = ReadinessSuccess),
        (status = 500, description = "Configuration missing or database unreachable", body = ReadinessFailure),
        (status = 502, description = "Supabase unreachable or rejected the key", body = ReadinessFailure)
    )
)]
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.readiness.check_readiness().await;
    readiness_response(&report)
}

/// Render a readiness report. The first failing check decides status and body.
pub fn readiness_response(report: &ReadinessReport) -> Response {
    if let Some(failure) = report.first_failure() {
        let status = report.status();
        warn!(check = failure.name, status = status.as_u16(), "Readiness failed");
        let body = ReadinessFailure {
            success: false,
            message: failure.result.message.clone().unwrap_or_default(),
            details: failure.result.details.clone(),
        };
        return (status, Json(body)).into_response();
    }

    let body = ReadinessSuccess {
        success: true,
        message: report.success_message.to_string(),
        supabase_auth_mode: report.auth_mode().to_string(),
        warnings: report.warnings(),
        timestamp: timestamp(),
    };
    (StatusCode::OK, Json(body)).into_response()
}
