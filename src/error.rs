use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

use crate::infrastructure::database::StoreError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Message returned for every unexpected failure. Details go to the log only.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    ConfigurationMissing(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON envelope used for every failed request.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::ConfigurationMissing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Internal(detail) => {
                error!(error = %detail, "Unhandled error while processing request");
                ErrorResponse::new(INTERNAL_ERROR_MESSAGE)
            }
            other => ErrorResponse::new(other.to_string()),
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotConfigured => {
                ApiError::ConfigurationMissing("DATABASE_URL is not configured".to_string())
            }
            StoreError::Conflict(message) => ApiError::Conflict(message),
            StoreError::InvalidReference(message) => ApiError::Validation(message),
            StoreError::Database(e) => ApiError::Internal(e.to_string()),
        }
    }
}

/// Fallback for routes that do not exist.
pub async fn route_not_found() -> ApiError {
    ApiError::NotFound("Route not found".to_string())
}
