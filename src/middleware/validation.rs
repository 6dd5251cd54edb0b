use std::collections::HashMap;

use async_trait::async_trait;
use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use tracing::{warn, debug};
use validator::{Validate, ValidationErrors};

use crate::error::ApiError;
use crate::infrastructure::database::Page;

pub const MAX_PAGE_SIZE: i64 = 100;

/// JSON body that has been deserialized and passed `Validate`.
///
/// Rejections are reported with the standard error envelope instead of
/// axum's plain-text bodies.
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let path = req.uri().path().to_string();
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|rejection| {
            warn!(path = %path, error = %rejection.body_text(), "Rejected request body");
            json_rejection_error(rejection)
        })?;

        value.validate().map_err(|errors| {
            let message = first_validation_message(&errors);
            debug!(path = %path, message = %message, "Request validation failed");
            ApiError::Validation(message)
        })?;

        Ok(ValidatedJson(value))
    }
}

fn json_rejection_error(rejection: JsonRejection) -> ApiError {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            ApiError::Validation("Expected request with Content-Type: application/json".to_string())
        }
        other => ApiError::Validation(format!("Invalid JSON body: {}", other.body_text())),
    }
}

/// First message by field name, so the reply is stable across runs.
pub fn first_validation_message(errors: &ValidationErrors) -> String {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));
    fields
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|msg| msg.to_string())
                    .unwrap_or_else(|| format!("Invalid value for field '{}'", field))
            })
        })
        .next()
        .unwrap_or_else(|| "Request validation failed".to_string())
}

/// Read `skip`/`take` from the query string. Missing values use the
/// defaults; `take` is capped at `MAX_PAGE_SIZE`.
pub fn parse_page(query: &HashMap<String, String>) -> Result<Page, ApiError> {
    let defaults = Page::default();
    let read = |key: &str, default: i64| -> Result<i64, ApiError> {
        match query.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
            None => Ok(default),
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|n| *n >= 0)
                .ok_or_else(|| ApiError::Validation(format!("{} must be a non-negative integer", key))),
        }
    };

    Ok(Page {
        skip: read("skip", defaults.skip)?,
        take: read("take", defaults.take)?.min(MAX_PAGE_SIZE),
    })
}
