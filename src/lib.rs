use std::any::Any;

use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    middleware::map_response,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, warn};
use utoipa::OpenApi;

pub mod api;
pub mod config;
pub mod core;
pub mod docs;
pub mod error;
pub mod infrastructure;
pub mod middleware;
pub mod server;
pub mod state;

use crate::config::Config;
use crate::error::{route_not_found, ErrorResponse, INTERNAL_ERROR_MESSAGE};
use crate::state::AppState;

pub const METHOD_NOT_ALLOWED_MESSAGE: &str = "Method not allowed";

pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    let health_router = Router::new()
        .route("/", get(api::health::root))
        .route("/api/health", get(api::health::live))
        .route("/api/health/db", get(api::health::ready));

    let catalog_router = Router::new()
        .route(
            "/api/products",
            get(api::product::list_products).post(api::product::create_product),
        )
        .route("/api/products/:id", get(api::product::get_product))
        .route(
            "/api/categories",
            get(api::category::list_categories).post(api::category::create_category),
        );

    Router::new()
        .merge(health_router)
        .merge(catalog_router)
        .route("/api/docs/openapi.json", get(openapi_json))
        .fallback(route_not_found)
        .layer(map_response(method_not_allowed_envelope))
        .with_state(state)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn openapi_json() -> impl IntoResponse {
    Json(docs::ApiDoc::openapi())
}

/// Known path, unsupported method: keep axum's status and `Allow` header but
/// answer with the error envelope.
async fn method_not_allowed_envelope(response: Response) -> Response {
    if response.status() != StatusCode::METHOD_NOT_ALLOWED {
        return response;
    }
    let allow = response.headers().get(header::ALLOW).cloned();
    let mut enveloped = (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(ErrorResponse::new(METHOD_NOT_ALLOWED_MESSAGE)),
    )
        .into_response();
    if let Some(allow) = allow {
        enveloped.headers_mut().insert(header::ALLOW, allow);
    }
    enveloped
}

/// CORS for the storefront: the configured origin only, credentials allowed.
fn cors_layer(config: &Config) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    // Credentialed CORS cannot use a wildcard origin
    if config.frontend_url.trim() == "*" {
        warn!("FRONTEND_URL is '*', which cannot be combined with credentials; cross-origin requests will be refused");
        return cors;
    }

    match HeaderValue::from_str(&config.frontend_url) {
        Ok(origin) => cors.allow_origin(origin),
        Err(e) => {
            warn!(frontend_url = %config.frontend_url, error = %e, "FRONTEND_URL is not a valid origin; cross-origin requests will be refused");
            cors
        }
    }
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    error!(panic = %detail, "Handler panicked");
    (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse::new(INTERNAL_ERROR_MESSAGE))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::core::readiness::ReadinessChecker;
    use crate::infrastructure::memory::MemoryCatalog;
    use crate::infrastructure::mock::{MockDatabase, MockProbe};

    fn create_test_app() -> Router {
        create_test_app_with(Config::default())
    }

    fn create_test_app_with(config: Config) -> Router {
        let config = Arc::new(config);
        let readiness = ReadinessChecker::new(
            config.clone(),
            Arc::new(MockDatabase::healthy()),
            Arc::new(MockProbe::new()),
        );
        app(AppState::new(config, Arc::new(MemoryCatalog::new()), Arc::new(readiness)))
    }

    #[tokio::test]
    async fn test_unknown_route_envelope() {
        let response = create_test_app()
            .oneshot(Request::builder().uri("/api/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, serde_json::json!({"success": false, "message": "Route not found"}));
    }

    #[tokio::test]
    async fn test_cors_allows_frontend_origin() {
        let response = create_test_app()
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .header(header::ORIGIN, "http://localhost:3000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://localhost:3000"
        );
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
            "true"
        );
    }

    #[tokio::test]
    async fn test_openapi_document_is_served() {
        let response = create_test_app()
            .oneshot(Request::builder().uri("/api/docs/openapi.json").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["paths"]["/api/products"].is_object());
    }

    #[tokio::test]
    async fn test_wrong_method_uses_envelope() {
        for (method, uri) in [("DELETE", "/api/products"), ("POST", "/api/health")] {
            let response = create_test_app()
                .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{} {}", method, uri);
            assert!(response.headers().get(header::ALLOW).is_some());
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let body: Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(body, serde_json::json!({"success": false, "message": METHOD_NOT_ALLOWED_MESSAGE}));
        }
    }

    #[tokio::test]
    async fn test_wildcard_frontend_url_still_serves() {
        let config = Config {
            frontend_url: "*".to_string(),
            ..Config::default()
        };
        let response = create_test_app_with(config)
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .header(header::ORIGIN, "http://evil.test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[test]
    fn test_panic_becomes_internal_error() {
        let response = handle_panic(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
