// Integration tests for the whole app over a real listener
mod common;

use std::time::{Duration, Instant};

use axum::{
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use ecommerce_backend::{
    config::Config,
    infrastructure::{database::CatalogStore, memory::MemoryCatalog},
    server::{ShutdownOutcome, ShutdownSignal},
};
use serde_json::{json, Value};

use common::{spawn_app, spawn_upstream};

/// Fake Supabase: health is open, REST requires an `apikey` header.
fn fake_supabase(delay: Duration) -> Router {
    Router::new()
        .route(
            "/auth/v1/health",
            get(move || async move {
                tokio::time::sleep(delay).await;
                Json(json!({"name": "GoTrue"}))
            }),
        )
        .route(
            "/rest/v1/",
            get(|headers: HeaderMap| async move {
                if headers.get("apikey").is_some() {
                    (StatusCode::OK, Json(json!({})))
                } else {
                    (StatusCode::UNAUTHORIZED, Json(json!({"message": "No API key found in request"})))
                }
            }),
        )
}

fn config_for(supabase_url: &str) -> Config {
    Config {
        database_url: "postgresql://u:p@localhost:5432/postgres".to_string(),
        supabase_url: supabase_url.to_string(),
        supabase_anon_key: "anon-key".to_string(),
        probe_timeout: Duration::from_millis(300),
        ..Config::default()
    }
}

#[tokio::test]
async fn test_storefront_flow() {
    let app = spawn_app(Config::default(), MemoryCatalog::new()).await;

    let res = app.client.get(app.url("/api/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Backend is running");

    let category = json!({"name": "Shoes", "slug": "shoes"});
    let res = app.client.post(app.url("/api/categories")).json(&category).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = res.json().await.unwrap();
    let category_id = created["data"]["id"].as_str().unwrap().to_string();

    let res = app.client.post(app.url("/api/categories")).json(&category).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let product = json!({"name": "Trail Runner", "price": 89.5, "stock": 12, "categoryIds": [category_id]});
    let res = app.client.post(app.url("/api/products")).json(&product).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = res.json().await.unwrap();
    let product_id = created["data"]["id"].as_str().unwrap().to_string();

    let res = app.client.get(app.url(&format!("/api/products/{}", product_id))).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let detail: Value = res.json().await.unwrap();
    assert_eq!(detail["data"]["name"], "Trail Runner");
    assert_eq!(detail["data"]["categories"][0]["name"], "Shoes");
    assert_eq!(detail["data"]["avgRating"], Value::Null);

    let res = app.client.get(app.url("/api/categories")).send().await.unwrap();
    let categories: Value = res.json().await.unwrap();
    assert_eq!(categories["data"][0]["_count"]["products"], 1);

    let outcome = app.handle.stop(ShutdownSignal::Terminate).await.unwrap();
    assert_eq!(outcome, ShutdownOutcome::Drained);
}

#[tokio::test]
async fn test_product_rating_and_missing_product() {
    let catalog = MemoryCatalog::new();
    let app = spawn_app(Config::default(), catalog.clone()).await;

    let res = app
        .client
        .post(app.url("/api/products"))
        .json(&json!({"name": "Sandal", "price": "19.99"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let (products, _) = catalog.list_products(Default::default()).await.unwrap();
    let id = products[0].product.id;
    for (author, rating) in [("ana", 4), ("bo", 5), ("cy", 3)] {
        catalog.add_review(id, author, rating).unwrap();
    }

    let body: Value = app.client.get(app.url("/api/products")).send().await.unwrap().json().await.unwrap();
    assert_eq!(body["data"][0]["avgRating"], "4.0");
    assert_eq!(body["data"][0]["reviews"], json!([{"rating": 4}, {"rating": 5}, {"rating": 3}]));

    let res = app
        .client
        .get(app.url("/api/products/00000000-0000-0000-0000-000000000000"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({"success": false, "message": "Product not found"}));
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let app = spawn_app(Config::default(), MemoryCatalog::new()).await;
    let res = app
        .client
        .post(app.url("/api/categories"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_readiness_against_fake_supabase() {
    let (supabase, _upstream) = spawn_upstream(fake_supabase(Duration::ZERO)).await;
    let app = spawn_app(config_for(&supabase), MemoryCatalog::new()).await;

    let res = app.client.get(app.url("/api/health/db")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Database + Supabase connection is healthy");
    assert_eq!(body["supabaseAuthMode"], "anon");
}

#[tokio::test]
async fn test_readiness_times_out_on_slow_supabase() {
    let (supabase, _upstream) = spawn_upstream(fake_supabase(Duration::from_secs(10))).await;
    let app = spawn_app(config_for(&supabase), MemoryCatalog::new()).await;

    let started = Instant::now();
    let res = app.client.get(app.url("/api/health/db")).send().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(3), "probe deadline not enforced");
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["details"], "timeout");
}

#[tokio::test]
async fn test_readiness_reports_unreachable_supabase() {
    // Bind and drop to get a port nothing listens on
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let app = spawn_app(config_for(&format!("http://127.0.0.1:{}", port)), MemoryCatalog::new()).await;

    let res = app.client.get(app.url("/api/health/db")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Cannot reach Supabase host over HTTPS (443)");
    assert_eq!(body["details"], "connection_refused");
}
