use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use ecommerce_backend::{
    app,
    config::Config,
    core::readiness::ReadinessChecker,
    infrastructure::{
        database::{CatalogStore, DatabasePing},
        memory::MemoryCatalog,
        mock::MockDatabase,
        probe::{HttpProbe, ReqwestProbe},
    },
    server::{self, ServerHandle},
    state::AppState,
};

/// A running instance of the full router on an ephemeral port.
pub struct TestApp {
    pub address: String,
    pub handle: ServerHandle,
    pub client: reqwest::Client,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }
}

pub fn loopback() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

pub fn test_database_url() -> Option<String> {
    std::env::var("TEST_DATABASE_URL").ok().filter(|url| !url.is_empty())
}

/// Serve the app with explicit dependencies.
pub async fn spawn_with(
    config: Config,
    catalog: Arc<dyn CatalogStore>,
    database: Arc<dyn DatabasePing>,
    probe: Arc<dyn HttpProbe>,
) -> TestApp {
    let config = Arc::new(config);
    let readiness = ReadinessChecker::new(config.clone(), database, probe);
    let state = AppState::new(config, catalog, Arc::new(readiness));

    let handle = server::start(loopback(), app(state), Duration::from_secs(1))
        .await
        .expect("Failed to start test server");

    TestApp {
        address: format!("http://{}", handle.local_addr()),
        handle,
        client: reqwest::Client::new(),
    }
}

/// Serve the app over an in-memory catalog with real outbound probes.
pub async fn spawn_app(config: Config, catalog: MemoryCatalog) -> TestApp {
    spawn_with(
        config,
        Arc::new(catalog),
        Arc::new(MockDatabase::healthy()),
        Arc::new(ReqwestProbe::default()),
    )
    .await
}

/// Serve a stand-in upstream (e.g. a fake Supabase) and return its base URL.
pub async fn spawn_upstream(router: Router) -> (String, ServerHandle) {
    let handle = server::start(loopback(), router, Duration::from_millis(100))
        .await
        .expect("Failed to start upstream");
    (format!("http://{}", handle.local_addr()), handle)
}
