// Main application entry point for the ecommerce backend
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, error};
use tracing_subscriber::EnvFilter;

use ecommerce_backend::{
    app,
    config::{self, Config},
    core::readiness::ReadinessChecker,
    infrastructure::{
        database::{Database, PgCatalog},
        probe::ReqwestProbe,
    },
    server::{self, ShutdownOutcome},
    state::AppState,
};

fn init_tracing(config: &Config) {
    let default_level = if config.is_development() { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(config::load());
    init_tracing(&config);
    config.log_summary();

    let database = Database::connect_lazy(&config).context("invalid DATABASE_URL")?;
    if config.database_auto_migrate {
        database.migrate().await.context("database migration failed")?;
    }

    let http_client = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;

    let readiness = ReadinessChecker::new(
        config.clone(),
        Arc::new(database.clone()),
        Arc::new(ReqwestProbe::new(http_client)),
    );
    let state = AppState::new(
        config.clone(),
        Arc::new(PgCatalog::new(database.clone())),
        Arc::new(readiness),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let mut handle = server::start(addr, app(state), config.shutdown_grace).await?;
    info!(port = config.port, node_env = %config.node_env, "Backend running on port {}", config.port);

    let signal = tokio::select! {
        signal = server::shutdown_signal() => signal?,
        result = handle.finished() => {
            if let Err(e) = &result {
                error!(error = %e, "HTTP server stopped unexpectedly");
            }
            database.close().await;
            result?;
            return Ok(());
        }
    };

    let outcome = server::stop_then(handle, signal, database.close()).await?;
    match outcome {
        ShutdownOutcome::Drained => info!("Application shutdown complete"),
        ShutdownOutcome::Forced => info!("Application shutdown complete (connections aborted)"),
    }
    Ok(())
}
