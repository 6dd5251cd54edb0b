use std::sync::Arc;

use crate::config::Config;
use crate::core::readiness::ReadinessChecker;
use crate::infrastructure::database::CatalogStore;

/// Shared handler state. Everything behind an `Arc` so cloning per request is cheap.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: Arc<dyn CatalogStore>,
    pub readiness: Arc<ReadinessChecker>,
}

impl AppState {
    pub fn new(config: Arc<Config>, catalog: Arc<dyn CatalogStore>, readiness: Arc<ReadinessChecker>) -> Self {
        Self { config, catalog, readiness }
    }
}
