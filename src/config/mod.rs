use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, debug, warn};
use url::Url;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 10;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";
pub const DEFAULT_NODE_ENV: &str = "development";

/// Domain of the managed database provider. Direct database hosts look like
/// `db.<project-ref>.supabase.co`.
pub const SUPABASE_DOMAIN: &str = "supabase.co";

const QUOTES: &[char] = &['\'', '"'];

/// Which readiness sequence `/api/health/db` runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadinessStrategy {
    /// Database ping, then host reachability, then REST key validation.
    #[default]
    Direct,
    /// A single admin-scoped user listing against the auth API.
    AdminListing,
}

impl ReadinessStrategy {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "direct" => Some(Self::Direct),
            "admin" | "admin_listing" => Some(Self::AdminListing),
            _ => None,
        }
    }
}

/// Snapshot of every setting the process needs. Built once at startup and
/// shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub node_env: String,
    pub frontend_url: String,
    pub database_url: String,
    pub database_max_connections: u32,
    pub database_auto_migrate: bool,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub probe_timeout: Duration,
    pub shutdown_grace: Duration,
    pub readiness_strategy: ReadinessStrategy,
}

impl Default for Config {
    fn default() -> Self {
        Self::resolve(&HashMap::new())
    }
}

impl Config {
    /// Build a config from a raw key/value snapshot of the environment.
    ///
    /// Pure function of its input: no process state is read here, which keeps
    /// it testable without touching `std::env`.
    pub fn resolve(raw: &HashMap<String, String>) -> Self {
        let get = |key: &str| clean_env_value(raw.get(key).map(String::as_str));

        let database_url = {
            let primary = get("DATABASE_URL");
            if primary.is_empty() { get("SUPABASE_DB_URL") } else { primary }
        };

        let explicit_supabase_url = get("SUPABASE_URL");
        let supabase_url = if explicit_supabase_url.is_empty() {
            derive_service_url(&database_url, SUPABASE_DOMAIN)
        } else {
            explicit_supabase_url
        };

        let node_env = non_empty_or(get("NODE_ENV"), DEFAULT_NODE_ENV);
        let frontend_url = non_empty_or(get("FRONTEND_URL"), DEFAULT_FRONTEND_URL);

        let probe_timeout = Duration::from_millis(
            parse_positive(&get("PROBE_TIMEOUT_MS")).unwrap_or(DEFAULT_PROBE_TIMEOUT_MS),
        );
        let shutdown_grace = Duration::from_secs(
            parse_positive(&get("SHUTDOWN_GRACE_SECS")).unwrap_or(DEFAULT_SHUTDOWN_GRACE_SECS),
        );
        let database_max_connections = parse_positive(&get("DATABASE_MAX_CONNECTIONS"))
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);

        let strategy_raw = get("READINESS_STRATEGY");
        let readiness_strategy = if strategy_raw.is_empty() {
            ReadinessStrategy::default()
        } else {
            ReadinessStrategy::parse(&strategy_raw).unwrap_or_else(|| {
                warn!(value = %strategy_raw, "Unknown READINESS_STRATEGY, using direct checks");
                ReadinessStrategy::default()
            })
        };

        Config {
            port: resolve_port(&get("PORT"), DEFAULT_PORT),
            node_env,
            frontend_url,
            database_url,
            database_max_connections,
            database_auto_migrate: matches!(get("DATABASE_AUTO_MIGRATE").as_str(), "true" | "1"),
            supabase_url,
            supabase_anon_key: get("SUPABASE_ANON_KEY"),
            supabase_service_role_key: get("SUPABASE_SERVICE_ROLE_KEY"),
            probe_timeout,
            shutdown_grace,
            readiness_strategy,
        }
    }

    /// Log the resolved settings. Secrets are reported as present/absent only.
    pub fn log_summary(&self) {
        info!(
            port = self.port,
            node_env = self.node_env.as_str(),
            frontend_url = self.frontend_url.as_str(),
            database_configured = !self.database_url.is_empty(),
            supabase_url = self.supabase_url.as_str(),
            anon_key_configured = !self.supabase_anon_key.is_empty(),
            service_role_key_configured = !self.supabase_service_role_key.is_empty(),
            probe_timeout_ms = self.probe_timeout.as_millis() as u64,
            readiness_strategy = ?self.readiness_strategy,
            "Configuration loaded successfully"
        );
    }

    pub fn is_development(&self) -> bool {
        self.node_env == "development"
    }

    /// Service-role key if present, otherwise the anon key. Empty when neither is set.
    pub fn supabase_api_key(&self) -> Option<(&str, &'static str)> {
        if !self.supabase_service_role_key.is_empty() {
            Some((&self.supabase_service_role_key, "service_role"))
        } else if !self.supabase_anon_key.is_empty() {
            Some((&self.supabase_anon_key, "anon"))
        } else {
            None
        }
    }
}

/// Load `.env` (if any) and resolve the process environment.
///
/// Runs before the tracing subscriber is installed; call
/// [`Config::log_summary`] once logging is up.
pub fn load() -> Config {
    if let Err(e) = dotenvy::dotenv() {
        debug!(error = %e, "No .env file loaded");
    }

    let raw: HashMap<String, String> = std::env::vars().collect();
    Config::resolve(&raw)
}

/// Trim whitespace and strip one surrounding quote character from each end.
pub fn clean_env_value(value: Option<&str>) -> String {
    let Some(value) = value else {
        return String::new();
    };
    let trimmed = value.trim();
    let trimmed = trimmed.strip_prefix(QUOTES).unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix(QUOTES).unwrap_or(trimmed);
    trimmed.to_string()
}

/// Parse a listening port, falling back when absent, non-numeric or not positive.
pub fn resolve_port(value: &str, fallback: u16) -> u16 {
    value
        .parse::<i64>()
        .ok()
        .filter(|&p| p > 0)
        .and_then(|p| u16::try_from(p).ok())
        .unwrap_or(fallback)
}

/// Derive `https://<ref>.<domain>` from a connection string whose host is
/// `db.<ref>.<domain>`. Returns an empty string for anything else.
pub fn derive_service_url(database_url: &str, provider_domain: &str) -> String {
    if database_url.is_empty() {
        return String::new();
    }

    let Ok(parsed) = Url::parse(database_url) else {
        return String::new();
    };
    let Some(host) = parsed.host_str() else {
        return String::new();
    };

    let suffix = format!(".{}", provider_domain);
    match host.strip_prefix("db.").and_then(|rest| rest.strip_suffix(suffix.as_str())) {
        Some(project_ref) if !project_ref.is_empty() => {
            format!("https://{}.{}", project_ref, provider_domain)
        }
        _ => String::new(),
    }
}

fn parse_positive(value: &str) -> Option<u64> {
    value.parse::<u64>().ok().filter(|&n| n > 0)
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.is_empty() { fallback.to_string() } else { value }
}
