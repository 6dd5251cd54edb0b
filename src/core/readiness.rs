//! Dependency readiness checks behind `GET /api/health/db`.
//!
//! Checks run strictly in order and stop at the first failure: a later check
//! is only meaningful once the earlier ones pass.

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::{Map, Value};
use tracing::{info, warn, debug};

use crate::config::{Config, ReadinessStrategy};
use crate::infrastructure::database::DatabasePing;
use crate::infrastructure::probe::{FailureCause, HttpProbe, ProbeError};

pub const DIRECT_SUCCESS_MESSAGE: &str = "Database + Supabase connection is healthy";
pub const ADMIN_SUCCESS_MESSAGE: &str = "Supabase admin API is reachable";
pub const MISSING_KEY_WARNING: &str =
    "SUPABASE_ANON_KEY / SUPABASE_SERVICE_ROLE_KEY is missing. Skipping Supabase REST key validation.";
pub const AUTH_MODE_NOT_CONFIGURED: &str = "not-configured";

const AUTH_MODE_KEY: &str = "authMode";

/// Outcome of one check. A passing result carrying a message is a warning.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub ok: bool,
    pub status_hint: u16,
    pub message: Option<String>,
    pub details: Option<String>,
    pub extra: Option<Map<String, Value>>,
}

impl ProbeResult {
    pub fn pass() -> Self {
        Self {
            ok: true,
            status_hint: StatusCode::OK.as_u16(),
            message: None,
            details: None,
            extra: None,
        }
    }

    pub fn pass_with_warning(message: impl Into<String>) -> Self {
        Self { message: Some(message.into()), ..Self::pass() }
    }

    pub fn fail(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            status_hint: status.as_u16(),
            message: Some(message.into()),
            details: None,
            extra: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_extra(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.get_or_insert_with(Map::new).insert(key.to_string(), value.into());
        self
    }

    pub fn warning(&self) -> Option<&str> {
        if self.ok { self.message.as_deref() } else { None }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    pub name: &'static str,
    pub result: ProbeResult,
}

/// Ordered results of the checks that actually ran.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadinessReport {
    pub checks: Vec<CheckOutcome>,
    pub success_message: &'static str,
}

impl ReadinessReport {
    fn new(success_message: &'static str) -> Self {
        Self { checks: Vec::new(), success_message }
    }

    /// Append a result; returns whether the sequence may continue.
    fn record(&mut self, name: &'static str, result: ProbeResult) -> bool {
        let ok = result.ok;
        if ok {
            debug!(check = name, "Readiness check passed");
        } else {
            warn!(
                check = name,
                status = result.status_hint,
                message = result.message.as_deref().unwrap_or_default(),
                details = result.details.as_deref().unwrap_or_default(),
                "Readiness check failed"
            );
        }
        self.checks.push(CheckOutcome { name, result });
        ok
    }

    pub fn ok(&self) -> bool {
        self.checks.iter().all(|c| c.result.ok)
    }

    pub fn first_failure(&self) -> Option<&CheckOutcome> {
        self.checks.iter().find(|c| !c.result.ok)
    }

    /// 200 when every check passed, otherwise the first failure's hint.
    pub fn status(&self) -> StatusCode {
        match self.first_failure() {
            None => StatusCode::OK,
            Some(failure) => StatusCode::from_u16(failure.result.status_hint)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    pub fn warnings(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter_map(|c| c.result.warning().map(str::to_string))
            .collect()
    }

    pub fn auth_mode(&self) -> &str {
        self.checks
            .iter()
            .filter_map(|c| c.result.extra.as_ref())
            .filter_map(|extra| extra.get(AUTH_MODE_KEY).and_then(Value::as_str))
            .next()
            .unwrap_or(AUTH_MODE_NOT_CONFIGURED)
    }

    pub fn check_names(&self) -> Vec<&'static str> {
        self.checks.iter().map(|c| c.name).collect()
    }
}

/// Runs the configured readiness strategy against injected dependencies.
pub struct ReadinessChecker {
    config: Arc<Config>,
    database: Arc<dyn DatabasePing>,
    probe: Arc<dyn HttpProbe>,
}

impl ReadinessChecker {
    pub fn new(config: Arc<Config>, database: Arc<dyn DatabasePing>, probe: Arc<dyn HttpProbe>) -> Self {
        Self { config, database, probe }
    }

    pub async fn check_readiness(&self) -> ReadinessReport {
        let report = match self.config.readiness_strategy {
            ReadinessStrategy::Direct => self.run_direct().await,
            ReadinessStrategy::AdminListing => self.run_admin_listing().await,
        };
        info!(
            ok = report.ok(),
            status = report.status().as_u16(),
            checks = ?report.check_names(),
            "Readiness check complete"
        );
        report
    }

    async fn run_direct(&self) -> ReadinessReport {
        let mut report = ReadinessReport::new(DIRECT_SUCCESS_MESSAGE);
        if !report.record("database_config", self.check_database_config()) {
            return report;
        }
        if !report.record("database", self.check_database().await) {
            return report;
        }
        if !report.record("supabase_host", self.check_supabase_host().await) {
            return report;
        }
        report.record("supabase_rest_api", self.check_supabase_rest_api().await);
        report
    }

    async fn run_admin_listing(&self) -> ReadinessReport {
        let mut report = ReadinessReport::new(ADMIN_SUCCESS_MESSAGE);
        if !report.record("supabase_config", self.check_supabase_config()) {
            return report;
        }
        if !report.record("service_role_key", self.check_service_role_key()) {
            return report;
        }
        report.record("supabase_admin", self.check_admin_listing().await);
        report
    }

    fn check_database_config(&self) -> ProbeResult {
        if self.config.database_url.is_empty() {
            return ProbeResult::fail(StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_URL is not configured");
        }
        ProbeResult::pass()
    }

    async fn check_database(&self) -> ProbeResult {
        match self.database.ping().await {
            Ok(()) => ProbeResult::pass(),
            Err(e) => ProbeResult::fail(StatusCode::INTERNAL_SERVER_ERROR, "Database connection failed")
                .with_details(e.to_string()),
        }
    }

    fn check_supabase_config(&self) -> ProbeResult {
        if self.config.supabase_url.is_empty() {
            return ProbeResult::fail(StatusCode::INTERNAL_SERVER_ERROR, "SUPABASE_URL is not configured");
        }
        ProbeResult::pass()
    }

    async fn check_supabase_host(&self) -> ProbeResult {
        let configured = self.check_supabase_config();
        if !configured.ok {
            return configured;
        }
        let url = self.supabase_endpoint("/auth/v1/health");
        let outcome = self.probe.get(&url, &[], self.config.probe_timeout).await;
        self.probe_result(outcome, "Supabase host", "Cannot reach Supabase host over HTTPS (443)")
    }

    async fn check_supabase_rest_api(&self) -> ProbeResult {
        let Some((key, auth_mode)) = self.config.supabase_api_key() else {
            return ProbeResult::pass_with_warning(MISSING_KEY_WARNING);
        };
        let url = self.supabase_endpoint("/rest/v1/");
        let bearer = format!("Bearer {}", key);
        let headers = [("apikey", key), ("Authorization", bearer.as_str())];
        let outcome = self.probe.get(&url, &headers, self.config.probe_timeout).await;
        self.probe_result(outcome, "Supabase REST API", "Supabase REST API request failed")
            .with_auth_mode(auth_mode)
    }

    fn check_service_role_key(&self) -> ProbeResult {
        if self.config.supabase_service_role_key.is_empty() {
            return ProbeResult::fail(
                StatusCode::INTERNAL_SERVER_ERROR,
                "SUPABASE_SERVICE_ROLE_KEY is not configured",
            );
        }
        ProbeResult::pass()
    }

    async fn check_admin_listing(&self) -> ProbeResult {
        let key = self.config.supabase_service_role_key.as_str();
        let url = self.supabase_endpoint("/auth/v1/admin/users?page=1&per_page=1");
        let bearer = format!("Bearer {}", key);
        let headers = [("apikey", key), ("Authorization", bearer.as_str())];

        match self.probe.get(&url, &headers, self.config.probe_timeout).await {
            Err(ProbeError::Status { status, body }) => {
                let message = provider_error_message(&body)
                    .unwrap_or_else(|| format!("Supabase admin API responded with status {}", status));
                ProbeResult::fail(StatusCode::BAD_GATEWAY, message).with_details(format!("status_{}", status))
            }
            outcome => self
                .probe_result(outcome, "Supabase admin API", "Supabase admin API request failed")
                .with_auth_mode("service_role"),
        }
    }

    fn supabase_endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.supabase_url.trim_end_matches('/'), path)
    }

    fn probe_result(&self, outcome: Result<(), ProbeError>, target: &str, unreachable: &str) -> ProbeResult {
        match outcome {
            Ok(()) => ProbeResult::pass(),
            Err(ProbeError::Status { status, .. }) => {
                ProbeResult::fail(StatusCode::BAD_GATEWAY, format!("{} responded with status {}", target, status))
            }
            Err(e @ ProbeError::Timeout(_))
            | Err(e @ ProbeError::Transport { cause: FailureCause::Timeout, .. }) => ProbeResult::fail(
                StatusCode::BAD_GATEWAY,
                format!("{} did not respond within {}ms", target, self.config.probe_timeout.as_millis()),
            )
            .with_details(e.details()),
            Err(e) => ProbeResult::fail(StatusCode::BAD_GATEWAY, unreachable).with_details(e.details()),
        }
    }
}

impl ProbeResult {
    /// Tag a passing result with the credential tier that was used.
    fn with_auth_mode(self, mode: &str) -> Self {
        if self.ok { self.with_extra(AUTH_MODE_KEY, mode) } else { self }
    }
}

/// Pull the human-readable error out of a provider error body.
fn provider_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["msg", "message", "error_description", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}
