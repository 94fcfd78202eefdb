//! Process configuration from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::domain::ResourceClass;
use crate::logging::LogSettings;
use crate::{Error, Result};

/// Settings read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_url: String,
    pub log_dir: String,
    /// Write the log file as JSON lines.
    pub log_json: bool,
    /// Rotated log files older than this are deleted.
    pub log_retention_days: i64,
    /// Base URL of the app, used for deep links.
    pub app_base_url: String,
    pub ordering_api_url: Option<String>,
    pub ordering_api_token: Option<String>,
    pub push_gateway_url: Option<String>,
    pub push_gateway_token: Option<String>,
    pub email_api_url: Option<String>,
    pub email_api_token: Option<String>,
    pub email_from: String,
    pub resource_api_url: Option<String>,
    pub resource_api_token: Option<String>,
    pub external_call_timeout: Duration,
    pub monitor_max_concurrency: usize,
    /// Replaces the per-class polling interval when set.
    pub monitor_interval: Option<Duration>,
    /// Audit rows older than this are pruned.
    pub audit_retention_days: i64,
    /// `(owner, class)` pairs watched from startup.
    pub watch_owners: Vec<(String, ResourceClass)>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:supply-watch.db?mode=rwc".to_string(),
            log_dir: "logs".to_string(),
            log_json: false,
            log_retention_days: 7,
            app_base_url: "http://localhost:3000".to_string(),
            ordering_api_url: None,
            ordering_api_token: None,
            push_gateway_url: None,
            push_gateway_token: None,
            email_api_url: None,
            email_api_token: None,
            email_from: "alerts@supply-watch.local".to_string(),
            resource_api_url: None,
            resource_api_token: None,
            external_call_timeout: Duration::from_secs(10),
            monitor_max_concurrency: 8,
            monitor_interval: None,
            audit_retention_days: 90,
            watch_owners: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn log_settings(&self) -> LogSettings {
        LogSettings {
            dir: PathBuf::from(&self.log_dir),
            json: self.log_json,
            retention_days: self.log_retention_days,
        }
    }

    /// Load from the process environment, after `.env` if present.
    ///
    /// Supported env vars:
    /// - `DATABASE_URL`, `APP_BASE_URL`
    /// - `LOG_DIR`, `LOG_JSON`, `LOG_RETENTION_DAYS`
    /// - `ORDERING_API_URL` / `ORDERING_API_TOKEN`
    /// - `PUSH_GATEWAY_URL` / `PUSH_GATEWAY_TOKEN`
    /// - `EMAIL_API_URL` / `EMAIL_API_TOKEN` / `EMAIL_FROM`
    /// - `RESOURCE_API_URL` / `RESOURCE_API_TOKEN`
    /// - `EXTERNAL_CALL_TIMEOUT_SECS`, `MONITOR_MAX_CONCURRENCY`,
    ///   `MONITOR_INTERVAL_SECS`, `AUDIT_RETENTION_DAYS`
    /// - `WATCH_OWNERS` (e.g. "cafe-1:inventory,cafe-1:shipment")
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(url) = get("DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(dir) = get("LOG_DIR") {
            config.log_dir = dir;
        }
        if let Some(json) = get("LOG_JSON") {
            config.log_json = parse_bool("LOG_JSON", &json)?;
        }
        if let Some(days) = get("LOG_RETENTION_DAYS") {
            config.log_retention_days = parse_number("LOG_RETENTION_DAYS", &days)?;
        }
        if let Some(url) = get("APP_BASE_URL") {
            config.app_base_url = url;
        }
        config.ordering_api_url = get("ORDERING_API_URL");
        config.ordering_api_token = get("ORDERING_API_TOKEN");
        config.push_gateway_url = get("PUSH_GATEWAY_URL");
        config.push_gateway_token = get("PUSH_GATEWAY_TOKEN");
        config.email_api_url = get("EMAIL_API_URL");
        config.email_api_token = get("EMAIL_API_TOKEN");
        if let Some(from) = get("EMAIL_FROM") {
            config.email_from = from;
        }
        config.resource_api_url = get("RESOURCE_API_URL");
        config.resource_api_token = get("RESOURCE_API_TOKEN");

        if let Some(secs) = get("EXTERNAL_CALL_TIMEOUT_SECS") {
            let secs: u64 = parse_number("EXTERNAL_CALL_TIMEOUT_SECS", &secs)?;
            if secs == 0 {
                return Err(Error::config("EXTERNAL_CALL_TIMEOUT_SECS must be positive"));
            }
            config.external_call_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = get("MONITOR_MAX_CONCURRENCY") {
            let n: usize = parse_number("MONITOR_MAX_CONCURRENCY", &n)?;
            config.monitor_max_concurrency = n.max(1);
        }
        if let Some(secs) = get("MONITOR_INTERVAL_SECS") {
            let secs: u64 = parse_number("MONITOR_INTERVAL_SECS", &secs)?;
            config.monitor_interval = Some(Duration::from_secs(secs.max(1)));
        }
        if let Some(days) = get("AUDIT_RETENTION_DAYS") {
            config.audit_retention_days = parse_number("AUDIT_RETENTION_DAYS", &days)?;
        }
        if let Some(owners) = get("WATCH_OWNERS") {
            config.watch_owners = parse_watch_owners(&owners)?;
        }

        Ok(config)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::config(format!("{key}: expected a boolean, got {value:?}"))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|_| Error::config(format!("{key}: expected a number, got {value:?}")))
}

/// Parse `owner:class` pairs separated by commas.
pub fn parse_watch_owners(value: &str) -> Result<Vec<(String, ResourceClass)>> {
    let mut pairs = Vec::new();
    for entry in value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((owner, class)) = entry.rsplit_once(':') else {
            return Err(Error::config(format!(
                "WATCH_OWNERS entry {entry:?} must look like owner:class"
            )));
        };
        let owner = owner.trim();
        if owner.is_empty() {
            return Err(Error::config(format!("WATCH_OWNERS entry {entry:?} has no owner")));
        }
        let class = ResourceClass::parse(class.trim()).ok_or_else(|| {
            Error::config(format!("WATCH_OWNERS entry {entry:?} has an unknown class"))
        })?;
        let pair = (owner.to_string(), class);
        if !pairs.contains(&pair) {
            pairs.push(pair);
        }
    }
    Ok(pairs)
}
