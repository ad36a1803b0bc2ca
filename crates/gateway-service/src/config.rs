//! Gateway configuration.
//!
//! Configuration is loaded from environment variables. No field is secret,
//! so the derived Debug output is safe to log.

use crate::auth::allow_list::DEFAULT_ALLOW_LIST_PATHS;
use crate::auth::StaleKeyPolicy;
use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default key service base URL.
pub const DEFAULT_KEY_SERVICE_BASE_URL: &str = "http://localhost:8081";

/// Default key cache TTL in milliseconds.
pub const DEFAULT_KEY_CACHE_TTL_MS: u64 = 60_000;

/// Upper bound for the key fetch timeout in milliseconds.
pub const MAX_KEY_FETCH_TIMEOUT_MS: u64 = 30_000;

/// Default graceful shutdown drain period in seconds.
pub const DEFAULT_DRAIN_SECONDS: u64 = 30;

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Base URL of the service publishing `/auth/public-key`.
    pub key_service_base_url: String,

    /// How long a fetched key is served from cache.
    pub key_cache_ttl: Duration,

    /// Overall timeout for one key fetch. Has no default.
    pub key_fetch_timeout: Duration,

    /// Exact request paths that bypass authentication.
    pub allow_list_paths: Vec<String>,

    /// Whether an expired key is served while the key service is failing.
    pub stale_key_policy: StaleKeyPolicy,

    /// Tolerance for `iat` in the future.
    pub jwt_clock_skew: Duration,

    /// Time allowed for in-flight requests after a shutdown signal.
    pub drain_period: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid key cache TTL configuration: {0}")]
    InvalidKeyCacheTtl(String),

    #[error("Invalid key fetch timeout configuration: {0}")]
    InvalidKeyFetchTimeout(String),

    #[error("Invalid allow-list configuration: {0}")]
    InvalidAllowList(String),

    #[error("Invalid fail-open configuration: {0}")]
    InvalidFailOpen(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid drain period configuration: {0}")]
    InvalidDrainPeriod(String),
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or a value is
    /// out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    ///
    /// # Errors
    ///
    /// See [`Config::from_env`].
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let key_service_base_url = vars
            .get("KEY_SERVICE_BASE_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_KEY_SERVICE_BASE_URL.to_string());

        let key_cache_ttl = if let Some(value_str) = vars.get("KEY_CACHE_TTL_MS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidKeyCacheTtl(format!(
                    "KEY_CACHE_TTL_MS must be a valid positive integer, got '{value_str}': {e}"
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidKeyCacheTtl(
                    "KEY_CACHE_TTL_MS must be greater than 0".to_string(),
                ));
            }

            Duration::from_millis(value)
        } else {
            Duration::from_millis(DEFAULT_KEY_CACHE_TTL_MS)
        };

        let timeout_str = vars
            .get("KEY_FETCH_TIMEOUT_MS")
            .ok_or_else(|| ConfigError::MissingEnvVar("KEY_FETCH_TIMEOUT_MS".to_string()))?;
        let timeout_ms: u64 = timeout_str.parse().map_err(|e| {
            ConfigError::InvalidKeyFetchTimeout(format!(
                "KEY_FETCH_TIMEOUT_MS must be a valid positive integer, got '{timeout_str}': {e}"
            ))
        })?;
        if timeout_ms == 0 {
            return Err(ConfigError::InvalidKeyFetchTimeout(
                "KEY_FETCH_TIMEOUT_MS must be greater than 0".to_string(),
            ));
        }
        if timeout_ms > MAX_KEY_FETCH_TIMEOUT_MS {
            return Err(ConfigError::InvalidKeyFetchTimeout(format!(
                "KEY_FETCH_TIMEOUT_MS must not exceed {MAX_KEY_FETCH_TIMEOUT_MS}, got {timeout_ms}"
            )));
        }
        let key_fetch_timeout = Duration::from_millis(timeout_ms);

        let allow_list_paths = match vars.get("AUTH_ALLOW_LIST_PATHS") {
            Some(value_str) => parse_allow_list(value_str)?,
            None => DEFAULT_ALLOW_LIST_PATHS
                .iter()
                .map(ToString::to_string)
                .collect(),
        };

        let stale_key_policy = match vars.get("KEY_FAIL_OPEN").map(|v| v.to_ascii_lowercase()) {
            None => StaleKeyPolicy::FailClosed,
            Some(v) if v == "false" => StaleKeyPolicy::FailClosed,
            Some(v) if v == "true" => StaleKeyPolicy::FailOpen,
            Some(v) => {
                return Err(ConfigError::InvalidFailOpen(format!(
                    "KEY_FAIL_OPEN must be 'true' or 'false', got '{v}'"
                )));
            }
        };

        // Parse JWT clock skew tolerance with validation
        let jwt_clock_skew = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: i64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid integer, got '{value_str}': {e}"
                ))
            })?;

            if value <= 0 {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be positive, got {value}"
                )));
            }

            let value = value.unsigned_abs();
            if value > MAX_CLOCK_SKEW.as_secs() {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {value}",
                    MAX_CLOCK_SKEW.as_secs()
                )));
            }

            Duration::from_secs(value)
        } else {
            DEFAULT_CLOCK_SKEW
        };

        let drain_period = if let Some(value_str) = vars.get("GATEWAY_DRAIN_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidDrainPeriod(format!(
                    "GATEWAY_DRAIN_SECONDS must be a valid non-negative integer, got '{value_str}': {e}"
                ))
            })?;
            Duration::from_secs(value)
        } else {
            Duration::from_secs(DEFAULT_DRAIN_SECONDS)
        };

        Ok(Config {
            bind_address,
            key_service_base_url,
            key_cache_ttl,
            key_fetch_timeout,
            allow_list_paths,
            stale_key_policy,
            jwt_clock_skew,
            drain_period,
        })
    }
}

/// Split a comma-separated path list, ignoring blank entries.
fn parse_allow_list(value: &str) -> Result<Vec<String>, ConfigError> {
    let mut paths = Vec::new();
    for entry in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !entry.starts_with('/') {
            return Err(ConfigError::InvalidAllowList(format!(
                "AUTH_ALLOW_LIST_PATHS entries must start with '/', got '{entry}'"
            )));
        }
        paths.push(entry.to_string());
    }
    Ok(paths)
}
