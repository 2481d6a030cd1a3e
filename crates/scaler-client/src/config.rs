// crates/scaler-client/src/config.rs
// ============================================================================
// Module: Scaler Client Configuration
// Description: Endpoint, timeout, and credential settings for the client.
// Purpose: Provide fail-closed config loading from defaults, env, and TOML.
// Dependencies: serde, toml, url
// ============================================================================

//! ## Overview
//! [`ScalerConfig`] holds the API key and the remote endpoints used by the
//! token broker and the transform orchestrator. Values resolve in layers:
//! built-in defaults, then an optional TOML file, then the `REFRESH_URL` and
//! `SIGN_URL` environment overrides.
//! Invariants:
//! - The API key is never printed; [`ApiKey`] redacts itself in `Debug`.
//! - [`ScalerConfig::validate`] rejects non-HTTP endpoints and zero timeouts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default token issuance endpoint.
pub const DEFAULT_ISSUANCE_URL: &str = "https://api.scaler.pics/auth/api-key-token";
/// Default signing endpoint.
pub const DEFAULT_SIGN_URL: &str = "https://sign.scaler.pics/sign";
/// Environment variable overriding the issuance endpoint.
pub const ISSUANCE_URL_ENV_VAR: &str = "REFRESH_URL";
/// Environment variable overriding the signing endpoint.
pub const SIGN_URL_ENV_VAR: &str = "SIGN_URL";
/// Environment variable used to override the config file path.
pub const CONFIG_ENV_VAR: &str = "SCALER_CONFIG";
/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "scaler.toml";
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 64 * 1024;
/// Default per-request timeout.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// Default cap on a single buffered output artifact.
pub const DEFAULT_MAX_ARTIFACT_BYTES: usize = 256 * 1024 * 1024;

// ============================================================================
// SECTION: API Key
// ============================================================================

/// Long-lived API key used to obtain access tokens.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wraps a raw API key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the raw key for header construction.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Scaler client configuration.
///
/// # Invariants
/// - Endpoints use the `http` or `https` scheme once validated.
/// - `request_timeout` is non-zero once validated.
#[derive(Debug, Clone)]
pub struct ScalerConfig {
    /// API key presented to the issuance endpoint.
    pub api_key: ApiKey,
    /// Token issuance endpoint.
    pub issuance_url: Url,
    /// Signing endpoint.
    pub sign_url: Url,
    /// Timeout applied to each individual HTTP call.
    pub request_timeout: Duration,
    /// Optional overall deadline for one transform call.
    pub deadline: Option<Duration>,
    /// Margin subtracted from token expiry when deciding to refresh.
    pub refresh_skew: Duration,
    /// Maximum bytes buffered in memory for one output artifact.
    pub max_artifact_bytes: usize,
}

impl ScalerConfig {
    /// Builds a configuration with default endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a default endpoint fails to parse.
    pub fn new(api_key: ApiKey) -> Result<Self, ConfigError> {
        Ok(Self {
            api_key,
            issuance_url: parse_endpoint("issuance_url", DEFAULT_ISSUANCE_URL)?,
            sign_url: parse_endpoint("sign_url", DEFAULT_SIGN_URL)?,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            deadline: None,
            refresh_skew: Duration::ZERO,
            max_artifact_bytes: DEFAULT_MAX_ARTIFACT_BYTES,
        })
    }

    /// Builds a configuration from defaults plus process environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an override is not a valid endpoint.
    pub fn from_env(api_key: ApiKey) -> Result<Self, ConfigError> {
        Self::from_env_with(api_key, |key| env::var(key).ok())
    }

    /// Builds a configuration using a custom environment lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an override is not a valid endpoint.
    pub fn from_env_with<F>(api_key: ApiKey, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new(api_key)?;
        config.apply_env(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file, then applies environment overrides.
    ///
    /// The path resolves from the argument, then `SCALER_CONFIG`, then
    /// `scaler.toml` in the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when reading, parsing, or validation fails.
    pub fn load(path: Option<&Path>, api_key: ApiKey) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path);
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config = Self::from_toml_str(content, api_key)?;
        config.apply_env(&|key: &str| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from TOML text without consulting the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str, api_key: ApiKey) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        let mut config = Self::new(api_key)?;
        if let Some(url) = file.issuance_url {
            config.issuance_url = parse_endpoint("issuance_url", &url)?;
        }
        if let Some(url) = file.sign_url {
            config.sign_url = parse_endpoint("sign_url", &url)?;
        }
        if let Some(ms) = file.request_timeout_ms {
            config.request_timeout = Duration::from_millis(ms);
        }
        config.deadline = file.deadline_ms.map(Duration::from_millis);
        if let Some(ms) = file.refresh_skew_ms {
            config.refresh_skew = Duration::from_millis(ms);
        }
        if let Some(max) = file.max_artifact_bytes {
            config.max_artifact_bytes = max;
        }
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.expose().trim().is_empty() {
            return Err(ConfigError::Invalid("api key must not be empty".to_string()));
        }
        ensure_http_scheme("issuance_url", &self.issuance_url)?;
        ensure_http_scheme("sign_url", &self.sign_url)?;
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "request_timeout must be greater than zero".to_string(),
            ));
        }
        if self.deadline.is_some_and(|deadline| deadline.is_zero()) {
            return Err(ConfigError::Invalid("deadline must be greater than zero".to_string()));
        }
        if self.max_artifact_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_artifact_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Applies `REFRESH_URL` / `SIGN_URL` overrides from the lookup.
    fn apply_env(&mut self, lookup: &dyn Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(url) = lookup(ISSUANCE_URL_ENV_VAR).filter(|value| !value.is_empty()) {
            self.issuance_url = parse_endpoint(ISSUANCE_URL_ENV_VAR, &url)?;
        }
        if let Some(url) = lookup(SIGN_URL_ENV_VAR).filter(|value| !value.is_empty()) {
            self.sign_url = parse_endpoint(SIGN_URL_ENV_VAR, &url)?;
        }
        Ok(())
    }
}

/// On-disk TOML layout.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    /// Token issuance endpoint override.
    issuance_url: Option<String>,
    /// Signing endpoint override.
    sign_url: Option<String>,
    /// Per-request timeout in milliseconds.
    request_timeout_ms: Option<u64>,
    /// Overall transform deadline in milliseconds.
    deadline_ms: Option<u64>,
    /// Token refresh skew in milliseconds.
    refresh_skew_ms: Option<u64>,
    /// Maximum buffered artifact size in bytes.
    max_artifact_bytes: Option<usize>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from the argument, env, or default.
fn resolve_path(path: Option<&Path>) -> PathBuf {
    if let Some(path) = path {
        return path.to_path_buf();
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        return PathBuf::from(env_path);
    }
    PathBuf::from(DEFAULT_CONFIG_NAME)
}

/// Parses an endpoint URL and checks its scheme.
fn parse_endpoint(field: &str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim())
        .map_err(|err| ConfigError::Invalid(format!("{field} is not a valid url: {err}")))?;
    ensure_http_scheme(field, &url)?;
    Ok(url)
}

/// Rejects endpoints that are not HTTP(S).
fn ensure_http_scheme(field: &str, url: &Url) -> Result<(), ConfigError> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ConfigError::Invalid(format!("{field} has unsupported scheme: {scheme}"))),
    }
}
