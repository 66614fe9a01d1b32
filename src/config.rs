//! Middleware configuration.

use std::env;

use crate::error::ConfigError;
use crate::headers::DEFAULT_EXCLUDED_HEADERS;

/// Default truncation threshold, in characters.
pub const DEFAULT_MAX_PAYLOAD_LENGTH: usize = 5000;

/// Paths that bypass the middleware entirely (exact match on the path).
pub const DEFAULT_EXCLUDED_PATHS: &[&str] = &[
    "/actuator/prometheus",
    "/actuator/health",
    "/actuator/env",
    "/swagger-ui.html",
    "/v3/api-docs",
    "/or/v3/api-docs",
];

/// Environment variable read by [`PayloadLoggerConfig::from_env`].
pub const MAX_PAYLOAD_ENV: &str = "LOGGING_MAX_PAYLOAD";

/// Configuration for the payload logging middleware and the client logger.
///
/// # Examples
///
/// ```rust
/// use payload_logger::PayloadLoggerConfig;
///
/// let config = PayloadLoggerConfig {
///     max_payload_length: 1024,
///     ..PayloadLoggerConfig::default()
/// };
/// assert!(config.excluded_paths.iter().any(|p| p == "/actuator/health"));
/// ```
#[derive(Debug, Clone)]
pub struct PayloadLoggerConfig {
    /// Payloads longer than this are truncated in log records
    pub max_payload_length: usize,
    /// Request paths that are passed through without buffering or logging
    pub excluded_paths: Vec<String>,
    /// Header names left out of log records (case-insensitive)
    pub excluded_headers: Vec<String>,
}

impl Default for PayloadLoggerConfig {
    fn default() -> Self {
        Self {
            max_payload_length: DEFAULT_MAX_PAYLOAD_LENGTH,
            excluded_paths: DEFAULT_EXCLUDED_PATHS.iter().map(|p| p.to_string()).collect(),
            excluded_headers: DEFAULT_EXCLUDED_HEADERS
                .iter()
                .map(|h| h.to_string())
                .collect(),
        }
    }
}

impl PayloadLoggerConfig {
    /// Builds the default configuration, overriding the payload limit from
    /// `LOGGING_MAX_PAYLOAD` when it is set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            max_payload_length: parse_max_payload(env::var(MAX_PAYLOAD_ENV).ok().as_deref())?,
            ..Self::default()
        })
    }
}

fn parse_max_payload(raw: Option<&str>) -> Result<usize, ConfigError> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        None => Ok(DEFAULT_MAX_PAYLOAD_LENGTH),
        Some(value) => value.parse().map_err(|_| {
            ConfigError::InvalidConfig(format!(
                "{MAX_PAYLOAD_ENV} must be a non-negative integer, got {value:?}"
            ))
        }),
    }
}
