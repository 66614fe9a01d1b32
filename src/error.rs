//! Error types for payload capture, rendering, and configuration.

/// Error raised while buffering a request or response body.
#[derive(Debug, thiserror::Error)]
pub enum BodyCaptureError {
    #[error("Body stream error: {0}")]
    StreamError(String),
}

/// Error raised while turning a captured payload into a log record.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Payload declared as JSON could not be parsed: {0}")]
    MalformedJson(#[from] serde_json::Error),
}

/// Error raised while reading middleware configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
