//! Error types for veilgate.

use std::time::Duration;

/// Top-level error type for the proxy.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Detection error: {0}")]
    Detect(#[from] DetectError),

    #[error("Mapping store error: {0}")]
    Store(#[from] StoreError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Proxy error: {0}")]
    Proxy(#[from] ProxyError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Detector and pattern errors.
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("Invalid pattern {name}: {reason}")]
    InvalidPattern { name: String, reason: String },

    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),
}

/// Mapping store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Mapping {0} already exists")]
    DuplicateId(String),

    #[error("Store backend unavailable: {0}")]
    Unavailable(String),
}

/// Errors talking to the upstream completion API.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("Upstream request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Upstream transport failure: {0}")]
    Transport(String),

    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest does not say which budget fired; the client sets one
            // total timeout and reports it here.
            UpstreamError::Timeout(Duration::ZERO)
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}

/// Request pipeline errors, mapped onto HTTP statuses by the API layer.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Request blocked by secret scanner: {reason}")]
    SecretBlocked { reason: String },

    #[error("Quota exceeded for tenant {tenant}")]
    QuotaExceeded { tenant: String },

    #[error("Rate limited")]
    RateLimited,

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("Internal error: {0}")]
    Internal(String),
}
