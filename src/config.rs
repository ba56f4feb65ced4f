//! Configuration for veilgate.
//!
//! Everything loads from environment variables (a `.env` file is honored
//! when present). Each sub-config owns its own `from_env()` so the
//! relevant knobs live next to the subsystem they configure.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::error::ConfigError;

/// Main configuration for the proxy.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub anonymize: AnonymizeConfig,
    pub store: StoreConfig,
    pub cache: CacheConfig,
    pub quota: QuotaConfig,
    pub secrets: SecretScanConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Ok(Self {
            server: ServerConfig::from_env()?,
            upstream: UpstreamConfig::from_env()?,
            anonymize: AnonymizeConfig::from_env()?,
            store: StoreConfig::from_env()?,
            cache: CacheConfig::from_env()?,
            quota: QuotaConfig::from_env()?,
            secrets: SecretScanConfig::from_env()?,
        })
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address, e.g. "0.0.0.0:8600".
    pub bind_addr: String,
    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,
    /// Overall per-request budget.
    pub request_timeout: Duration,
    /// In-process rate limiter: requests per window per tenant.
    pub rate_limit: u64,
    pub rate_limit_window: Duration,
    pub rate_limit_enabled: bool,
}

impl ServerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bind_addr: optional_env("VEILGATE_BIND_ADDR")?
                .unwrap_or_else(|| "127.0.0.1:8600".to_string()),
            max_body_bytes: parse_optional_env("VEILGATE_MAX_BODY_BYTES", 2 * 1024 * 1024)?,
            request_timeout: Duration::from_secs(parse_optional_env(
                "VEILGATE_REQUEST_TIMEOUT_SECONDS",
                120,
            )?),
            rate_limit: parse_optional_env("VEILGATE_RATE_LIMIT", 120)?,
            rate_limit_window: Duration::from_secs(parse_optional_env(
                "VEILGATE_RATE_LIMIT_WINDOW_SECONDS",
                60,
            )?),
            rate_limit_enabled: parse_optional_env("VEILGATE_RATE_LIMIT_ENABLED", true)?,
        })
    }
}

/// Upstream completion API configuration.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Base URL of the upstream API, e.g. "https://api.openai.com".
    pub base_url: String,
    /// API key forwarded as a bearer token. Optional for local backends.
    pub api_key: Option<SecretString>,
    /// Connect budget for the upstream socket.
    pub connect_timeout: Duration,
    /// Total budget for a unary upstream exchange.
    pub request_timeout: Duration,
    /// Idle budget between streamed chunks.
    pub stream_idle_timeout: Duration,
}

impl UpstreamConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let base_url =
            optional_env("VEILGATE_UPSTREAM_URL")?.ok_or_else(|| ConfigError::MissingRequired {
                key: "VEILGATE_UPSTREAM_URL".to_string(),
                hint: "Set it to the base URL of the upstream completion API".to_string(),
            })?;

        Ok(Self {
            base_url,
            api_key: optional_env("VEILGATE_UPSTREAM_API_KEY")?.map(SecretString::from),
            connect_timeout: Duration::from_secs(parse_optional_env(
                "VEILGATE_UPSTREAM_CONNECT_TIMEOUT_SECONDS",
                10,
            )?),
            request_timeout: Duration::from_secs(parse_optional_env(
                "VEILGATE_UPSTREAM_TIMEOUT_SECONDS",
                120,
            )?),
            stream_idle_timeout: Duration::from_secs(parse_optional_env(
                "VEILGATE_STREAM_IDLE_TIMEOUT_SECONDS",
                30,
            )?),
        })
    }

    /// Get the upstream API key (exposes the secret).
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_ref().map(|k| k.expose_secret())
    }
}

/// Anonymization engine configuration.
#[derive(Debug, Clone)]
pub struct AnonymizeConfig {
    /// Whether to prepend the anti-hallucination system message.
    pub inject_prompt: bool,
    /// Enable fuzzy placeholder recovery on unary responses.
    pub fuzzy_enabled: bool,
    /// Minimum confidence for fuzzy matches; bare-form matches score 0.90.
    pub fuzzy_confidence_threshold: f32,
    /// Upper bound on placeholder token length, shared by the grammar
    /// check and the stream buffer carry bound.
    pub max_placeholder_length: usize,
    /// Minimum detector score for a span to be considered.
    pub score_threshold: f32,
    /// Optional YAML-free custom pattern file: one `NAME<TAB>REGEX` per line.
    pub custom_pattern_path: Option<PathBuf>,
    /// Optional directory of allowlist files, one term per line.
    pub allowlist_dir: Option<PathBuf>,
    /// Compliance preset selecting default strategies and secret policy.
    pub compliance_preset: CompliancePreset,
}

impl AnonymizeConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let preset = match optional_env("VEILGATE_COMPLIANCE_PRESET")? {
            Some(value) => {
                value
                    .parse()
                    .map_err(|message| ConfigError::InvalidValue {
                        key: "VEILGATE_COMPLIANCE_PRESET".to_string(),
                        message,
                    })?
            }
            None => CompliancePreset::Balanced,
        };

        Ok(Self {
            inject_prompt: parse_optional_env("VEILGATE_INJECT_PROMPT", true)?,
            fuzzy_enabled: parse_optional_env("VEILGATE_FUZZY_ENABLED", true)?,
            fuzzy_confidence_threshold: parse_optional_env(
                "VEILGATE_FUZZY_CONFIDENCE_THRESHOLD",
                0.85,
            )?,
            max_placeholder_length: parse_optional_env("VEILGATE_MAX_PLACEHOLDER_LENGTH", 25)?,
            score_threshold: parse_optional_env("VEILGATE_SCORE_THRESHOLD", 0.5)?,
            custom_pattern_path: optional_env("VEILGATE_CUSTOM_PATTERN_PATH")?.map(PathBuf::from),
            allowlist_dir: optional_env("VEILGATE_ALLOWLIST_DIR")?.map(PathBuf::from),
            compliance_preset: preset,
        })
    }
}

/// Compliance preset controlling strategy defaults and secret policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompliancePreset {
    /// Redact aggressively; medium-risk secrets are redacted.
    Strict,
    /// Placeholder-first; medium-risk secrets raise a warning.
    #[default]
    Balanced,
    /// Minimal interference; medium-risk secrets pass through.
    Permissive,
}

impl std::str::FromStr for CompliancePreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "balanced" | "default" => Ok(Self::Balanced),
            "permissive" | "relaxed" => Ok(Self::Permissive),
            _ => Err(format!(
                "invalid preset '{}', expected 'strict', 'balanced' or 'permissive'",
                s
            )),
        }
    }
}

/// Mapping store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum lifetime of a mapping record.
    pub mapping_ttl: Duration,
    /// How often the in-process backend sweeps expired records.
    pub sweep_interval: Duration,
}

impl StoreConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            mapping_ttl: Duration::from_secs(parse_optional_env(
                "VEILGATE_MAPPING_TTL_SECONDS",
                300,
            )?),
            sweep_interval: Duration::from_secs(parse_optional_env(
                "VEILGATE_SWEEP_INTERVAL_SECONDS",
                60,
            )?),
        })
    }
}

/// Response cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl: Duration,
    pub max_entries: usize,
}

impl CacheConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            enabled: parse_optional_env("VEILGATE_CACHE_ENABLED", false)?,
            ttl: Duration::from_secs(parse_optional_env("VEILGATE_CACHE_TTL_SECONDS", 3600)?),
            max_entries: parse_optional_env("VEILGATE_CACHE_MAX_ENTRIES", 1000)?,
        })
    }
}

/// Quota enforcement configuration.
#[derive(Debug, Clone)]
pub struct QuotaConfig {
    pub enabled: bool,
    /// Requests per rolling hour per tenant. Zero disables the limit.
    pub hourly_requests: u64,
    /// Requests per UTC day per tenant. Zero disables the limit.
    pub daily_requests: u64,
    /// Tokens per UTC month per tenant. Zero disables the limit.
    pub monthly_tokens: u64,
}

impl QuotaConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            enabled: parse_optional_env("VEILGATE_QUOTA_ENABLED", false)?,
            hourly_requests: parse_optional_env("VEILGATE_QUOTA_HOURLY_REQUESTS", 0)?,
            daily_requests: parse_optional_env("VEILGATE_QUOTA_DAILY_REQUESTS", 0)?,
            monthly_tokens: parse_optional_env("VEILGATE_QUOTA_MONTHLY_TOKENS", 0)?,
        })
    }
}

/// Secret scanner configuration.
#[derive(Debug, Clone)]
pub struct SecretScanConfig {
    pub enabled: bool,
}

impl SecretScanConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            enabled: parse_optional_env("VEILGATE_SECRET_SCAN_ENABLED", true)?,
        })
    }
}

/// Read an optional environment variable, treating empty strings as unset.
fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "value is not valid unicode".to_string(),
        }),
    }
}

/// Read an optional environment variable and parse it, falling back to a
/// default when unset.
fn parse_optional_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional_env(key)? {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_parses_known_names() {
        assert_eq!(
            "strict".parse::<CompliancePreset>().unwrap(),
            CompliancePreset::Strict
        );
        assert_eq!(
            "Balanced".parse::<CompliancePreset>().unwrap(),
            CompliancePreset::Balanced
        );
        assert!("bogus".parse::<CompliancePreset>().is_err());
    }

    #[test]
    fn parse_optional_env_uses_default_when_unset() {
        let value: u64 = parse_optional_env("VEILGATE_TEST_UNSET_KNOB", 42).unwrap();
        assert_eq!(value, 42);
    }
}
