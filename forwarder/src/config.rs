//! Configuration module for environment variable parsing.
//!
//! Everything the forwarder needs at runtime is read once at startup and
//! passed down explicitly; nothing below this module touches the environment.

use std::env;
use tracing::warn;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Symmetric key (32 bytes) protecting API keys and webhook secrets at rest
    pub secrets_encryption_key: Option<String>,

    /// Base URL of the Resend API
    pub resend_api_base_url: String,

    /// HTTP request timeout in milliseconds for every upstream call
    pub request_timeout_ms: u64,

    /// Maximum allowed skew in seconds between a webhook timestamp and now
    pub webhook_tolerance_seconds: u64,

    /// Optional JSON file with forwarding rules and plaintext secrets to load
    pub seed_file: Option<String>,

    /// Seconds a `pending` forward suppresses a redelivered `email.received`
    pub pending_timeout_secs: u64,

    // =========================================================================
    // Retention
    // =========================================================================

    /// Forwarding events older than this many days are purged
    pub event_retention_days: u32,

    /// Seconds between retention sweeps (0 disables the sweep)
    pub retention_sweep_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            port: parse_or("PORT", 8080),

            secrets_encryption_key: non_empty("SECRETS_ENCRYPTION_KEY"),

            resend_api_base_url: env::var("RESEND_API_BASE_URL")
                .ok()
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "https://api.resend.com".to_string()),

            request_timeout_ms: parse_or("REQUEST_TIMEOUT_MS", 15_000),

            webhook_tolerance_seconds: parse_or("WEBHOOK_TOLERANCE_SECONDS", 300), // 5 minutes

            seed_file: non_empty("SEED_FILE"),

            pending_timeout_secs: parse_or(
                "PENDING_TIMEOUT_SECS",
                crate::pipeline::DEFAULT_PENDING_TIMEOUT_SECS,
            ),

            event_retention_days: positive_or("EVENT_RETENTION_DAYS", 30),

            retention_sweep_interval_secs: parse_or("RETENTION_SWEEP_INTERVAL_SECS", 86_400),
        }
    }
}

/// Parse a variable into `T`, falling back to `default` when unset or invalid.
fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().parse::<T>() {
        Ok(value) => value,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid value, using default");
            default
        }
    }
}

/// Like [`parse_or`], but zero also falls back to `default`.
fn positive_or(name: &str, default: u32) -> u32 {
    match parse_or(name, default) {
        0 => {
            warn!(env_var = name, "Value must be at least 1, using default");
            default
        }
        value => value,
    }
}

/// Read a variable, treating blank values as unset.
fn non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
