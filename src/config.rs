use std::path::PathBuf;

use crate::pipeline::gate::GateThresholds;

/// Application-level constants
pub const APP_NAME: &str = "Clinscribe";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter when RUST_LOG is unset.
pub fn default_log_filter() -> String {
    "clinscribe=info".to_string()
}

/// Get the application data directory (~/.clinscribe on all platforms).
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join(".clinscribe")
}

/// Default path of the SQLite store for results, audit events, and reviews.
pub fn default_database_path() -> PathBuf {
    app_data_dir().join("clinscribe.db")
}

/// Default path of the JSONL audit log.
pub fn default_audit_log_path() -> PathBuf {
    app_data_dir().join("audit_log.jsonl")
}

/// Runtime configuration for a pipeline instance.
///
/// Thresholds follow the review policy: transactions at or above
/// `accept_threshold` with no field below `field_floor` (and a valid
/// bundle) are auto-accepted; everything else waits for a clinician.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Overall confidence (1-100) at or above which a transaction may auto-accept.
    pub accept_threshold: u8,
    /// Per-field confidence (1-100) below which a transaction is always flagged.
    pub field_floor: u8,
    /// Base URL of the entity extraction service.
    pub extractor_base_url: String,
    /// Model identifier passed to the extraction service.
    pub extractor_model: String,
    /// HTTP timeout for a single extraction call, in seconds.
    pub extractor_timeout_secs: u64,
    /// Total attempts for an extraction call (first try + retries on transient errors).
    pub max_extraction_attempts: u32,
    /// Base backoff between extraction retries, in milliseconds (scaled by attempt).
    pub retry_backoff_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            accept_threshold: 85,
            field_floor: 70,
            extractor_base_url: "http://localhost:11434".to_string(),
            extractor_model: "medgemma".to_string(),
            extractor_timeout_secs: 300,
            max_extraction_attempts: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl PipelineConfig {
    /// Build a config from CLINSCRIBE_* environment variables,
    /// falling back to defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            accept_threshold: env_parse("CLINSCRIBE_ACCEPT_THRESHOLD", defaults.accept_threshold),
            field_floor: env_parse("CLINSCRIBE_FIELD_FLOOR", defaults.field_floor),
            extractor_base_url: std::env::var("CLINSCRIBE_EXTRACTOR_URL")
                .unwrap_or(defaults.extractor_base_url),
            extractor_model: std::env::var("CLINSCRIBE_EXTRACTOR_MODEL")
                .unwrap_or(defaults.extractor_model),
            extractor_timeout_secs: env_parse(
                "CLINSCRIBE_EXTRACTOR_TIMEOUT_SECS",
                defaults.extractor_timeout_secs,
            ),
            max_extraction_attempts: env_parse(
                "CLINSCRIBE_MAX_EXTRACTION_ATTEMPTS",
                defaults.max_extraction_attempts,
            ),
            retry_backoff_ms: env_parse("CLINSCRIBE_RETRY_BACKOFF_MS", defaults.retry_backoff_ms),
        }
    }

    /// The gate thresholds carried by this config.
    pub fn gate_thresholds(&self) -> GateThresholds {
        GateThresholds {
            accept_threshold: self.accept_threshold,
            field_floor: self.field_floor,
        }
    }
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
