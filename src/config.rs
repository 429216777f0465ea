//! Service configuration.
//!
//! Values come from environment variables ([`load`]) or a TOML file
//! ([`load_file`]). Durations are written as `500ms`, `10s`, `5m` or `72h`;
//! a bare number is read as seconds.
//!
//! Invalid environment values fall back to defaults. Zero batch sizes and
//! windows are kept as given: the loops reject them when they are built.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `RPC_CALL_TIMEOUT` | 10s | How long a caller waits for a reply |
//! | `RPC_CLEANUP_WAIT` | 5s | Grace period before a timed-out request is purged |
//! | `RPC_SWEEP_INTERVAL` | 1s | How often timed-out requests are swept |
//! | `OCSP_NEW_CERTIFICATE_BATCH_SIZE` | 1000 | |
//! | `OCSP_NEW_CERTIFICATE_WINDOW` | 1s | |
//! | `OCSP_OLD_OCSP_BATCH_SIZE` | 5000 | |
//! | `OCSP_OLD_OCSP_WINDOW` | 2s | |
//! | `OCSP_MISSING_SCT_BATCH_SIZE` | 5000 | |
//! | `OCSP_MISSING_SCT_WINDOW` | 1m | |
//! | `OCSP_REVOKED_CERTIFICATE_BATCH_SIZE` | 1000 | 0 disables the loop |
//! | `OCSP_REVOKED_CERTIFICATE_WINDOW` | 1s | 0 disables the loop |
//! | `OCSP_MIN_TIME_TO_EXPIRY` | 72h | Age at which a response is refreshed |
//! | `OCSP_OLDEST_ISSUED_SCT` | 72h | How far back missing receipts are collected |
//! | `OCSP_SIGN_FAILURE_BACKOFF_FACTOR` | 1.2 | 0 disables backoff |
//! | `OCSP_SIGN_FAILURE_BACKOFF_MAX` | 30m | 0 disables backoff |
//! | `OCSP_EXPECTED_CT_LOGS` | 0 | Receipts expected per certificate |
//! | `OCSP_LOG_LEVEL` | info | Tracing filter directive |
//! | `OCSP_LOG_FORMAT` | json | json, pretty or compact |
//! | `OCSP_LOG_FILE` | | Log to this file instead of stderr |
//! | `OCSP_SHUTDOWN_TIMEOUT` | 30s | Drain timeout for in-flight ticks |

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::rpc::MIN_SWEEP_INTERVAL;
use crate::telemetry::{LogConfig, LogFormat};

const MIN_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid duration '{0}'")]
    InvalidDuration(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Settings for the RPC correlation table and its cleaner.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    #[serde(deserialize_with = "de_duration")]
    pub call_timeout: Duration,
    #[serde(deserialize_with = "de_duration")]
    pub cleanup_wait: Duration,
    #[serde(deserialize_with = "de_duration")]
    pub sweep_interval: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(10),
            cleanup_wait: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(1),
        }
    }
}

/// Settings for the OCSP updater loops.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpdaterConfig {
    pub new_certificate_batch_size: usize,
    #[serde(deserialize_with = "de_duration")]
    pub new_certificate_window: Duration,
    pub old_ocsp_batch_size: usize,
    #[serde(deserialize_with = "de_duration")]
    pub old_ocsp_window: Duration,
    pub missing_sct_batch_size: usize,
    #[serde(deserialize_with = "de_duration")]
    pub missing_sct_window: Duration,
    pub revoked_certificate_batch_size: usize,
    #[serde(deserialize_with = "de_duration")]
    pub revoked_certificate_window: Duration,
    #[serde(deserialize_with = "de_duration")]
    pub ocsp_min_time_to_expiry: Duration,
    #[serde(deserialize_with = "de_duration")]
    pub oldest_issued_sct: Duration,
    pub sign_failure_backoff_factor: f64,
    #[serde(deserialize_with = "de_duration")]
    pub sign_failure_backoff_max: Duration,
    pub expected_ct_logs: usize,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            new_certificate_batch_size: 1000,
            new_certificate_window: Duration::from_secs(1),
            old_ocsp_batch_size: 5000,
            old_ocsp_window: Duration::from_secs(2),
            missing_sct_batch_size: 5000,
            missing_sct_window: Duration::from_secs(60),
            revoked_certificate_batch_size: 1000,
            revoked_certificate_window: Duration::from_secs(1),
            ocsp_min_time_to_expiry: Duration::from_secs(72 * 3600),
            oldest_issued_sct: Duration::from_secs(72 * 3600),
            sign_failure_backoff_factor: 1.2,
            sign_failure_backoff_max: Duration::from_secs(30 * 60),
            expected_ct_logs: 0,
        }
    }
}

/// Everything a service reads at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub rpc: RpcConfig,
    pub updater: UpdaterConfig,
    pub log: LogConfig,
    #[serde(deserialize_with = "de_duration")]
    pub shutdown_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            rpc: RpcConfig::default(),
            updater: UpdaterConfig::default(),
            log: LogConfig::default(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Parse `500ms`, `10s`, `5m`, `72h`, or a bare number of seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, ConfigError> {
    let s = raw.trim();
    let invalid = || ConfigError::InvalidDuration(raw.to_owned());
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let value: f64 = number.parse().map_err(|_| invalid())?;
    let secs = match unit.trim() {
        "" | "s" => value,
        "ms" => value / 1000.0,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        _ => return Err(invalid()),
    };
    Duration::try_from_secs_f64(secs).map_err(|_| invalid())
}

fn de_duration<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }
    match Raw::deserialize(de)? {
        Raw::Secs(s) => Ok(Duration::from_secs(s)),
        Raw::Text(t) => parse_duration(&t).map_err(serde::de::Error::custom),
    }
}

/// Read a variable, warning and returning None when it does not parse.
fn parse_env<T>(key: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    let parsed = parse(&raw);
    if parsed.is_none() {
        tracing::warn!(key, value = %raw, "ignoring invalid config value");
    }
    parsed
}

fn env_usize(key: &str, default: usize) -> usize {
    parse_env(key, |v| v.trim().parse().ok()).unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    parse_env(key, |v| v.trim().parse().ok().filter(|f: &f64| f.is_finite()))
        .unwrap_or(default)
}

fn env_duration(key: &str, default: Duration) -> Duration {
    parse_env(key, |v| parse_duration(v).ok()).unwrap_or(default)
}

fn load_rpc_config() -> RpcConfig {
    let d = RpcConfig::default();
    RpcConfig {
        call_timeout: env_duration("RPC_CALL_TIMEOUT", d.call_timeout),
        cleanup_wait: env_duration("RPC_CLEANUP_WAIT", d.cleanup_wait),
        sweep_interval: env_duration("RPC_SWEEP_INTERVAL", d.sweep_interval),
    }
}

fn load_updater_config() -> UpdaterConfig {
    let d = UpdaterConfig::default();
    UpdaterConfig {
        new_certificate_batch_size: env_usize("OCSP_NEW_CERTIFICATE_BATCH_SIZE", d.new_certificate_batch_size),
        new_certificate_window: env_duration("OCSP_NEW_CERTIFICATE_WINDOW", d.new_certificate_window),
        old_ocsp_batch_size: env_usize("OCSP_OLD_OCSP_BATCH_SIZE", d.old_ocsp_batch_size),
        old_ocsp_window: env_duration("OCSP_OLD_OCSP_WINDOW", d.old_ocsp_window),
        missing_sct_batch_size: env_usize("OCSP_MISSING_SCT_BATCH_SIZE", d.missing_sct_batch_size),
        missing_sct_window: env_duration("OCSP_MISSING_SCT_WINDOW", d.missing_sct_window),
        revoked_certificate_batch_size: env_usize(
            "OCSP_REVOKED_CERTIFICATE_BATCH_SIZE",
            d.revoked_certificate_batch_size,
        ),
        revoked_certificate_window: env_duration(
            "OCSP_REVOKED_CERTIFICATE_WINDOW",
            d.revoked_certificate_window,
        ),
        ocsp_min_time_to_expiry: env_duration("OCSP_MIN_TIME_TO_EXPIRY", d.ocsp_min_time_to_expiry),
        oldest_issued_sct: env_duration("OCSP_OLDEST_ISSUED_SCT", d.oldest_issued_sct),
        sign_failure_backoff_factor: env_f64(
            "OCSP_SIGN_FAILURE_BACKOFF_FACTOR",
            d.sign_failure_backoff_factor,
        ),
        sign_failure_backoff_max: env_duration(
            "OCSP_SIGN_FAILURE_BACKOFF_MAX",
            d.sign_failure_backoff_max,
        ),
        expected_ct_logs: env_usize("OCSP_EXPECTED_CT_LOGS", d.expected_ct_logs),
    }
}

fn load_log_config() -> LogConfig {
    let d = LogConfig::default();
    LogConfig {
        format: parse_env("OCSP_LOG_FORMAT", |v| v.parse::<LogFormat>().ok()).unwrap_or(d.format),
        level: std::env::var("OCSP_LOG_LEVEL").unwrap_or(d.level),
        output_path: std::env::var_os("OCSP_LOG_FILE").map(PathBuf::from),
    }
}

/// Load all configuration from environment variables.
pub fn load() -> ServiceConfig {
    ServiceConfig {
        rpc: load_rpc_config(),
        updater: load_updater_config(),
        log: load_log_config(),
        shutdown_timeout: env_duration("OCSP_SHUTDOWN_TIMEOUT", Duration::from_secs(30)),
    }
    .with_floors()
}

/// Parse configuration from TOML. Missing keys take their defaults.
pub fn from_toml_str(s: &str) -> Result<ServiceConfig, ConfigError> {
    let config: ServiceConfig = toml::from_str(s)?;
    Ok(config.with_floors())
}

impl ServiceConfig {
    /// Raise timings that cannot run at zero to their minimums.
    fn with_floors(mut self) -> Self {
        self.rpc.sweep_interval = self.rpc.sweep_interval.max(MIN_SWEEP_INTERVAL);
        self.shutdown_timeout = self.shutdown_timeout.max(MIN_SHUTDOWN_TIMEOUT);
        self
    }
}

pub fn load_file(path: impl AsRef<Path>) -> Result<ServiceConfig, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    from_toml_str(&text)
}
