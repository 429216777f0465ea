//! Logging configuration and initialization.
//!
//! Supports JSON, pretty and compact formats, to stderr or a file.

use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON structured logging (default for production).
    #[default]
    Json,
    /// Multi-line human-readable output.
    Pretty,
    /// Single-line human-readable output.
    Compact,
}

impl FromStr for LogFormat {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(LogError::UnknownFormat(other.to_owned())),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Filter directive, e.g. "info" or "ca_resilience=debug".
    pub level: String,
    /// Log file. Logs go to stderr when unset.
    pub output_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "info".to_string(),
            output_path: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),
    #[error("Unknown log format: {0}")]
    UnknownFormat(String),
    #[error("Failed to open log file: {0}")]
    FileOpen(String),
    #[error("Subscriber already initialized")]
    AlreadyInitialized,
}

/// Install the global tracing subscriber. Call once at startup.
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    let filter = EnvFilter::try_new(&config.level)
        .map_err(|e| LogError::InvalidFilter(e.to_string()))?;
    let writer = match &config.output_path {
        Some(path) => {
            let file = std::fs::File::create(path)
                .map_err(|e| LogError::FileOpen(e.to_string()))?;
            BoxMakeWriter::new(std::sync::Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };
    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        LogFormat::Json => registry.with(fmt::layer().json().with_writer(writer)).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty().with_writer(writer)).try_init(),
        LogFormat::Compact => registry.with(fmt::layer().compact().with_writer(writer)).try_init(),
    };
    result.map_err(|_| LogError::AlreadyInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parses_case_insensitively() {
        assert_eq!("JSON".parse::<LogFormat>().ok(), Some(LogFormat::Json));
        assert_eq!("compact".parse::<LogFormat>().ok(), Some(LogFormat::Compact));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn invalid_filter_is_rejected() {
        let config = LogConfig { level: "ca_resilience=notalevel".to_string(), ..LogConfig::default() };
        assert!(matches!(init_logging(&config), Err(LogError::InvalidFilter(_))));
    }
}
