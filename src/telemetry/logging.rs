//! Subscriber setup for applications that embed the scheduler.
//!
//! The library only emits `tracing` events; hosts that have no subscriber of
//! their own can install one here, as JSON lines or pretty text, to stderr
//! or a file.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Multi-line human-readable output.
    Pretty,
}

impl FromStr for LogFormat {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(LogError::UnknownFormat(other.to_string())),
        }
    }
}

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    /// `EnvFilter` directive, e.g. `"info"` or `"tq_core=debug"`.
    pub level: String,
    /// Write to this file instead of stderr.
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

impl LogConfig {
    /// Read `TQ_LOG`, `TQ_LOG_FORMAT` and `TQ_LOG_FILE`. Missing or invalid
    /// values keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(level) = std::env::var("TQ_LOG") {
            if !level.trim().is_empty() {
                config.level = level;
            }
        }
        if let Some(format) = std::env::var("TQ_LOG_FORMAT").ok().and_then(|f| f.parse().ok()) {
            config.format = format;
        }
        config.output_path = std::env::var_os("TQ_LOG_FILE").map(PathBuf::from);
        config
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

/// Install a global subscriber. Fails if one is already set.
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    let filter = EnvFilter::try_new(&config.level)
        .map_err(|e| LogError::InvalidFilter(e.to_string()))?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match (config.format, &config.output_path) {
        (LogFormat::Json, Some(path)) => {
            let file = open_log_file(path)?;
            registry
                .with(fmt::layer().json().with_writer(std::sync::Mutex::new(file)))
                .try_init()
        }
        (LogFormat::Json, None) => registry.with(fmt::layer().json()).try_init(),
        (LogFormat::Pretty, Some(path)) => {
            let file = open_log_file(path)?;
            registry
                .with(fmt::layer().pretty().with_ansi(false).with_writer(std::sync::Mutex::new(file)))
                .try_init()
        }
        (LogFormat::Pretty, None) => registry.with(fmt::layer().pretty()).try_init(),
    };
    installed.map_err(|_| LogError::AlreadyInitialized)
}

fn open_log_file(path: &Path) -> Result<std::fs::File, LogError> {
    std::fs::File::create(path).map_err(|e| LogError::FileOpen(e.to_string()))
}
