//! Scheduler configuration from environment variables or TOML.
//!
//! Invalid environment values fall back to defaults without crashing. TOML
//! input is validated and reported as `SchedulerError::Config`.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `TQ_DEFAULT_CONCURRENCY` | 4 | Concurrency for groups created on demand |
//! | `TQ_IDLE_FALLBACK_MS` | 0 | Delay used by the default idle strategy (ms) |
//! | `TQ_EVENT_CAPACITY` | 1024 | Broadcast channel capacity (events) |
//! | `TQ_SHUTDOWN_TIMEOUT` | 30 | Graceful shutdown timeout (secs) |
//!
//! # TOML
//!
//! ```toml
//! default_concurrency = 8
//! idle_fallback_ms = 16
//!
//! [groups.api]
//! concurrency = 2
//! max_failures = 3
//! cooldown_ms = 5000
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::SchedulerError;
use crate::scheduler::{BreakerConfig, DEFAULT_CONCURRENCY, DEFAULT_EVENT_CAPACITY};

const DEFAULT_SHUTDOWN_SECS: u64 = 30;

/// Per-group settings applied when the scheduler is built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GroupConfig {
    /// Concurrency limit; the scheduler default when unset.
    pub concurrency: Option<usize>,
    /// Failures before the group's breaker opens; no breaker when unset.
    pub max_failures: Option<u32>,
    pub cooldown_ms: u64,
}

impl GroupConfig {
    /// Breaker thresholds, if this group declares any.
    pub fn breaker(&self) -> Option<BreakerConfig> {
        self.max_failures
            .map(|max| BreakerConfig::new(max, Duration::from_millis(self.cooldown_ms)))
    }
}

/// Effective scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub default_concurrency: usize,
    pub idle_fallback: Duration,
    pub event_capacity: usize,
    pub shutdown_timeout: Duration,
    pub groups: HashMap<String, GroupConfig>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_concurrency: DEFAULT_CONCURRENCY,
            idle_fallback: Duration::ZERO,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_SECS),
            groups: HashMap::new(),
        }
    }
}

/// On-disk shape. Every field optional so partial files work.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    default_concurrency: Option<usize>,
    idle_fallback_ms: Option<u64>,
    event_capacity: Option<usize>,
    shutdown_timeout_secs: Option<u64>,
    groups: HashMap<String, GroupConfig>,
}

impl SchedulerConfig {
    /// Parse a TOML document. Missing fields take their defaults.
    pub fn from_toml_str(input: &str) -> Result<Self, SchedulerError> {
        let file: FileConfig =
            toml::from_str(input).map_err(|e| SchedulerError::Config(e.to_string()))?;
        let defaults = Self::default();

        let config = Self {
            default_concurrency: file
                .default_concurrency
                .unwrap_or(defaults.default_concurrency),
            idle_fallback: file
                .idle_fallback_ms
                .map_or(defaults.idle_fallback, Duration::from_millis),
            event_capacity: file.event_capacity.unwrap_or(defaults.event_capacity),
            shutdown_timeout: file
                .shutdown_timeout_secs
                .map_or(defaults.shutdown_timeout, Duration::from_secs),
            groups: file.groups,
        };
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SchedulerError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)
            .map_err(|e| SchedulerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&input)
    }

    /// Reject values that cannot describe a working scheduler.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.default_concurrency == 0 {
            return Err(SchedulerError::Config("default_concurrency must be at least 1".into()));
        }
        if self.event_capacity == 0 {
            return Err(SchedulerError::Config("event_capacity must be at least 1".into()));
        }
        for (name, group) in &self.groups {
            if group.concurrency == Some(0) {
                return Err(SchedulerError::Config(format!(
                    "group '{name}': concurrency must be at least 1"
                )));
            }
            if group.max_failures == Some(0) {
                return Err(SchedulerError::Config(format!(
                    "group '{name}': max_failures must be at least 1"
                )));
            }
        }
        Ok(())
    }
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Load configuration from `TQ_*` environment variables.
///
/// Missing or invalid values fall back to defaults; zero counts are raised
/// to one. Groups can only be declared through TOML.
pub fn load() -> SchedulerConfig {
    let default_concurrency = parse_usize("TQ_DEFAULT_CONCURRENCY", DEFAULT_CONCURRENCY).max(1);
    let idle_fallback_ms = parse_u64("TQ_IDLE_FALLBACK_MS", 0);
    let event_capacity = parse_usize("TQ_EVENT_CAPACITY", DEFAULT_EVENT_CAPACITY).max(1);
    let shutdown_secs = parse_u64("TQ_SHUTDOWN_TIMEOUT", DEFAULT_SHUTDOWN_SECS).max(1);

    SchedulerConfig {
        default_concurrency,
        idle_fallback: Duration::from_millis(idle_fallback_ms),
        event_capacity,
        shutdown_timeout: Duration::from_secs(shutdown_secs),
        groups: HashMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    // Serialize env-mutating tests to avoid cross-test pollution.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        "TQ_DEFAULT_CONCURRENCY",
        "TQ_IDLE_FALLBACK_MS",
        "TQ_EVENT_CAPACITY",
        "TQ_SHUTDOWN_TIMEOUT",
    ];

    fn clear_env_vars() {
        for k in ENV_KEYS {
            std::env::remove_var(k);
        }
    }

    #[test]
    fn test_defaults_are_sensible() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let cfg = load();
        assert_eq!(cfg, SchedulerConfig::default());
        assert_eq!(cfg.default_concurrency, 4);
        assert_eq!(cfg.idle_fallback, Duration::ZERO);
        assert_eq!(cfg.event_capacity, 1024);
        assert_eq!(cfg.shutdown_timeout.as_secs(), 30);
    }

    #[test]
    fn test_env_vars_override_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("TQ_DEFAULT_CONCURRENCY", "16");
        std::env::set_var("TQ_IDLE_FALLBACK_MS", "25");
        std::env::set_var("TQ_SHUTDOWN_TIMEOUT", "5");
        let cfg = load();
        assert_eq!(cfg.default_concurrency, 16);
        assert_eq!(cfg.idle_fallback, Duration::from_millis(25));
        assert_eq!(cfg.shutdown_timeout.as_secs(), 5);
        clear_env_vars();
    }

    #[test]
    fn test_invalid_env_falls_back_to_default() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("TQ_DEFAULT_CONCURRENCY", "lots");
        std::env::set_var("TQ_EVENT_CAPACITY", "-3");
        let cfg = load();
        assert_eq!(cfg.default_concurrency, 4);
        assert_eq!(cfg.event_capacity, 1024);
        clear_env_vars();
    }

    #[test]
    fn test_zero_values_are_floored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("TQ_DEFAULT_CONCURRENCY", "0");
        std::env::set_var("TQ_EVENT_CAPACITY", "0");
        std::env::set_var("TQ_SHUTDOWN_TIMEOUT", "0");
        let cfg = load();
        assert_eq!(cfg.default_concurrency, 1);
        assert_eq!(cfg.event_capacity, 1);
        assert_eq!(cfg.shutdown_timeout.as_secs(), 1);
        clear_env_vars();
    }

    #[test]
    fn toml_declares_groups_and_breakers() {
        let cfg = SchedulerConfig::from_toml_str(
            r#"
            default_concurrency = 8
            idle_fallback_ms = 16

            [groups.api]
            concurrency = 2
            max_failures = 3
            cooldown_ms = 5000

            [groups.ui]
            concurrency = 1
            "#,
        )
        .unwrap();

        assert_eq!(cfg.default_concurrency, 8);
        assert_eq!(cfg.idle_fallback, Duration::from_millis(16));
        assert_eq!(cfg.event_capacity, 1024);
        let api = &cfg.groups["api"];
        assert_eq!(api.concurrency, Some(2));
        assert_eq!(api.breaker(), Some(BreakerConfig::new(3, Duration::from_secs(5))));
        assert_eq!(cfg.groups["ui"].breaker(), None);
    }

    #[test]
    fn toml_rejects_invalid_values() {
        let err = SchedulerConfig::from_toml_str("default_concurrency = 0").unwrap_err();
        assert!(err.to_string().contains("default_concurrency"));

        let err = SchedulerConfig::from_toml_str("[groups.a]\nmax_failures = 0").unwrap_err();
        assert!(err.to_string().contains("group 'a'"));

        let err = SchedulerConfig::from_toml_str("unknown_key = 1").unwrap_err();
        assert!(matches!(err, SchedulerError::Config(_)));
    }

    #[test]
    fn from_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "event_capacity = 64\nshutdown_timeout_secs = 2").unwrap();

        let cfg = SchedulerConfig::from_file(file.path()).unwrap();

        assert_eq!(cfg.event_capacity, 64);
        assert_eq!(cfg.shutdown_timeout, Duration::from_secs(2));
    }

    #[test]
    fn from_file_reports_missing_file() {
        let err = SchedulerConfig::from_file("/nonexistent/tq.toml").unwrap_err();
        assert!(matches!(err, SchedulerError::Config(msg) if msg.contains("tq.toml")));
    }
}
