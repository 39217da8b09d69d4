//! Per-group circuit breaker.
//!
//! A group trips open once `max_failures` failures have been recorded and
//! stays open until `cooldown` has passed since the last one. There is no
//! half-open probe: after the cooldown the next task runs as usual and its
//! outcome either clears the count or re-arms the window. Groups without a
//! configuration never open.

use std::time::Duration;

use dashmap::DashMap;
use serde::Deserialize;
use tokio::time::Instant;

/// Breaker thresholds for one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BreakerConfig {
    pub max_failures: u32,
    #[serde(with = "millis", rename = "cooldown_ms")]
    pub cooldown: Duration,
}

impl BreakerConfig {
    pub fn new(max_failures: u32, cooldown: Duration) -> Self {
        Self { max_failures, cooldown }
    }
}

/// Failure bookkeeping for one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitState {
    pub failure_count: u32,
    pub last_failure: Instant,
}

/// Failure counters and configurations for all groups.
#[derive(Debug, Default)]
pub struct CircuitBreaker {
    configs: DashMap<String, BreakerConfig>,
    failures: DashMap<String, CircuitState>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn configure(&self, group: &str, config: BreakerConfig) {
        self.configs.insert(group.to_string(), config);
    }

    pub fn config(&self, group: &str) -> Option<BreakerConfig> {
        self.configs.get(group).map(|c| *c)
    }

    pub fn record_failure(&self, group: &str) {
        let now = Instant::now();
        self.failures
            .entry(group.to_string())
            .and_modify(|s| {
                s.failure_count = s.failure_count.saturating_add(1);
                s.last_failure = now;
            })
            .or_insert(CircuitState { failure_count: 1, last_failure: now });
    }

    /// Reset the group after a success.
    pub fn clear(&self, group: &str) {
        self.failures.remove(group);
    }

    pub fn state(&self, group: &str) -> Option<CircuitState> {
        self.failures.get(group).map(|s| *s)
    }

    /// Check whether admissions to `group` are currently suppressed.
    pub fn is_open(&self, group: &str) -> bool {
        let Some(config) = self.config(group) else {
            return false;
        };
        let Some(state) = self.state(group) else {
            return false;
        };
        state.failure_count >= config.max_failures
            && state.last_failure.elapsed() < config.cooldown
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
