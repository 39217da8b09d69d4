//! Scheduler error types.
//!
//! Admission no-ops (open breaker, duplicate request, unknown id) are not
//! errors; only task outcomes and API misuse produce a `SchedulerError`.

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Boxed error produced by a task body.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors surfaced by the scheduler or carried through its events.
#[derive(Debug, Clone, Error)]
pub enum SchedulerError {
    #[error("Timeout: {id} did not settle within {timeout_ms}ms")]
    Timeout { id: String, timeout_ms: u64 },

    #[error("{0}")]
    Task(Arc<dyn StdError + Send + Sync + 'static>),

    #[error("No prior request() for id '{0}'")]
    NoPriorRequest(String),

    #[error("next() called multiple times")]
    NextCalledMultipleTimes,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl SchedulerError {
    /// Wrap a task's own failure without altering it.
    pub fn task(err: impl Into<BoxError>) -> Self {
        Self::Task(Arc::from(err.into()))
    }

    /// Returns true for errors caused by calling the API incorrectly.
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::NoPriorRequest(_) | Self::NextCalledMultipleTimes)
    }

    /// Returns true if the task did not settle in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
