//! Idle-yield strategies and the task timeout race.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::SchedulerError;

/// Capability to wait for spare capacity before running low-urgency work.
///
/// Implementations must always resolve; a host without a native idle signal
/// falls back to a short delay.
#[async_trait]
pub trait IdleYield: Send + Sync + 'static {
    async fn yield_until_idle(&self);
}

/// Default strategy: yield to the Tokio scheduler, then wait `fallback`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeIdle {
    pub fallback: Duration,
}

impl RuntimeIdle {
    pub fn new(fallback: Duration) -> Self {
        Self { fallback }
    }
}

#[async_trait]
impl IdleYield for RuntimeIdle {
    async fn yield_until_idle(&self) {
        tokio::task::yield_now().await;
        if !self.fallback.is_zero() {
            tokio::time::sleep(self.fallback).await;
        }
    }
}

/// Race `fut` against `limit`. On expiry the future is dropped and a
/// `Timeout` error labeled with `id` is returned.
pub async fn with_timeout<T, F>(fut: F, limit: Duration, id: &str) -> Result<T, SchedulerError>
where
    F: Future<Output = Result<T, SchedulerError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(SchedulerError::Timeout {
            id: id.to_string(),
            timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}
