//! Graceful shutdown for a scheduler.
//!
//! Running -> Draining -> Stopped. While draining no new executions are
//! tracked; `initiate` waits until every outstanding guard has dropped or the
//! timeout expires.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

/// Shutdown state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Draining,
    Stopped,
}

impl ShutdownState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Running,
            1 => Self::Draining,
            _ => Self::Stopped,
        }
    }
}

/// Result of a shutdown operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownResult {
    Complete,
    Timeout { remaining: u32 },
}

/// Tracks in-flight executions and coordinates draining them.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    state: AtomicU8,
    in_flight: Arc<AtomicU32>,
    notify: Arc<Notify>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ShutdownState::Running as u8),
            in_flight: Arc::new(AtomicU32::new(0)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn state(&self) -> ShutdownState {
        ShutdownState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_accepting(&self) -> bool {
        self.state() == ShutdownState::Running
    }

    /// Track one execution. Returns None once shutdown has begun.
    pub fn track(&self) -> Option<ShutdownGuard> {
        if !self.is_accepting() {
            return None;
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Some(ShutdownGuard {
            counter: Arc::clone(&self.in_flight),
            notify: Arc::clone(&self.notify),
        })
    }

    pub fn in_flight_count(&self) -> u32 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Stop accepting work without waiting.
    pub fn begin_drain(&self) {
        let _ = self.state.compare_exchange(
            ShutdownState::Running as u8,
            ShutdownState::Draining as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Stop accepting, wait for in-flight work, then mark stopped.
    pub async fn initiate(&self, timeout: Duration) -> ShutdownResult {
        self.begin_drain();
        let result = self.wait_for_drain(timeout).await;
        self.state.store(ShutdownState::Stopped as u8, Ordering::Release);
        result
    }

    async fn wait_for_drain(&self, timeout: Duration) -> ShutdownResult {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            // Register interest before checking the count so a guard dropped
            // in between still wakes us.
            let notified = self.notify.notified();
            let count = self.in_flight_count();
            if count == 0 {
                return ShutdownResult::Complete;
            }

            tokio::select! {
                _ = notified => continue,
                _ = tokio::time::sleep_until(deadline) => {
                    let remaining = self.in_flight_count();
                    if remaining == 0 {
                        return ShutdownResult::Complete;
                    }
                    return ShutdownResult::Timeout { remaining };
                }
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for one tracked execution.
#[derive(Debug)]
pub struct ShutdownGuard {
    counter: Arc<AtomicU32>,
    notify: Arc<Notify>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}
