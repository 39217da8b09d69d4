//! Per-group bounded-concurrency runner.
//!
//! Jobs wait in a keyed min-heap and are started lowest-priority-number
//! first, FIFO among equals, with at most `concurrency` running at once.

use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;

use super::priority::PriorityQueue;
use crate::telemetry;

/// A unit of work handed to the runner. Outcome reporting is the job's own
/// business; the runner only sees completion.
pub type Job = BoxFuture<'static, ()>;

/// Concurrency used for groups created without an explicit limit.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Configuration for a group runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub concurrency: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { concurrency: DEFAULT_CONCURRENCY }
    }
}

struct RunnerState {
    backlog: PriorityQueue<Job>,
    active: usize,
}

struct RunnerInner {
    group: String,
    concurrency: usize,
    state: Mutex<RunnerState>,
}

/// Thread-safe priority runner for one group. Cheap to clone.
#[derive(Clone)]
pub struct PriorityRunner {
    inner: Arc<RunnerInner>,
}

impl PriorityRunner {
    pub fn new(group: impl Into<String>, config: RunnerConfig) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                group: group.into(),
                concurrency: config.concurrency.max(1),
                state: Mutex::new(RunnerState {
                    backlog: PriorityQueue::new(),
                    active: 0,
                }),
            }),
        }
    }

    pub fn group(&self) -> &str {
        &self.inner.group
    }

    pub fn concurrency(&self) -> usize {
        self.inner.concurrency
    }

    /// Add a job under `key`. Returns false, dropping the job, if the key is
    /// already waiting in the backlog.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn add(&self, key: impl Into<String>, priority: i64, job: Job) -> bool {
        if self.inner.state.lock().backlog.push(key, priority, job).is_err() {
            return false;
        }
        self.pump();
        true
    }

    /// Change the priority of a job that has not started. Returns false if
    /// the key is not waiting.
    pub fn update_priority(&self, key: &str, priority: i64) -> bool {
        self.inner.state.lock().backlog.update_priority(key, priority)
    }

    /// Drop a job that has not started yet.
    pub fn remove(&self, key: &str) -> bool {
        let removed = self.inner.state.lock().backlog.remove(key);
        removed.is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.state.lock().backlog.contains(key)
    }

    /// Jobs waiting to start.
    pub fn size(&self) -> usize {
        self.inner.state.lock().backlog.len()
    }

    /// Jobs currently running.
    pub fn active(&self) -> usize {
        self.inner.state.lock().active
    }

    /// Keys and priorities of waiting jobs.
    pub fn backlog(&self) -> Vec<(String, i64)> {
        let state = self.inner.state.lock();
        state.backlog.entries().map(|(k, p)| (k.to_string(), p)).collect()
    }

    /// Start as many waiting jobs as the concurrency limit allows.
    fn pump(&self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(group = %self.inner.group, "runner: no tokio runtime, jobs left waiting");
            return;
        };
        loop {
            let (job, queued, running) = {
                let mut state = self.inner.state.lock();
                if state.active >= self.inner.concurrency {
                    return;
                }
                let Some((_, job)) = state.backlog.pop() else {
                    return;
                };
                state.active += 1;
                (job, state.backlog.len(), state.active)
            };
            telemetry::record_group_depth(&self.inner.group, queued, running);
            let slot = ActiveSlot { runner: self.clone() };
            handle.spawn(async move {
                let _slot = slot;
                job.await;
            });
        }
    }
}

impl std::fmt::Debug for PriorityRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("PriorityRunner")
            .field("group", &self.inner.group)
            .field("concurrency", &self.inner.concurrency)
            .field("queued", &state.backlog.len())
            .field("active", &state.active)
            .finish()
    }
}

/// RAII guard for a running job. Releases the slot and starts the next job
/// when dropped, including when the job panics.
struct ActiveSlot {
    runner: PriorityRunner,
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        let (queued, running) = {
            let mut state = self.runner.inner.state.lock();
            state.active = state.active.saturating_sub(1);
            (state.backlog.len(), state.active)
        };
        telemetry::record_group_depth(&self.runner.inner.group, queued, running);
        self.runner.pump();
    }
}
