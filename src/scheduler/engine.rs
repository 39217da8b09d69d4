//! The scheduler: admission control, timers, deduplication, cancellation and
//! execution.
//!
//! All bookkeeping lives behind one mutex that is only held for map
//! mutations. It is never held across an await, and it is always released
//! before events are emitted, so handlers may call back into the scheduler.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use super::breaker::{BreakerConfig, CircuitBreaker, CircuitState};
use super::events::{EventBus, EventKind, SchedulerEvent, SubscriptionId};
use super::middleware::{Middleware, MiddlewarePipeline};
use super::priority::Priority;
use super::queue::{Job, PriorityRunner, RunnerConfig};
use super::task::{task_key, QueuedTask, TaskRequest};
use super::timing::{with_timeout, IdleYield, RuntimeIdle};
use crate::config::SchedulerConfig;
use crate::shutdown::{ShutdownCoordinator, ShutdownGuard, ShutdownResult};
use crate::telemetry::{self, DropReason, SpanExt, TaskSpan};
use crate::error::SchedulerError;

/// What `request` did with a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Handed straight to the group runner.
    Enqueued,
    /// Held behind a delay or debounce timer.
    Scheduled,
    /// A timer for the same key was already pending. A debounced request
    /// restarted it with the new payload; otherwise only the priority of the
    /// pending request changed.
    PendingUpdated,
    /// The key was already waiting in the backlog; its priority was updated.
    Reprioritized,
    /// Discarded without running.
    Dropped(DropReason),
}

impl Admission {
    /// True if this call created a new admission.
    pub fn is_admitted(self) -> bool {
        matches!(self, Self::Enqueued | Self::Scheduled)
    }
}

/// Selects what `cancel` acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelTarget {
    /// Every pending or in-flight task with this id, in any group.
    Id(String),
    /// The task with this id in one group.
    Task { group: String, id: String },
    /// Every pending or in-flight task holding this dedupe key.
    DedupeKey(String),
}

impl CancelTarget {
    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }

    pub fn task(group: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Task { group: group.into(), id: id.into() }
    }

    pub fn dedupe_key(key: impl Into<String>) -> Self {
        Self::DedupeKey(key.into())
    }
}

/// Point-in-time counters for one group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GroupSnapshot {
    /// Waiting in the backlog.
    pub queued: usize,
    /// Currently executing.
    pub running: usize,
    /// Held behind a delay or debounce timer.
    pub pending: usize,
}

struct PendingTimer {
    request: QueuedTask,
    handle: JoinHandle<()>,
    serial: u64,
}

/// Cancellation handle for an admitted execution. `serial` tells a stale
/// cleanup apart from the entry of a newer execution of the same key.
struct Execution {
    group: String,
    id: String,
    dedupe_key: String,
    token: CancellationToken,
    serial: u64,
}

struct Registration {
    token: CancellationToken,
    serial: u64,
}

#[derive(Default)]
struct SchedulerState {
    runners: HashMap<String, PriorityRunner>,
    /// Delay and debounce timers by task key.
    pending: HashMap<String, PendingTimer>,
    /// Dedupe key -> task key of the pending request holding it.
    dedupe_pending: HashMap<String, String>,
    /// Dedupe key -> serial of the execution holding it.
    deduping: HashMap<String, u64>,
    executions: HashMap<String, Execution>,
    /// Admitted and not yet settled.
    admitted: HashMap<String, QueuedTask>,
    /// Last normalized request per key, kept for `refresh` until the task
    /// runs to completion. Cancelled requests stay replayable.
    history: HashMap<String, QueuedTask>,
    next_serial: u64,
}

impl SchedulerState {
    fn next_serial(&mut self) -> u64 {
        self.next_serial += 1;
        self.next_serial
    }

    fn runner(&mut self, group: &str, concurrency: usize) -> PriorityRunner {
        self.runners
            .entry(group.to_string())
            .or_insert_with(|| PriorityRunner::new(group, RunnerConfig { concurrency }))
            .clone()
    }

    fn remember(&mut self, request: &QueuedTask) {
        self.admitted.insert(request.key.clone(), request.clone());
        self.history.insert(request.key.clone(), request.clone());
    }

    /// Dedupe key already held by an execution or by another key's timer.
    fn dedupe_held(&self, request: &QueuedTask) -> bool {
        self.deduping.contains_key(&request.dedupe_key)
            || self
                .dedupe_pending
                .get(&request.dedupe_key)
                .is_some_and(|key| key != &request.key)
    }

    fn release_pending_dedupe(&mut self, dedupe_key: &str, key: &str) {
        if self.dedupe_pending.get(dedupe_key).is_some_and(|k| k == key) {
            self.dedupe_pending.remove(dedupe_key);
        }
    }

    fn register(&mut self, request: &QueuedTask) -> Registration {
        let serial = self.next_serial();
        let token = CancellationToken::new();
        self.deduping.insert(request.dedupe_key.clone(), serial);
        self.executions.insert(
            request.key.clone(),
            Execution {
                group: request.group.clone(),
                id: request.id.clone(),
                dedupe_key: request.dedupe_key.clone(),
                token: token.clone(),
                serial,
            },
        );
        Registration { token, serial }
    }

    /// Drop the cache entry once nothing else is alive under `key`.
    fn forget_if_idle(&mut self, key: &str) {
        if !self.pending.contains_key(key) && !self.executions.contains_key(key) {
            self.admitted.remove(key);
        }
    }

    /// Release what the execution `serial` holds. `ran` is false when the
    /// job was skipped before its task body started.
    fn settle(&mut self, key: &str, dedupe_key: &str, serial: u64, ran: bool) {
        // Not owned once cancelled or superseded by a newer execution.
        let owned = self.executions.get(key).is_some_and(|e| e.serial == serial);
        if owned {
            self.executions.remove(key);
            if ran && !self.pending.contains_key(key) {
                self.history.remove(key);
            }
        }
        if self.deduping.get(dedupe_key) == Some(&serial) {
            self.deduping.remove(dedupe_key);
        }
        self.forget_if_idle(key);
    }

    fn cancel_timer(&mut self, key: &str) -> Option<(String, String)> {
        let timer = self.pending.remove(key)?;
        timer.handle.abort();
        self.release_pending_dedupe(&timer.request.dedupe_key, key);
        self.forget_if_idle(key);
        Some((timer.request.group, timer.request.id))
    }

    fn cancel_execution(&mut self, key: &str) -> Option<(String, String)> {
        let execution = self.executions.remove(key)?;
        execution.token.cancel();
        if let Some(runner) = self.runners.get(&execution.group) {
            runner.remove(key);
        }
        // A running task may outlive its token; its key is free right away.
        if self.deduping.get(&execution.dedupe_key) == Some(&execution.serial) {
            self.deduping.remove(&execution.dedupe_key);
        }
        self.forget_if_idle(key);
        Some((execution.group, execution.id))
    }

    fn cancel_key(&mut self, key: &str) -> Option<(String, String)> {
        let timer = self.cancel_timer(key);
        let execution = self.cancel_execution(key);
        timer.or(execution)
    }

    /// Keys of pending timers and executions accepted by the filters.
    fn matching_keys(
        &self,
        timer: impl Fn(&QueuedTask) -> bool,
        execution: impl Fn(&Execution) -> bool,
    ) -> Vec<String> {
        let mut keys: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, pending)| timer(&pending.request))
            .map(|(key, _)| key.clone())
            .chain(
                self.executions
                    .iter()
                    .filter(|(_, running)| execution(running))
                    .map(|(key, _)| key.clone()),
            )
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

struct Inner {
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
    breaker: CircuitBreaker,
    middleware: RwLock<MiddlewarePipeline>,
    events: EventBus,
    idle: Arc<dyn IdleYield>,
    shutdown: ShutdownCoordinator,
}

impl Inner {
    fn admit(self: &Arc<Self>, request: QueuedTask) -> Admission {
        let Some(guard) = self.shutdown.track() else {
            return self.dropped(&request, DropReason::ShuttingDown);
        };
        if self.breaker.is_open(&request.group) {
            return self.dropped(&request, DropReason::BreakerOpen);
        }

        let mut events = Vec::new();
        let mut launch = None;
        let admission = {
            let mut state = self.state.lock();
            let runner = state.runner(&request.group, self.config.default_concurrency);

            if state.pending.contains_key(&request.key) {
                match request.debounce {
                    Some(window) => {
                        debug!(group = %request.group, id = %request.id, "debounce window restarted");
                        state.remember(&request);
                        self.schedule_timer(&mut state, request, window);
                    }
                    None => {
                        if let Some(timer) = state.pending.get_mut(&request.key) {
                            timer.request.priority = request.priority;
                        }
                    }
                }
                Admission::PendingUpdated
            } else if runner.update_priority(&request.key, request.priority) {
                events.push(SchedulerEvent::Updated {
                    group: request.group.clone(),
                    id: request.id.clone(),
                    priority: request.priority,
                });
                Admission::Reprioritized
            } else if state.dedupe_held(&request) {
                self.dropped(&request, DropReason::Deduplicated)
            } else {
                state.remember(&request);
                events.push(SchedulerEvent::Queued {
                    group: request.group.clone(),
                    id: request.id.clone(),
                });
                let wait = request
                    .debounce
                    .or_else(|| (!request.delay.is_zero()).then_some(request.delay));
                match wait {
                    Some(wait) => {
                        self.schedule_timer(&mut state, request, wait);
                        Admission::Scheduled
                    }
                    None => {
                        let registration = state.register(&request);
                        launch = Some((request, runner, registration));
                        Admission::Enqueued
                    }
                }
            }
        };

        for event in events {
            self.events.emit(event);
        }
        if let Some((request, runner, registration)) = launch {
            self.launch(request, runner, registration, guard);
        }
        admission
    }

    /// Start (or restart) the timer for `request`, replacing any timer
    /// already pending under its key.
    fn schedule_timer(
        self: &Arc<Self>,
        state: &mut SchedulerState,
        request: QueuedTask,
        wait: Duration,
    ) {
        let serial = state.next_serial();
        if let Some(previous) = state.pending.remove(&request.key) {
            previous.handle.abort();
            state.release_pending_dedupe(&previous.request.dedupe_key, &request.key);
        }
        state
            .dedupe_pending
            .insert(request.dedupe_key.clone(), request.key.clone());

        let inner = Arc::clone(self);
        let key = request.key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            inner.fire(&key, serial);
        });
        state
            .pending
            .insert(request.key.clone(), PendingTimer { request, handle, serial });
    }

    /// Timer expiry: move the pending request into its group runner.
    fn fire(self: &Arc<Self>, key: &str, serial: u64) {
        let guard = self.shutdown.track();
        let fired = {
            let mut state = self.state.lock();
            if !state.pending.get(key).is_some_and(|t| t.serial == serial) {
                return;
            }
            let Some(timer) = state.pending.remove(key) else {
                return;
            };
            state.release_pending_dedupe(&timer.request.dedupe_key, key);
            if guard.is_none() {
                state.forget_if_idle(key);
                drop(state);
                self.dropped(&timer.request, DropReason::ShuttingDown);
                return;
            }
            let runner = state.runner(&timer.request.group, self.config.default_concurrency);
            let registration = state.register(&timer.request);
            (timer.request, runner, registration)
        };

        let (request, runner, registration) = fired;
        if let Some(guard) = guard {
            self.launch(request, runner, registration, guard);
        }
    }

    fn launch(
        self: &Arc<Self>,
        request: QueuedTask,
        runner: PriorityRunner,
        registration: Registration,
        guard: ShutdownGuard,
    ) {
        // User callback; evaluated outside the state lock.
        let priority = request.final_priority();
        let key = request.key.clone();
        let dedupe_key = request.dedupe_key.clone();
        let serial = registration.serial;

        let inner = Arc::clone(self);
        let job: Job = Box::pin(async move {
            let _guard = guard;
            inner.execute(request, priority, registration).await;
        });
        if !runner.add(key.clone(), priority, job) {
            debug!(key = %key, "job already waiting, duplicate discarded");
            self.state.lock().settle(&key, &dedupe_key, serial, false);
        }
    }

    async fn execute(&self, request: QueuedTask, priority: i64, registration: Registration) {
        let Registration { token, serial } = registration;
        let group = request.group.clone();
        let id = request.id.clone();

        if token.is_cancelled() {
            debug!(group = %group, id = %id, "cancelled before start");
            self.settle(&request, serial, false);
            return;
        }
        if self.breaker.is_open(&group) {
            debug!(group = %group, id = %id, "circuit open at start, skipped");
            telemetry::record_dropped(&group, DropReason::BreakerOpen);
            self.settle(&request, serial, false);
            return;
        }

        self.events.emit(SchedulerEvent::Started { group: group.clone(), id: id.clone() });

        let span = TaskSpan::new(&group, &id, priority);
        let started = tokio::time::Instant::now();
        let ctx = request.context(priority, token.clone());
        let composed = self.middleware.read().compose();
        let idle = request.idle.then(|| Arc::clone(&self.idle));
        let task = Arc::clone(&request.task);

        let result = async {
            if let Some(idle) = idle {
                idle.yield_until_idle().await;
            }
            let run = composed.run(ctx, task);
            match request.timeout {
                Some(limit) => with_timeout(run, limit, &id).await,
                None => run.await,
            }
        }
        .instrument(span.clone())
        .await;

        let elapsed = started.elapsed();
        let duration_ms = elapsed.as_secs_f64() * 1000.0;
        span.record_outcome(&result, elapsed);
        telemetry::record_task_duration(&group, duration_ms);

        if result.as_ref().is_err_and(SchedulerError::is_timeout) {
            // The task future is already dropped; tell anything it spawned.
            token.cancel();
        }
        self.settle(&request, serial, true);

        match result {
            Ok(output) => {
                self.breaker.clear(&group);
                debug!(group = %group, id = %id, duration_ms, "task fulfilled");
                self.events.emit(SchedulerEvent::Fulfilled { group, id, result: output });
            }
            Err(error) => {
                self.breaker.record_failure(&group);
                warn!(group = %group, id = %id, error = %error, "task rejected");
                self.events.emit(SchedulerEvent::Rejected { group, id, error });
            }
        }
    }

    fn settle(&self, request: &QueuedTask, serial: u64, ran: bool) {
        self.state
            .lock()
            .settle(&request.key, &request.dedupe_key, serial, ran);
    }

    fn dropped(&self, request: &QueuedTask, reason: DropReason) -> Admission {
        debug!(group = %request.group, id = %request.id, reason = reason.as_str(), "request dropped");
        telemetry::record_dropped(&request.group, reason);
        Admission::Dropped(reason)
    }

    fn emit_cancelled(&self, cancelled: Vec<(String, String)>) -> usize {
        let count = cancelled.len();
        for (group, id) in cancelled {
            debug!(group = %group, id = %id, "task cancelled");
            self.events.emit(SchedulerEvent::Cancelled { group, id });
        }
        count
    }
}

/// Client-side task scheduler. Cheap to clone; clones share all state.
///
/// Admission calls (`request`, `cancel`, `prioritize`, `snapshot`) never
/// block on task execution, but they must run inside a Tokio runtime because
/// timers and jobs are spawned onto it.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Build from `TQ_*` environment variables.
    pub fn from_env() -> Self {
        Self::with_config(crate::config::load())
    }

    /// Build from a configuration, creating its declared groups and breakers.
    pub fn with_config(config: SchedulerConfig) -> Self {
        let idle = Arc::new(RuntimeIdle::new(config.idle_fallback));
        Self::with_idle(config, idle)
    }

    /// Like [`Scheduler::with_config`] with a custom idle strategy.
    pub fn with_idle(config: SchedulerConfig, idle: Arc<dyn IdleYield>) -> Self {
        let scheduler = Self {
            inner: Arc::new(Inner {
                events: EventBus::new(config.event_capacity),
                state: Mutex::new(SchedulerState::default()),
                breaker: CircuitBreaker::new(),
                middleware: RwLock::new(MiddlewarePipeline::new()),
                idle,
                shutdown: ShutdownCoordinator::new(),
                config,
            }),
        };
        for (name, group) in &scheduler.inner.config.groups {
            let concurrency = group
                .concurrency
                .unwrap_or(scheduler.inner.config.default_concurrency);
            scheduler.add_queue(name, concurrency);
            if let Some(breaker) = group.breaker() {
                scheduler.configure_group(name, breaker);
            }
        }
        scheduler
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Create a group with an explicit concurrency limit. Returns false if
    /// the group already exists; its limit is left unchanged.
    pub fn add_queue(&self, group: &str, concurrency: usize) -> bool {
        let mut state = self.inner.state.lock();
        if state.runners.contains_key(group) {
            return false;
        }
        state.runner(group, concurrency);
        true
    }

    /// Install or replace the circuit breaker thresholds for a group.
    pub fn configure_group(&self, group: &str, config: BreakerConfig) {
        self.inner.breaker.configure(group, config);
    }

    pub fn breaker_state(&self, group: &str) -> Option<CircuitState> {
        self.inner.breaker.state(group)
    }

    /// Append a middleware. It wraps tasks started after this call.
    pub fn use_middleware(&self, middleware: Arc<dyn Middleware>) {
        self.inner.middleware.write().push(middleware);
    }

    pub fn on<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&SchedulerEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(kind, handler)
    }

    pub fn off(&self, kind: EventKind, id: SubscriptionId) -> bool {
        self.inner.events.off(kind, id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.inner.events.subscribe()
    }

    /// Submit a task.
    ///
    /// Admission order: shutdown and breaker gates, then a pending timer for
    /// the same key (debounce restart or priority update), then a backlog
    /// entry for the same key (priority update), then the dedupe check.
    /// Anything left is admitted, behind a timer if it has a delay or
    /// debounce window.
    pub fn request(&self, request: TaskRequest) -> Admission {
        self.inner.admit(request.normalize())
    }

    /// Re-admit the most recent request for `id` in `group`. Works for a
    /// request that is still waiting or running, or that was cancelled.
    /// Once the task has run to completion its request is forgotten.
    pub fn refresh(&self, id: &str, group: &str) -> Result<Admission, SchedulerError> {
        let request = self
            .inner
            .state
            .lock()
            .history
            .get(&task_key(group, id))
            .cloned()
            .ok_or_else(|| SchedulerError::NoPriorRequest(id.to_string()))?;
        Ok(self.inner.admit(request))
    }

    /// Change the priority of a task that has not started yet, either in the
    /// backlog or behind a timer. Returns false, and emits nothing, if no
    /// such task is waiting.
    pub fn prioritize(&self, id: &str, priority: impl Into<Priority>, group: &str) -> bool {
        let priority = priority.into().value();
        let key = task_key(group, id);
        let updated = {
            let mut state = self.inner.state.lock();
            let in_backlog = state
                .runners
                .get(group)
                .is_some_and(|runner| runner.update_priority(&key, priority));
            in_backlog
                || match state.pending.get_mut(&key) {
                    Some(timer) => {
                        timer.request.priority = priority;
                        true
                    }
                    None => false,
                }
        };
        if updated {
            self.inner.events.emit(SchedulerEvent::Updated {
                group: group.to_string(),
                id: id.to_string(),
                priority,
            });
        }
        updated
    }

    /// Cancel matching tasks. Pending timers are cleared, waiting jobs are
    /// removed from the backlog, and running tasks have their token
    /// cancelled. Returns the number of `cancelled` events emitted.
    pub fn cancel(&self, target: CancelTarget) -> usize {
        let cancelled: Vec<(String, String)> = {
            let mut state = self.inner.state.lock();
            match target {
                CancelTarget::Id(id) => {
                    let keys = state.matching_keys(|r| r.id == id, |e| e.id == id);
                    keys.iter().filter_map(|key| state.cancel_key(key)).collect()
                }
                CancelTarget::Task { group, id } => {
                    state.cancel_key(&task_key(&group, &id)).into_iter().collect()
                }
                CancelTarget::DedupeKey(dedupe_key) => {
                    let keys = state.matching_keys(
                        |r| r.dedupe_key == dedupe_key,
                        |e| e.dedupe_key == dedupe_key,
                    );
                    keys.iter().filter_map(|key| state.cancel_key(key)).collect()
                }
            }
        };
        self.inner.emit_cancelled(cancelled)
    }

    /// Cancel every pending and in-flight task of a group.
    pub fn cancel_group(&self, group: &str) -> usize {
        let cancelled = {
            let mut state = self.inner.state.lock();
            let keys = state.matching_keys(|r| r.group == group, |e| e.group == group);
            keys.iter()
                .filter_map(|key| state.cancel_key(key))
                .collect::<Vec<_>>()
        };
        self.inner.emit_cancelled(cancelled)
    }

    /// Counters for one group, or None if the group has never been used.
    pub fn snapshot(&self, group: &str) -> Option<GroupSnapshot> {
        let state = self.inner.state.lock();
        let runner = state.runners.get(group)?;
        Some(GroupSnapshot {
            queued: runner.size(),
            running: runner.active(),
            pending: state
                .pending
                .values()
                .filter(|timer| timer.request.group == group)
                .count(),
        })
    }

    /// Counters for every known group.
    pub fn snapshot_all(&self) -> BTreeMap<String, GroupSnapshot> {
        let state = self.inner.state.lock();
        let mut snapshots: BTreeMap<String, GroupSnapshot> = state
            .runners
            .iter()
            .map(|(name, runner)| {
                let snapshot = GroupSnapshot {
                    queued: runner.size(),
                    running: runner.active(),
                    pending: 0,
                };
                (name.clone(), snapshot)
            })
            .collect();
        for timer in state.pending.values() {
            snapshots.entry(timer.request.group.clone()).or_default().pending += 1;
        }
        snapshots
    }

    /// True while a request for `id` in `group` is admitted and unsettled.
    pub fn is_tracked(&self, id: &str, group: &str) -> bool {
        self.inner
            .state
            .lock()
            .admitted
            .contains_key(&task_key(group, id))
    }

    /// [`Scheduler::shutdown`] bounded by the configured `shutdown_timeout`.
    pub async fn close(&self) -> ShutdownResult {
        self.shutdown(self.inner.config.shutdown_timeout).await
    }

    /// Stop admitting, clear all pending timers and wait up to `timeout`
    /// for admitted tasks to finish. Running tasks are not cancelled.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownResult {
        self.inner.shutdown.begin_drain();
        let cancelled = {
            let mut state = self.inner.state.lock();
            let keys: Vec<String> = state.pending.keys().cloned().collect();
            keys.iter()
                .filter_map(|key| state.cancel_timer(key))
                .collect::<Vec<_>>()
        };
        let timers = self.inner.emit_cancelled(cancelled);
        info!(
            timers_cleared = timers,
            in_flight = self.inner.shutdown.in_flight_count(),
            "scheduler draining"
        );

        let result = self.inner.shutdown.initiate(timeout).await;
        match &result {
            ShutdownResult::Complete => info!("scheduler stopped"),
            ShutdownResult::Timeout { remaining } => {
                warn!(remaining, "scheduler stopped with tasks still running")
            }
        }
        result
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("groups", &self.snapshot_all())
            .field("shutdown", &self.inner.shutdown.state())
            .finish_non_exhaustive()
    }
}
