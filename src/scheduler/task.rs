//! Task request types: what callers submit and what the runner executes.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::priority::Priority;
use crate::error::SchedulerError;

/// Group used when a request does not name one.
pub const DEFAULT_GROUP: &str = "default";

/// Value a task resolves to.
pub type TaskOutput = Value;
/// Outcome of a task or middleware chain.
pub type TaskResult = Result<TaskOutput, SchedulerError>;
/// A reusable unit of async work. Shared so `refresh` can run it again.
pub type Task = Arc<dyn Fn(TaskContext) -> BoxFuture<'static, TaskResult> + Send + Sync>;
/// Callback evaluated at enqueue time to pick the final priority.
pub type AutoPriority = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Wrap an async closure as a [`Task`].
pub fn task_fn<F, Fut>(f: F) -> Task
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = TaskResult> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// Identity key of a task, rendered `"group:id"`.
pub fn task_key(group: &str, id: &str) -> String {
    format!("{group}:{id}")
}

/// Execution context handed to middleware and to the task itself.
///
/// Cancellation is cooperative: the scheduler cancels `token`, the task
/// decides whether to observe it.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub id: String,
    pub group: String,
    pub dedupe_key: String,
    pub meta: Value,
    pub priority: i64,
    pub idle: bool,
    pub timeout: Option<Duration>,
    pub token: CancellationToken,
}

impl TaskContext {
    pub fn key(&self) -> String {
        task_key(&self.group, &self.id)
    }

    /// Check if the scheduler asked this task to stop.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the task has been cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

/// A task submission as accepted by `Scheduler::request`.
#[derive(Clone)]
pub struct TaskRequest {
    pub id: String,
    pub task: Task,
    pub group: Option<String>,
    pub priority: Priority,
    /// One-shot delay before enqueue. Later requests for the same key while
    /// the delay is pending do not restart it.
    pub delay: Duration,
    /// Debounce window. Each request for the same key restarts it.
    pub debounce: Option<Duration>,
    pub dedupe_key: Option<String>,
    /// Wait for an idle opportunity before running.
    pub idle: bool,
    pub auto_priority: Option<AutoPriority>,
    pub meta: Value,
    pub timeout: Option<Duration>,
}

impl TaskRequest {
    pub fn new(id: impl Into<String>, task: Task) -> Self {
        Self {
            id: id.into(),
            task,
            group: None,
            priority: Priority::default(),
            delay: Duration::ZERO,
            debounce: None,
            dedupe_key: None,
            idle: false,
            auto_priority: None,
            meta: Value::Null,
            timeout: None,
        }
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn priority(mut self, priority: impl Into<Priority>) -> Self {
        self.priority = priority.into();
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn debounce(mut self, window: Duration) -> Self {
        self.debounce = Some(window);
        self
    }

    pub fn dedupe_key(mut self, key: impl Into<String>) -> Self {
        self.dedupe_key = Some(key.into());
        self
    }

    pub fn idle(mut self, idle: bool) -> Self {
        self.idle = idle;
        self
    }

    pub fn auto_priority<F>(mut self, f: F) -> Self
    where
        F: Fn() -> i64 + Send + Sync + 'static,
    {
        self.auto_priority = Some(Arc::new(f));
        self
    }

    pub fn meta(mut self, meta: Value) -> Self {
        self.meta = meta;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Resolve all optional fields.
    pub(crate) fn normalize(self) -> QueuedTask {
        let group = self.group.unwrap_or_else(|| DEFAULT_GROUP.to_string());
        let dedupe_key = self.dedupe_key.unwrap_or_else(|| self.id.clone());
        QueuedTask {
            key: task_key(&group, &self.id),
            id: self.id,
            group,
            task: self.task,
            priority: self.priority.value(),
            delay: self.delay,
            debounce: self.debounce.filter(|d| !d.is_zero()),
            dedupe_key,
            idle: self.idle,
            auto_priority: self.auto_priority,
            meta: self.meta,
            timeout: self.timeout.filter(|t| !t.is_zero()),
        }
    }
}

impl fmt::Debug for TaskRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRequest")
            .field("id", &self.id)
            .field("group", &self.group)
            .field("priority", &self.priority)
            .field("delay", &self.delay)
            .field("debounce", &self.debounce)
            .field("dedupe_key", &self.dedupe_key)
            .finish_non_exhaustive()
    }
}

/// Normalized request: numeric priority, group and dedupe key resolved.
#[derive(Clone)]
pub struct QueuedTask {
    pub id: String,
    pub group: String,
    pub key: String,
    pub task: Task,
    pub priority: i64,
    pub delay: Duration,
    pub debounce: Option<Duration>,
    pub dedupe_key: String,
    pub idle: bool,
    pub auto_priority: Option<AutoPriority>,
    pub meta: Value,
    pub timeout: Option<Duration>,
}

impl QueuedTask {
    /// Priority to run at: `auto_priority` wins over the static value.
    pub fn final_priority(&self) -> i64 {
        self.auto_priority.as_ref().map_or(self.priority, |f| f())
    }

    pub(crate) fn context(&self, priority: i64, token: CancellationToken) -> TaskContext {
        TaskContext {
            id: self.id.clone(),
            group: self.group.clone(),
            dedupe_key: self.dedupe_key.clone(),
            meta: self.meta.clone(),
            priority,
            idle: self.idle,
            timeout: self.timeout,
            token,
        }
    }
}

impl fmt::Debug for QueuedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedTask")
            .field("key", &self.key)
            .field("priority", &self.priority)
            .field("dedupe_key", &self.dedupe_key)
            .field("idle", &self.idle)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
