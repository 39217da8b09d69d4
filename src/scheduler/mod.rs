//! Task scheduling for tq-core.
//!
//! Grouped priority runners with bounded concurrency, delay and debounce
//! timers, deduplication, per-group circuit breakers, middleware and
//! lifecycle events.

mod breaker;
mod engine;
mod events;
mod middleware;
mod priority;
mod queue;
mod task;
mod timing;

pub use breaker::{BreakerConfig, CircuitBreaker, CircuitState};
pub use engine::{Admission, CancelTarget, GroupSnapshot, Scheduler};
pub use events::{
    EventBus, EventHandler, EventKind, SchedulerEvent, SubscriptionId, DEFAULT_EVENT_CAPACITY,
};
pub use middleware::{compose, middleware_fn, Composed, Middleware, MiddlewarePipeline, Next};
pub use priority::{Priority, PriorityQueue};
pub use queue::{Job, PriorityRunner, RunnerConfig, DEFAULT_CONCURRENCY};
pub use task::{
    task_fn, task_key, AutoPriority, QueuedTask, Task, TaskContext, TaskOutput, TaskRequest,
    TaskResult, DEFAULT_GROUP,
};
pub use timing::{with_timeout, IdleYield, RuntimeIdle};
