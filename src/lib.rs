//! tq-core
//!
//! A client-side scheduler for asynchronous tasks. Callers submit work by
//! string id; the scheduler groups, prioritizes, delays, debounces and
//! deduplicates it, gates each group behind a circuit breaker, and runs it
//! with bounded concurrency per group.
//!
//! # Lifecycle
//!
//! Every admitted task emits `queued`, then `started` when a runner slot
//! picks it up, then exactly one of `fulfilled` or `rejected`. `cancelled`
//! and `updated` are emitted by the matching calls.
//!
//! ```no_run
//! use std::time::Duration;
//! use serde_json::json;
//! use tq_core::{task_fn, Priority, Scheduler, TaskRequest};
//!
//! # async fn demo() {
//! let scheduler = Scheduler::new();
//! scheduler.add_queue("api", 2);
//! scheduler.request(
//!     TaskRequest::new("load-user", task_fn(|_ctx| async { Ok(json!({"name": "ada"})) }))
//!         .group("api")
//!         .priority(Priority::Hot)
//!         .timeout(Duration::from_secs(5)),
//! );
//! # }
//! ```

pub mod config;
pub mod error;
pub mod scheduler;
pub mod shutdown;
pub mod telemetry;

pub use config::{GroupConfig, SchedulerConfig};
pub use error::{BoxError, SchedulerError};
pub use scheduler::{
    middleware_fn, task_fn, Admission, BreakerConfig, CancelTarget, EventKind, GroupSnapshot,
    IdleYield, Middleware, Next, Priority, Scheduler, SchedulerEvent, SubscriptionId, Task,
    TaskContext, TaskOutput, TaskRequest, TaskResult, DEFAULT_GROUP,
};
pub use shutdown::ShutdownResult;
pub use telemetry::DropReason;
