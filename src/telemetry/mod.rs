//! Telemetry for the scheduler.
//!
//! Structured logging via `tracing`, standard task spans, and counters and
//! gauges through the `metrics` facade. The library installs no exporter.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use self::metrics::{
    record_dropped, record_event, record_group_depth, record_task_duration, DropReason,
};
pub use spans::{SpanExt, TaskSpan};
