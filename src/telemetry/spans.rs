//! Tracing span covering one task execution, from `started` until it
//! settles. Admission and timers happen outside it.

use std::time::Duration;

use tracing::{field, info_span, Span};

use crate::scheduler::TaskResult;

/// Outcome label recorded on a finished task span.
fn outcome_label(result: &TaskResult) -> &'static str {
    match result {
        Ok(_) => "fulfilled",
        Err(e) if e.is_timeout() => "timed_out",
        Err(_) => "rejected",
    }
}

/// Records how a task settled onto its execution span.
pub trait SpanExt {
    fn record_outcome(&self, result: &TaskResult, elapsed: Duration);
}

impl SpanExt for Span {
    fn record_outcome(&self, result: &TaskResult, elapsed: Duration) {
        self.record("duration_ms", elapsed.as_secs_f64() * 1000.0);
        self.record("outcome", outcome_label(result));
        if let Err(e) = result {
            self.record("error", field::display(e));
        }
    }
}

/// Factory for task execution spans.
pub struct TaskSpan;

impl TaskSpan {
    /// `scheduled_task` span keyed by group and id, carrying the priority the
    /// job was started at.
    pub fn new(group: &str, id: &str, priority: i64) -> Span {
        info_span!(
            "scheduled_task",
            group = %group,
            id = %id,
            priority,
            outcome = field::Empty,
            error = field::Empty,
            duration_ms = field::Empty,
        )
    }
}
