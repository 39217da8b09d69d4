//! Scheduler metrics through the `metrics` facade.
//!
//! Every series is labeled by group. Without an installed recorder these
//! calls are no-ops.

use metrics::{counter, gauge, histogram};

use crate::scheduler::{EventKind, SchedulerEvent};

/// Why an admission was discarded without running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    BreakerOpen,
    Deduplicated,
    ShuttingDown,
}

impl DropReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BreakerOpen => "breaker_open",
            Self::Deduplicated => "deduplicated",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

/// Count one lifecycle event.
pub fn record_event(event: &SchedulerEvent) {
    let name = match event.kind() {
        EventKind::Queued => "tq_tasks_queued_total",
        EventKind::Started => "tq_tasks_started_total",
        EventKind::Fulfilled => "tq_tasks_fulfilled_total",
        EventKind::Rejected => "tq_tasks_rejected_total",
        EventKind::Cancelled => "tq_tasks_cancelled_total",
        EventKind::Updated => "tq_tasks_reprioritized_total",
    };
    counter!(name, "group" => event.group().to_string()).increment(1);
}

pub fn record_dropped(group: &str, reason: DropReason) {
    counter!(
        "tq_tasks_dropped_total",
        "group" => group.to_string(),
        "reason" => reason.as_str()
    )
    .increment(1);
}

pub fn record_group_depth(group: &str, queued: usize, running: usize) {
    gauge!("tq_group_queued", "group" => group.to_string()).set(queued as f64);
    gauge!("tq_group_running", "group" => group.to_string()).set(running as f64);
}

pub fn record_task_duration(group: &str, duration_ms: f64) {
    histogram!("tq_task_duration_ms", "group" => group.to_string()).record(duration_ms);
}
