//! Graceful scheduler shutdown.

mod common;

use std::time::Duration;

use common::{ms, ok_task, run_for, sleeping_task, Recorder};
use serde_json::json;
use tq_core::shutdown::{ShutdownCoordinator, ShutdownState};
use tq_core::{Admission, DropReason, Scheduler, SchedulerConfig, ShutdownResult, TaskRequest};

#[tokio::test(start_paused = true)]
async fn shutdown_waits_for_running_tasks() {
    let scheduler = Scheduler::new();
    let recorder = Recorder::attach(&scheduler);

    scheduler.request(TaskRequest::new("work", sleeping_task(ms(50))));
    run_for(ms(1)).await;

    let result = scheduler.shutdown(Duration::from_secs(1)).await;

    assert_eq!(result, ShutdownResult::Complete);
    assert_eq!(recorder.count("fulfilled:work"), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_clears_pending_timers() {
    let scheduler = Scheduler::new();
    let recorder = Recorder::attach(&scheduler);

    scheduler.request(TaskRequest::new("later", ok_task(json!(1))).delay(ms(100)));
    let result = scheduler.shutdown(Duration::from_secs(1)).await;
    run_for(ms(200)).await;

    assert_eq!(result, ShutdownResult::Complete);
    assert_eq!(recorder.log(), vec!["queued:later", "cancelled:later"]);
}

#[tokio::test(start_paused = true)]
async fn shutdown_drains_the_backlog() {
    let scheduler = Scheduler::new();
    scheduler.add_queue("g", 1);
    let recorder = Recorder::attach(&scheduler);

    for id in ["a", "b", "c"] {
        scheduler.request(TaskRequest::new(id, sleeping_task(ms(10))).group("g"));
    }
    let result = scheduler.shutdown(Duration::from_secs(1)).await;

    assert_eq!(result, ShutdownResult::Complete);
    assert_eq!(recorder.started(), vec!["a", "b", "c"]);
}

#[tokio::test(start_paused = true)]
async fn shutdown_times_out_on_slow_tasks() {
    let scheduler = Scheduler::new();
    scheduler.request(TaskRequest::new("stuck", sleeping_task(Duration::from_secs(60))));
    run_for(ms(1)).await;

    let result = scheduler.shutdown(ms(100)).await;

    assert_eq!(result, ShutdownResult::Timeout { remaining: 1 });
}

#[tokio::test(start_paused = true)]
async fn close_uses_the_configured_timeout() {
    let config = SchedulerConfig { shutdown_timeout: ms(100), ..SchedulerConfig::default() };
    let scheduler = Scheduler::with_config(config);
    scheduler.request(TaskRequest::new("stuck", sleeping_task(Duration::from_secs(60))));
    run_for(ms(1)).await;

    let started = tokio::time::Instant::now();
    let result = scheduler.close().await;

    assert_eq!(result, ShutdownResult::Timeout { remaining: 1 });
    let waited = started.elapsed();
    assert!(waited >= ms(100) && waited < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn requests_after_shutdown_are_dropped() {
    let scheduler = Scheduler::new();
    let recorder = Recorder::attach(&scheduler);
    scheduler.shutdown(ms(10)).await;

    let admission = scheduler.request(TaskRequest::new("late", ok_task(json!(1))));

    assert_eq!(admission, Admission::Dropped(DropReason::ShuttingDown));
    assert!(recorder.log().is_empty());
}

#[tokio::test]
async fn coordinator_state_transitions() {
    let coordinator = ShutdownCoordinator::new();
    assert_eq!(coordinator.state(), ShutdownState::Running);

    let guard = coordinator.track();
    assert!(guard.is_some());
    coordinator.begin_drain();
    assert_eq!(coordinator.state(), ShutdownState::Draining);
    assert!(coordinator.track().is_none());

    drop(guard);
    assert_eq!(coordinator.initiate(ms(10)).await, ShutdownResult::Complete);
    assert_eq!(coordinator.state(), ShutdownState::Stopped);
}
