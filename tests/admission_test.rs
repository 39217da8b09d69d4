//! Admission control: debounce, delay, dedupe, breaker and refresh.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{counting_task, failing_task, ms, ok_task, run_for, sleeping_task, Recorder};
use serde_json::json;
use tq_core::{
    Admission, BreakerConfig, DropReason, GroupSnapshot, Priority, Scheduler, SchedulerError,
    TaskRequest,
};

#[tokio::test(start_paused = true)]
async fn debounce_runs_once_with_the_latest_request() {
    let scheduler = Scheduler::new();
    let recorder = Recorder::attach(&scheduler);
    let debounced = |n: i64| TaskRequest::new("search", ok_task(json!(n))).debounce(ms(50));

    assert_eq!(scheduler.request(debounced(1)), Admission::Scheduled);
    run_for(ms(20)).await;
    assert_eq!(scheduler.request(debounced(2)), Admission::PendingUpdated);
    run_for(ms(20)).await;
    assert_eq!(scheduler.request(debounced(3)), Admission::PendingUpdated);

    // The first window would have closed at t=50; the restart moved it to t=90.
    run_for(ms(40)).await;
    assert_eq!(recorder.count("started:search"), 0);

    run_for(ms(20)).await;
    assert_eq!(recorder.log(), vec!["queued:search", "started:search", "fulfilled:search"]);
    assert_eq!(recorder.fulfilled_result("search"), Some(json!(3)));
}

#[tokio::test(start_paused = true)]
async fn delay_is_not_restarted_by_repeat_requests() {
    let scheduler = Scheduler::new();
    let recorder = Recorder::attach(&scheduler);
    let runs = Arc::new(AtomicUsize::new(0));
    let delayed = || TaskRequest::new("report", counting_task(runs.clone())).delay(ms(50));

    assert_eq!(scheduler.request(delayed()), Admission::Scheduled);
    run_for(ms(30)).await;
    assert_eq!(scheduler.request(delayed()), Admission::PendingUpdated);
    run_for(ms(25)).await;

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.count("queued:report"), 1);
    assert_eq!(recorder.count("fulfilled:report"), 1);
}

#[tokio::test(start_paused = true)]
async fn snapshot_counts_pending_timers() {
    let scheduler = Scheduler::new();
    scheduler.request(TaskRequest::new("a", ok_task(json!(1))).group("g").delay(ms(20)));
    scheduler.request(TaskRequest::new("b", ok_task(json!(2))).group("g").debounce(ms(30)));

    assert_eq!(
        scheduler.snapshot("g"),
        Some(GroupSnapshot { queued: 0, running: 0, pending: 2 })
    );

    run_for(ms(50)).await;
    assert_eq!(
        scheduler.snapshot("g"),
        Some(GroupSnapshot { queued: 0, running: 0, pending: 0 })
    );
}

#[tokio::test(start_paused = true)]
async fn shared_dedupe_key_drops_the_second_request() {
    let scheduler = Scheduler::new();
    let recorder = Recorder::attach(&scheduler);

    let first = TaskRequest::new("user-1", sleeping_task(ms(50))).dedupe_key("user");
    let second = TaskRequest::new("user-2", ok_task(json!(2))).dedupe_key("user");
    assert_eq!(scheduler.request(first), Admission::Enqueued);
    assert_eq!(
        scheduler.request(second),
        Admission::Dropped(DropReason::Deduplicated)
    );

    run_for(ms(60)).await;
    assert_eq!(recorder.count("queued:user-2"), 0);

    // The key was released when the first task settled.
    let again = TaskRequest::new("user-2", ok_task(json!(2))).dedupe_key("user");
    assert_eq!(scheduler.request(again), Admission::Enqueued);
}

#[tokio::test(start_paused = true)]
async fn pending_timer_holds_its_dedupe_key() {
    let scheduler = Scheduler::new();
    scheduler.request(TaskRequest::new("a", ok_task(json!(1))).delay(ms(20)).dedupe_key("k"));

    let other = TaskRequest::new("b", ok_task(json!(2))).dedupe_key("k");
    assert_eq!(scheduler.request(other), Admission::Dropped(DropReason::Deduplicated));
}

#[tokio::test(start_paused = true)]
async fn running_task_is_not_requested_twice() {
    let scheduler = Scheduler::new();
    let recorder = Recorder::attach(&scheduler);

    scheduler.request(TaskRequest::new("sync", sleeping_task(ms(20))));
    run_for(ms(1)).await;
    assert_eq!(
        scheduler.request(TaskRequest::new("sync", sleeping_task(ms(20)))),
        Admission::Dropped(DropReason::Deduplicated)
    );

    run_for(ms(30)).await;
    assert_eq!(recorder.count("started:sync"), 1);
}

#[tokio::test(start_paused = true)]
async fn repeat_request_in_backlog_updates_priority_in_place() {
    let scheduler = Scheduler::new();
    scheduler.add_queue("g", 1);
    let recorder = Recorder::attach(&scheduler);

    scheduler.request(TaskRequest::new("blocker", sleeping_task(ms(10))).group("g"));
    scheduler.request(TaskRequest::new("a", ok_task(json!(1))).group("g").priority(5_i64));
    scheduler.request(TaskRequest::new("x", ok_task(json!(1))).group("g").priority(10_i64));
    assert_eq!(
        scheduler.request(TaskRequest::new("x", ok_task(json!(1))).group("g").priority(Priority::Hot)),
        Admission::Reprioritized
    );
    assert_eq!(scheduler.snapshot("g").map(|s| s.queued), Some(2));
    run_for(ms(50)).await;

    assert_eq!(recorder.count("updated:x"), 1);
    assert_eq!(recorder.count("started:x"), 1);
    assert_eq!(recorder.started(), vec!["blocker", "x", "a"]);
}

#[tokio::test(start_paused = true)]
async fn settled_task_can_be_requested_fresh() {
    let scheduler = Scheduler::new();
    let runs = Arc::new(AtomicUsize::new(0));

    scheduler.request(TaskRequest::new("a", counting_task(runs.clone())));
    assert!(scheduler.is_tracked("a", tq_core::DEFAULT_GROUP));
    run_for(ms(1)).await;
    assert!(!scheduler.is_tracked("a", tq_core::DEFAULT_GROUP));

    assert_eq!(
        scheduler.request(TaskRequest::new("a", counting_task(runs.clone()))),
        Admission::Enqueued
    );
    run_for(ms(1)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_task_releases_its_markers() {
    let scheduler = Scheduler::new();
    let recorder = Recorder::attach(&scheduler);

    scheduler.request(TaskRequest::new("a", failing_task("boom")));
    run_for(ms(1)).await;
    assert_eq!(recorder.rejection("a").map(|e| e.to_string()), Some("boom".to_string()));
    assert!(!scheduler.is_tracked("a", tq_core::DEFAULT_GROUP));
    assert_eq!(
        scheduler.request(TaskRequest::new("a", ok_task(json!(1)))),
        Admission::Enqueued
    );
}

#[tokio::test(start_paused = true)]
async fn breaker_drops_admissions_after_max_failures() {
    let scheduler = Scheduler::new();
    scheduler.configure_group("flaky", BreakerConfig::new(2, Duration::from_secs(1)));
    let recorder = Recorder::attach(&scheduler);

    for id in ["f1", "f2"] {
        scheduler.request(TaskRequest::new(id, failing_task("down")).group("flaky"));
        run_for(ms(1)).await;
    }
    assert_eq!(
        scheduler.request(TaskRequest::new("f3", failing_task("down")).group("flaky")),
        Admission::Dropped(DropReason::BreakerOpen)
    );
    run_for(ms(1)).await;

    assert_eq!(recorder.started(), vec!["f1", "f2"]);
    assert_eq!(recorder.count("queued:f3"), 0);
    assert_eq!(recorder.count("rejected:f3"), 0);
    assert_eq!(scheduler.breaker_state("flaky").map(|s| s.failure_count), Some(2));

    // Other groups are unaffected.
    assert_eq!(
        scheduler.request(TaskRequest::new("ok", ok_task(json!(1)))),
        Admission::Enqueued
    );
}

#[tokio::test(start_paused = true)]
async fn breaker_closes_after_cooldown_and_success_clears_it() {
    let scheduler = Scheduler::new();
    scheduler.configure_group("flaky", BreakerConfig::new(1, ms(500)));

    scheduler.request(TaskRequest::new("f1", failing_task("down")).group("flaky"));
    run_for(ms(1)).await;
    assert!(!scheduler
        .request(TaskRequest::new("f2", ok_task(json!(1))).group("flaky"))
        .is_admitted());

    run_for(ms(600)).await;
    assert_eq!(
        scheduler.request(TaskRequest::new("f2", ok_task(json!(1))).group("flaky")),
        Admission::Enqueued
    );
    run_for(ms(1)).await;
    assert!(scheduler.breaker_state("flaky").is_none());
}

#[tokio::test(start_paused = true)]
async fn breaker_is_checked_again_when_a_job_starts() {
    let scheduler = Scheduler::new();
    scheduler.add_queue("flaky", 1);
    scheduler.configure_group("flaky", BreakerConfig::new(2, Duration::from_secs(1)));
    let recorder = Recorder::attach(&scheduler);

    for id in ["f1", "f2", "f3"] {
        assert_eq!(
            scheduler.request(TaskRequest::new(id, failing_task("down")).group("flaky")),
            Admission::Enqueued
        );
    }
    run_for(ms(10)).await;

    assert_eq!(recorder.started(), vec!["f1", "f2"]);
    assert_eq!(recorder.count("rejected:f3"), 0);
    assert!(!scheduler.is_tracked("f3", "flaky"));
}

#[tokio::test(start_paused = true)]
async fn refresh_replays_the_last_request() {
    let scheduler = Scheduler::new();
    let runs = Arc::new(AtomicUsize::new(0));

    scheduler.request(TaskRequest::new("feed", counting_task(runs.clone())).delay(ms(20)));
    assert_eq!(scheduler.cancel(tq_core::CancelTarget::id("feed")), 1);
    run_for(ms(30)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    let admission = scheduler.refresh("feed", tq_core::DEFAULT_GROUP).unwrap();
    assert_eq!(admission, Admission::Scheduled);
    run_for(ms(30)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // A completed run releases the remembered request.
    let err = scheduler.refresh("feed", tq_core::DEFAULT_GROUP).unwrap_err();
    assert!(matches!(err, SchedulerError::NoPriorRequest(_)));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn refresh_after_cancelling_a_running_task() {
    let scheduler = Scheduler::new();
    let recorder = Recorder::attach(&scheduler);

    scheduler.request(TaskRequest::new("feed", sleeping_task(Duration::from_secs(1))));
    run_for(ms(1)).await;
    assert_eq!(scheduler.cancel(tq_core::CancelTarget::id("feed")), 1);

    // The cancelled body ignores its token and is still running.
    let admission = scheduler.refresh("feed", tq_core::DEFAULT_GROUP).unwrap();
    assert_eq!(admission, Admission::Enqueued);
    assert_eq!(
        scheduler.request(TaskRequest::new("feed", sleeping_task(ms(1)))),
        Admission::Dropped(DropReason::Deduplicated)
    );

    run_for(ms(1_100)).await;
    assert_eq!(recorder.count("started:feed"), 2);
    assert_eq!(recorder.count("fulfilled:feed"), 2);
    assert!(!scheduler.is_tracked("feed", tq_core::DEFAULT_GROUP));
}

#[tokio::test(start_paused = true)]
async fn fresh_request_after_cancelling_a_running_task() {
    let scheduler = Scheduler::new();
    let runs = Arc::new(AtomicUsize::new(0));

    scheduler.request(TaskRequest::new("sync", sleeping_task(Duration::from_secs(1))));
    run_for(ms(1)).await;
    scheduler.cancel(tq_core::CancelTarget::id("sync"));

    assert_eq!(
        scheduler.request(TaskRequest::new("sync", counting_task(runs.clone()))),
        Admission::Enqueued
    );
    run_for(ms(1)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn refresh_of_unknown_id_fails() {
    let scheduler = Scheduler::new();
    let err = scheduler.refresh("nope", tq_core::DEFAULT_GROUP).unwrap_err();
    assert!(matches!(err, SchedulerError::NoPriorRequest(_)));
    assert_eq!(err.to_string(), "No prior request() for id 'nope'");
}
