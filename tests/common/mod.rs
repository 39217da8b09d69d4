//! Shared helpers for scheduler integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tq_core::{task_fn, EventKind, Scheduler, SchedulerError, SchedulerEvent, Task};

pub const ALL_KINDS: [EventKind; 6] = [
    EventKind::Queued,
    EventKind::Started,
    EventKind::Fulfilled,
    EventKind::Rejected,
    EventKind::Cancelled,
    EventKind::Updated,
];

pub fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Let spawned work run; under paused time this also advances the clock.
pub async fn run_for(duration: Duration) {
    tokio::time::sleep(duration).await;
}

pub fn ok_task(value: Value) -> Task {
    task_fn(move |_| {
        let value = value.clone();
        async move { Ok(value) }
    })
}

pub fn failing_task(message: &'static str) -> Task {
    task_fn(move |_| async move { Err::<Value, _>(SchedulerError::task(message)) })
}

pub fn sleeping_task(duration: Duration) -> Task {
    task_fn(move |ctx| async move {
        tokio::time::sleep(duration).await;
        Ok(json!(ctx.id))
    })
}

pub fn counting_task(counter: Arc<AtomicUsize>) -> Task {
    task_fn(move |_| {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        async move { Ok(json!(n)) }
    })
}

/// Records every event as `"kind:id"`.
#[derive(Clone, Default)]
pub struct Recorder {
    log: Arc<Mutex<Vec<String>>>,
    events: Arc<Mutex<Vec<SchedulerEvent>>>,
}

impl Recorder {
    pub fn attach(scheduler: &Scheduler) -> Self {
        let recorder = Self::default();
        for kind in ALL_KINDS {
            let r = recorder.clone();
            scheduler.on(kind, move |event| {
                r.log
                    .lock()
                    .push(format!("{}:{}", event.kind().as_str(), event.id()));
                r.events.lock().push(event.clone());
            });
        }
        recorder
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.log.lock().iter().filter(|e| *e == entry).count()
    }

    /// Ids of `started` events, in order.
    pub fn started(&self) -> Vec<String> {
        self.log
            .lock()
            .iter()
            .filter_map(|e| e.strip_prefix("started:").map(str::to_string))
            .collect()
    }

    pub fn events(&self) -> Vec<SchedulerEvent> {
        self.events.lock().clone()
    }

    pub fn fulfilled_result(&self, id: &str) -> Option<Value> {
        self.events.lock().iter().find_map(|e| match e {
            SchedulerEvent::Fulfilled { id: got, result, .. } if got == id => Some(result.clone()),
            _ => None,
        })
    }

    pub fn rejection(&self, id: &str) -> Option<SchedulerError> {
        self.events.lock().iter().find_map(|e| match e {
            SchedulerEvent::Rejected { id: got, error, .. } if got == id => Some(error.clone()),
            _ => None,
        })
    }
}
