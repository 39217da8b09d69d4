//! Lifecycle event bus.
//!
//! Handlers registered with [`EventBus::on`] are called synchronously, in
//! registration order, at emission time. A panicking handler is isolated and
//! logged; it never reaches the scheduler. Async consumers can instead
//! [`EventBus::subscribe`] to a broadcast channel that sees every event.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::warn;

use super::task::TaskOutput;
use crate::error::SchedulerError;
use crate::telemetry;

/// Default broadcast channel capacity (events).
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// The kinds of lifecycle signal a task goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Queued,
    Started,
    Fulfilled,
    Rejected,
    Cancelled,
    Updated,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Started => "started",
            Self::Fulfilled => "fulfilled",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::Updated => "updated",
        }
    }
}

/// A lifecycle signal for one task.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    Queued { group: String, id: String },
    Started { group: String, id: String },
    Fulfilled { group: String, id: String, result: TaskOutput },
    Rejected { group: String, id: String, error: SchedulerError },
    Cancelled { group: String, id: String },
    Updated { group: String, id: String, priority: i64 },
}

impl SchedulerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Queued { .. } => EventKind::Queued,
            Self::Started { .. } => EventKind::Started,
            Self::Fulfilled { .. } => EventKind::Fulfilled,
            Self::Rejected { .. } => EventKind::Rejected,
            Self::Cancelled { .. } => EventKind::Cancelled,
            Self::Updated { .. } => EventKind::Updated,
        }
    }

    pub fn group(&self) -> &str {
        match self {
            Self::Queued { group, .. }
            | Self::Started { group, .. }
            | Self::Fulfilled { group, .. }
            | Self::Rejected { group, .. }
            | Self::Cancelled { group, .. }
            | Self::Updated { group, .. } => group,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Queued { id, .. }
            | Self::Started { id, .. }
            | Self::Fulfilled { id, .. }
            | Self::Rejected { id, .. }
            | Self::Cancelled { id, .. }
            | Self::Updated { id, .. } => id,
        }
    }
}

/// Synchronous event handler.
pub type EventHandler = Arc<dyn Fn(&SchedulerEvent) + Send + Sync>;

/// Handle returned by [`EventBus::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Typed publish/subscribe channel for scheduler lifecycle events.
pub struct EventBus {
    handlers: RwLock<HashMap<EventKind, Vec<(SubscriptionId, EventHandler)>>>,
    next_id: AtomicU64,
    tx: broadcast::Sender<SchedulerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            tx,
        }
    }

    /// Register a handler for one kind of event.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&SchedulerEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handler: EventHandler = Arc::new(handler);
        self.handlers.write().entry(kind).or_default().push((id, handler));
        id
    }

    /// Remove a handler. Returns false if it was not registered for `kind`.
    pub fn off(&self, kind: EventKind, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write();
        let Some(list) = handlers.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(sub, _)| *sub != id);
        before != list.len()
    }

    /// Receive every event emitted after this call.
    ///
    /// Slow receivers lose the oldest events once the channel is full.
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.tx.subscribe()
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.read().get(&kind).map_or(0, Vec::len)
    }

    /// Deliver an event to all current handlers and subscribers.
    pub fn emit(&self, event: SchedulerEvent) {
        telemetry::record_event(&event);
        let handlers: Vec<EventHandler> = self
            .handlers
            .read()
            .get(&event.kind())
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                warn!(
                    event = event.kind().as_str(),
                    group = event.group(),
                    id = event.id(),
                    "event handler panicked"
                );
            }
        }

        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.tx.receiver_count())
            .finish_non_exhaustive()
    }
}
