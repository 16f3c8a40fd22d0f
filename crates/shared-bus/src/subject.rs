//! # Event Subject
//!
//! The publishing side of the bus. [`EventSubject`] keeps an ordered list of
//! observer registrations behind a reader/writer lock and dispatches each
//! event to a snapshot of that list.
//!
//! ## Ordering
//!
//! Each `notify_observers` call holds the subject's dispatch lock for its
//! whole fan-out, so two emitters never interleave deliveries. An observer
//! that emits on the same subject from inside `on_event` re-enters without
//! taking the lock again; the nested event is delivered before the outer
//! fan-out continues.

use crate::events::{Event, EventFilter};
use crate::observer::{Observer, ObserverInfo};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use shared_types::Context;
use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

tokio::task_local! {
    /// Ids of the subjects currently dispatching on this task.
    static ACTIVE_DISPATCH: RefCell<Vec<u64>>;
}

static NEXT_SUBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Operations any module may use to publish or listen.
#[async_trait]
pub trait Subject: Send + Sync {
    /// Add an observer, or replace the filter of an already registered id.
    fn register_observer(&self, observer: Arc<dyn Observer>, filter: EventFilter);

    /// Remove an observer. Returns `false` if it was not registered.
    fn unregister_observer(&self, observer_id: &str) -> bool;

    /// Deliver `event` to every matching observer, in registration order.
    async fn notify_observers(&self, ctx: &Context, event: Event) -> NotifyReport;

    /// Current registrations, in registration order.
    fn observers(&self) -> Vec<ObserverInfo>;
}

/// One observer's failure during a dispatch.
#[derive(Debug)]
pub struct ObserverFailure {
    pub observer_id: String,
    pub error: anyhow::Error,
}

/// Outcome of one `notify_observers` call.
#[derive(Debug)]
pub struct NotifyReport {
    pub event_id: Uuid,
    pub event_type: String,
    /// Observers whose `on_event` returned `Ok`, in delivery order.
    pub delivered: Vec<String>,
    /// Observers skipped because their filter rejected the event type.
    pub filtered: usize,
    pub failures: Vec<ObserverFailure>,
}

impl NotifyReport {
    fn new(event: &Event) -> Self {
        Self {
            event_id: event.id(),
            event_type: event.event_type().to_string(),
            delivered: Vec::new(),
            filtered: 0,
            failures: Vec::new(),
        }
    }

    /// `true` when no observer failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    #[must_use]
    pub fn failed_observers(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.observer_id.as_str()).collect()
    }

    /// Number of observers that were invoked, successfully or not.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failures.len()
    }
}

#[derive(Clone)]
struct Registration {
    observer: Arc<dyn Observer>,
    filter: EventFilter,
    registered_at: DateTime<Utc>,
}

/// In-process subject with synchronous fan-out.
pub struct EventSubject {
    id: u64,
    observers: RwLock<Vec<Registration>>,
    dispatch_lock: tokio::sync::Mutex<()>,
    events_dispatched: AtomicU64,
}

impl EventSubject {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_SUBJECT_ID.fetch_add(1, Ordering::Relaxed),
            observers: RwLock::new(Vec::new()),
            dispatch_lock: tokio::sync::Mutex::new(()),
            events_dispatched: AtomicU64::new(0),
        }
    }

    /// Total number of completed dispatches.
    #[must_use]
    pub fn events_dispatched(&self) -> u64 {
        self.events_dispatched.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    fn is_dispatching_here(&self) -> bool {
        ACTIVE_DISPATCH
            .try_with(|active| active.borrow().contains(&self.id))
            .unwrap_or(false)
    }

    async fn dispatch(&self, ctx: &Context, event: &Event) -> NotifyReport {
        let snapshot: Vec<Registration> = self.observers.read().clone();
        let mut report = NotifyReport::new(event);

        for registration in snapshot {
            if !registration.filter.matches(event) {
                report.filtered += 1;
                continue;
            }

            let observer_id = registration.observer.observer_id().to_string();
            match registration.observer.on_event(ctx, event).await {
                Ok(()) => report.delivered.push(observer_id),
                Err(error) => {
                    warn!(
                        observer = %observer_id,
                        event_type = %event.event_type(),
                        error = %error,
                        "Observer failed to handle event"
                    );
                    report.failures.push(ObserverFailure { observer_id, error });
                }
            }
        }

        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
        debug!(
            event_type = %event.event_type(),
            source = %event.source(),
            delivered = report.delivered.len(),
            failed = report.failures.len(),
            filtered = report.filtered,
            "Event dispatched"
        );
        report
    }
}

impl Default for EventSubject {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Subject for EventSubject {
    fn register_observer(&self, observer: Arc<dyn Observer>, filter: EventFilter) {
        let mut observers = self.observers.write();
        let id = observer.observer_id().to_string();

        if let Some(existing) = observers
            .iter_mut()
            .find(|r| r.observer.observer_id() == id)
        {
            debug!(observer = %id, "Observer already registered, updating filter");
            existing.observer = observer;
            existing.filter = filter;
            return;
        }

        debug!(observer = %id, event_types = ?filter.event_types(), "Observer registered");
        observers.push(Registration {
            observer,
            filter,
            registered_at: Utc::now(),
        });
    }

    fn unregister_observer(&self, observer_id: &str) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|r| r.observer.observer_id() != observer_id);
        let removed = observers.len() != before;
        if removed {
            debug!(observer = %observer_id, "Observer unregistered");
        }
        removed
    }

    async fn notify_observers(&self, ctx: &Context, event: Event) -> NotifyReport {
        if self.is_dispatching_here() {
            return self.dispatch(ctx, &event).await;
        }

        let _guard = self.dispatch_lock.lock().await;

        let joined = ACTIVE_DISPATCH
            .try_with(|active| active.borrow_mut().push(self.id))
            .is_ok();

        if joined {
            let report = self.dispatch(ctx, &event).await;
            let _ = ACTIVE_DISPATCH.try_with(|active| active.borrow_mut().retain(|id| *id != self.id));
            report
        } else {
            ACTIVE_DISPATCH
                .scope(RefCell::new(vec![self.id]), self.dispatch(ctx, &event))
                .await
        }
    }

    fn observers(&self) -> Vec<ObserverInfo> {
        self.observers
            .read()
            .iter()
            .map(|r| ObserverInfo::new(r.observer.observer_id(), &r.filter, r.registered_at))
            .collect()
    }
}
