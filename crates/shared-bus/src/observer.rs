//! # Observers
//!
//! The receiving side of the bus.

use crate::events::{Event, EventFilter};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use shared_types::Context;
use std::fmt;

/// Something that wants to be told about events.
#[async_trait]
pub trait Observer: Send + Sync {
    /// Stable identity used for unregistration and reporting.
    fn observer_id(&self) -> &str;

    /// Handle one event.
    ///
    /// An error is recorded against this observer only; delivery to the
    /// remaining observers continues.
    async fn on_event(&self, ctx: &Context, event: &Event) -> anyhow::Result<()>;
}

/// Introspection record for one registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObserverInfo {
    pub observer_id: String,
    /// Accepted event types; empty means all.
    pub event_types: Vec<String>,
    pub registered_at: DateTime<Utc>,
}

impl ObserverInfo {
    pub(crate) fn new(observer_id: &str, filter: &EventFilter, registered_at: DateTime<Utc>) -> Self {
        Self {
            observer_id: observer_id.to_string(),
            event_types: filter.event_types(),
            registered_at,
        }
    }
}

type Handler = Box<dyn Fn(&Context, &Event) -> anyhow::Result<()> + Send + Sync>;

/// Observer backed by a closure.
pub struct FunctionalObserver {
    id: String,
    handler: Handler,
}

impl FunctionalObserver {
    pub fn new<F>(id: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Context, &Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            handler: Box::new(handler),
        }
    }
}

impl fmt::Debug for FunctionalObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionalObserver")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Observer for FunctionalObserver {
    fn observer_id(&self) -> &str {
        &self.id
    }

    async fn on_event(&self, ctx: &Context, event: &Event) -> anyhow::Result<()> {
        (self.handler)(ctx, event)
    }
}
