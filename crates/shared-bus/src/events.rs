//! # Events
//!
//! An [`Event`] is an immutable notification with a reverse-domain type,
//! the name of its emitter and an opaque JSON payload. Events exist only for
//! the duration of one dispatch; nothing is retained or replayed.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

// =============================================================================
// RUNTIME EVENT TYPES
// =============================================================================

/// A module's Init returned successfully.
pub const MODULE_INITIALIZED: &str = "com.modulith.module.initialized";
/// A module's Start returned successfully.
pub const MODULE_STARTED: &str = "com.modulith.module.started";
/// A module's Stop returned successfully.
pub const MODULE_STOPPED: &str = "com.modulith.module.stopped";
/// A module's Init, Start or Stop returned an error.
pub const MODULE_FAILED: &str = "com.modulith.module.failed";
/// A service became visible in the registry.
pub const SERVICE_REGISTERED: &str = "com.modulith.service.registered";
/// Every module started.
pub const APPLICATION_STARTED: &str = "com.modulith.application.started";
/// The stop phase completed.
pub const APPLICATION_STOPPED: &str = "com.modulith.application.stopped";
/// A new tenant was registered.
pub const TENANT_REGISTERED: &str = "com.modulith.tenant.registered";
/// A tenant section was added or replaced.
pub const TENANT_CONFIG_UPDATED: &str = "com.modulith.tenant.config.updated";

/// A notification flowing through a subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    id: Uuid,
    #[serde(rename = "type")]
    event_type: String,
    source: String,
    timestamp: DateTime<Utc>,
    data: serde_json::Value,
}

impl Event {
    /// Create an event stamped with a fresh id and the current time.
    pub fn new(
        event_type: impl Into<String>,
        source: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            source: source.into(),
            timestamp: Utc::now(),
            data,
        }
    }

    /// Create an event whose payload is any serializable value.
    pub fn with_payload<T: Serialize>(
        event_type: impl Into<String>,
        source: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(event_type, source, serde_json::to_value(payload)?))
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    #[must_use]
    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }

    /// Decode the payload into a typed value.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}

/// Allow-list of event types. Empty accepts everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    event_types: BTreeSet<String>,
}

impl EventFilter {
    /// A filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// A filter for specific event types.
    pub fn types<I, S>(event_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            event_types: event_types.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn accepts_all(&self) -> bool {
        self.event_types.is_empty()
    }

    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        self.accepts_type(event.event_type())
    }

    #[must_use]
    pub fn accepts_type(&self, event_type: &str) -> bool {
        self.event_types.is_empty() || self.event_types.contains(event_type)
    }

    /// Accepted types in sorted order; empty when accepting all.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.event_types.iter().cloned().collect()
    }
}
