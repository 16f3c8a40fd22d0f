//! # Shared Bus - Observer Fan-out for Inter-Module Notification
//!
//! Modules never call each other to announce things. They emit an [`Event`]
//! on a [`Subject`], and every registered [`Observer`] whose filter accepts
//! the event type receives it.
//!
//! ```text
//! ┌──────────────┐                        ┌──────────────┐
//! │   Module A   │                        │   Module B   │
//! │              │  notify_observers()    │  (Observer)  │
//! │              │ ──────┐                │              │
//! └──────────────┘       │                └──────────────┘
//!                        ▼                        ↑
//!                  ┌──────────────┐   on_event()  │
//!                  │ EventSubject │ ──────────────┘
//!                  └──────────────┘
//! ```
//!
//! ## Delivery Rules
//!
//! - Synchronous, in observer registration order.
//! - The observer list is snapshotted when a dispatch begins.
//! - One failing observer never stops delivery to the rest; failures are
//!   collected into a [`NotifyReport`].

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod events;
pub mod observer;
pub mod subject;

pub use events::{Event, EventFilter};
pub use observer::{FunctionalObserver, Observer, ObserverInfo};
pub use subject::{EventSubject, NotifyReport, ObserverFailure, Subject};
