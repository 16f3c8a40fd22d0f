//! # Application Lifecycle State
//!
//! ```text
//! Created → Initializing → Initialized → Starting → Running → Stopping → Stopped
//!                │                           │                   ↑
//!                └──────────► Failed ◄───────┘───────────────────┘
//! ```
//!
//! Transitions only move forward. `Stopped` is terminal: restarting means
//! building a new application.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Process-wide lifecycle state of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Modules and config sections may still be registered.
    Created,
    /// Init phase in progress.
    Initializing,
    /// Every module initialized.
    Initialized,
    /// Start phase in progress.
    Starting,
    /// Every module started.
    Running,
    /// Resolution, Init or Start failed. Only `stop` is accepted.
    Failed,
    /// Stop phase in progress.
    Stopping,
    /// Terminal.
    Stopped,
}

impl LifecycleState {
    /// Whether `next` is a legal successor of `self`.
    #[must_use]
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Created, Initializing)
                | (Initializing, Initialized)
                | (Initializing, Failed)
                | (Initialized, Starting)
                | (Initialized, Stopping)
                | (Starting, Running)
                | (Starting, Failed)
                | (Running, Stopping)
                | (Failed, Stopping)
                | (Stopping, Stopped)
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == LifecycleState::Stopped
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "Created",
            Self::Initializing => "Initializing",
            Self::Initialized => "Initialized",
            Self::Starting => "Starting",
            Self::Running => "Running",
            Self::Failed => "Failed",
            Self::Stopping => "Stopping",
            Self::Stopped => "Stopped",
        };
        f.write_str(name)
    }
}
