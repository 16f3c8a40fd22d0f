//! # Operation Context
//!
//! A [`Context`] travels with every lifecycle call and event dispatch. It
//! carries an advisory cancellation signal and, for tenant-scoped work,
//! exactly one [`TenantId`].
//!
//! Cancellation is cooperative: callees are expected to observe it, the
//! runtime never aborts a callee on their behalf.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Opaque tenant identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Create a tenant identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TenantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for TenantId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Per-operation context.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancel: CancellationToken,
    tenant: Option<TenantId>,
}

impl Context {
    /// A fresh, uncancelled context with no tenant.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing cancellation token.
    #[must_use]
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            tenant: None,
        }
    }

    /// Derive a context scoped to `tenant`.
    ///
    /// The receiver is left untouched; the derived context shares its
    /// cancellation signal. Any tenant already carried is replaced, so a
    /// context never holds more than one tenant.
    #[must_use]
    pub fn with_tenant(&self, tenant: impl Into<TenantId>) -> Self {
        Self {
            cancel: self.cancel.clone(),
            tenant: Some(tenant.into()),
        }
    }

    /// Derive a context whose cancellation can be triggered independently.
    ///
    /// Cancelling the parent still cancels the child.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            tenant: self.tenant.clone(),
        }
    }

    /// The tenant this context is scoped to, if any.
    #[must_use]
    pub fn tenant(&self) -> Option<&TenantId> {
        self.tenant.as_ref()
    }

    /// Signal cancellation to everything holding this context.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the context is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}
