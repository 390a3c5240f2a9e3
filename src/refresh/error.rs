//! # Refresh Error Taxonomy
//!
//! Every failed refresh carries a [`RefreshError`]: a closed [`RefreshErrorKind`]
//! plus a `retryable` flag the orchestrator uses to decide whether to try again.
//!
//! ```text
//!     Kind          Typical cause                          Retryable
//!     ──────────    ───────────────────────────────────    ─────────
//!     Timeout       adapter budget exceeded                yes
//!                   throttled (too frequent)               no
//!     Provider      refresh already in progress            yes
//!                   no active provider                     no
//!     ScriptLoad    vendor entry point failed              yes
//!                   vendor library missing                 no
//!     Network       transport failure                      yes
//!     Cache         response cache failure                 yes
//! ```
//!
//! Kinds default to retryable; the named constructors below encode the
//! exceptions.

use super::provider::Provider;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Category of a refresh failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RefreshErrorKind {
    /// Transport-level failure.
    Network,
    /// Vendor script missing or its entry point failed.
    ScriptLoad,
    /// Dispatch problem: no provider, or a refresh already running.
    Provider,
    /// Response cache failure.
    Cache,
    /// Timeout budget exceeded, or a throttle rejection.
    Timeout,
}

impl RefreshErrorKind {
    /// Every kind, in declaration order.
    pub const ALL: [RefreshErrorKind; 5] = [
        RefreshErrorKind::Network,
        RefreshErrorKind::ScriptLoad,
        RefreshErrorKind::Provider,
        RefreshErrorKind::Cache,
        RefreshErrorKind::Timeout,
    ];

    /// Stable identifier used in logs and exported events.
    pub const fn as_str(self) -> &'static str {
        match self {
            RefreshErrorKind::Network => "NETWORK_ERROR",
            RefreshErrorKind::ScriptLoad => "SCRIPT_LOAD_ERROR",
            RefreshErrorKind::Provider => "PROVIDER_ERROR",
            RefreshErrorKind::Cache => "CACHE_ERROR",
            RefreshErrorKind::Timeout => "TIMEOUT_ERROR",
        }
    }

    /// Retryability when no constructor says otherwise.
    #[inline]
    pub const fn default_retryable(self) -> bool {
        true
    }
}

impl fmt::Display for RefreshErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified refresh failure.
///
/// ```rust
/// use adrefresh::{RefreshError, RefreshErrorKind};
///
/// let err = RefreshError::throttled("adsense");
/// assert_eq!(err.kind(), RefreshErrorKind::Timeout);
/// assert!(!err.is_retryable());
///
/// let err = RefreshError::new(RefreshErrorKind::Network, "connection reset");
/// assert!(err.is_retryable());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct RefreshError {
    kind: RefreshErrorKind,
    message: String,
    provider: Option<String>,
    retryable: bool,
}

impl RefreshError {
    /// Creates an error with the kind's default retryability.
    pub fn new(kind: RefreshErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            provider: None,
            retryable: kind.default_retryable(),
        }
    }

    /// Attaches the provider the failure relates to.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Overrides retryability.
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Refresh requested before the minimum interval elapsed.
    pub fn throttled(provider: &str) -> Self {
        Self::new(RefreshErrorKind::Timeout, "Ad refresh skipped - too frequent")
            .with_provider(provider)
            .with_retryable(false)
    }

    /// Another refresh holds the guard.
    pub fn in_progress(provider: &str) -> Self {
        Self::new(RefreshErrorKind::Provider, "Ad refresh already in progress")
            .with_provider(provider)
    }

    /// Configuration names no provider, so there is nothing to dispatch to.
    pub fn no_active_provider(provider: &str) -> Self {
        Self::new(RefreshErrorKind::Provider, "No active ad provider found")
            .with_provider(provider)
            .with_retryable(false)
    }

    /// The adapter did not settle within its budget.
    pub fn timed_out(provider: &str, budget: Duration) -> Self {
        Self::new(
            RefreshErrorKind::Timeout,
            format!("Ad refresh timeout after {}ms", budget.as_millis()),
        )
        .with_provider(provider)
    }

    /// The vendor library is not loaded on the page.
    pub fn library_missing(provider: Provider) -> Self {
        Self::new(
            RefreshErrorKind::ScriptLoad,
            format!("{} not available", provider.display_name()),
        )
        .with_provider(provider.name())
        .with_retryable(false)
    }

    /// Clearing containers or calling the vendor entry point failed.
    pub fn entry_point_failed(provider: Provider, reason: impl fmt::Display) -> Self {
        Self::new(
            RefreshErrorKind::ScriptLoad,
            format!("{} refresh failed: {}", provider.display_name(), reason),
        )
        .with_provider(provider.name())
    }

    /// The adapter task ended abnormally (panicked or was aborted).
    pub fn adapter_crashed(provider: Provider, reason: impl fmt::Display) -> Self {
        Self::new(
            RefreshErrorKind::Provider,
            format!("{} adapter crashed: {}", provider.display_name(), reason),
        )
        .with_provider(provider.name())
    }

    /// Failure category.
    #[inline]
    pub fn kind(&self) -> RefreshErrorKind {
        self.kind
    }

    /// Human-readable description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Provider involved, if known.
    #[inline]
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// Whether the orchestrator may try again.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}
