//! Page lifecycle events that trigger refreshes.
//!
//! ```text
//!     Trigger              Delay     Forced
//!     ─────────────────    ──────    ──────
//!     visibility change    1000ms    no      (only when becoming visible)
//!     window focus          500ms    no
//!     page show            1000ms    yes     (only when restored from cache)
//!     manual                  0ms    yes
//!     component mount       100ms    no
//! ```
//!
//! Refreshes started from events are fire-and-forget. A burst of events does
//! not queue work: the throttle and the in-progress guard reject the extras.

use super::config::RefreshDelays;
use super::orchestrator::{RefreshOrchestrator, RefreshRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A page lifecycle event delivered by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEvent {
    /// Document visibility changed.
    VisibilityChange {
        /// `true` when the page became visible.
        visible: bool,
    },
    /// The window gained focus.
    Focus,
    /// The page was shown.
    PageShow {
        /// `true` when restored from the back-forward cache.
        persisted: bool,
    },
    /// An ad component mounted.
    Mount,
}

impl PageEvent {
    /// The trigger this event maps to, if it should refresh at all.
    pub fn trigger(&self) -> Option<RefreshTrigger> {
        match *self {
            PageEvent::VisibilityChange { visible: true } => Some(RefreshTrigger::VisibilityChange),
            PageEvent::VisibilityChange { visible: false } => None,
            PageEvent::Focus => Some(RefreshTrigger::Focus),
            PageEvent::PageShow { persisted: true } => Some(RefreshTrigger::PageShow),
            PageEvent::PageShow { persisted: false } => None,
            PageEvent::Mount => Some(RefreshTrigger::ComponentMount),
        }
    }
}

/// Why a refresh was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    /// Page became visible.
    VisibilityChange,
    /// Window gained focus.
    Focus,
    /// Page restored from cache.
    PageShow,
    /// User action.
    Manual,
    /// Ad component mounted.
    ComponentMount,
}

impl RefreshTrigger {
    /// Delay before refreshing.
    pub const fn delay(self) -> Duration {
        match self {
            RefreshTrigger::VisibilityChange => RefreshDelays::VISIBILITY_CHANGE,
            RefreshTrigger::Focus => RefreshDelays::FOCUS,
            RefreshTrigger::PageShow => RefreshDelays::PAGE_SHOW,
            RefreshTrigger::Manual => RefreshDelays::MANUAL,
            RefreshTrigger::ComponentMount => RefreshDelays::COMPONENT_MOUNT,
        }
    }

    /// Whether the refresh bypasses the throttle and guard.
    pub const fn is_forced(self) -> bool {
        matches!(self, RefreshTrigger::PageShow | RefreshTrigger::Manual)
    }

    /// The request this trigger issues.
    ///
    /// ```rust
    /// use adrefresh::RefreshTrigger;
    /// use std::time::Duration;
    ///
    /// let request = RefreshTrigger::Focus.request();
    /// assert_eq!(request.delay(), Duration::from_millis(500));
    /// assert!(!request.is_forced());
    /// ```
    pub fn request(self) -> RefreshRequest {
        RefreshRequest::new()
            .with_force(self.is_forced())
            .with_delay(self.delay())
            .with_clear_cache(true)
    }
}

impl RefreshOrchestrator {
    /// Refreshes in response to page events until the channel closes.
    ///
    /// Each triggering event spawns its own refresh and is not awaited.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn setup_auto_refresh(self: Arc<Self>, mut events: mpsc::Receiver<PageEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Auto ad refresh setup completed");

            while let Some(event) = events.recv().await {
                let Some(trigger) = event.trigger() else {
                    debug!("Ignoring page event {:?}", event);
                    continue;
                };

                debug!("Page event {:?} triggers {:?} refresh", event, trigger);
                let orchestrator = Arc::clone(&self);
                tokio::spawn(async move {
                    orchestrator.refresh(trigger.request()).await;
                });
            }

            debug!("Page event channel closed, auto refresh stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_mapping() {
        assert_eq!(
            PageEvent::VisibilityChange { visible: true }.trigger(),
            Some(RefreshTrigger::VisibilityChange)
        );
        assert_eq!(PageEvent::VisibilityChange { visible: false }.trigger(), None);
        assert_eq!(PageEvent::Focus.trigger(), Some(RefreshTrigger::Focus));
        assert_eq!(
            PageEvent::PageShow { persisted: true }.trigger(),
            Some(RefreshTrigger::PageShow)
        );
        assert_eq!(PageEvent::PageShow { persisted: false }.trigger(), None);
        assert_eq!(PageEvent::Mount.trigger(), Some(RefreshTrigger::ComponentMount));
    }

    #[test]
    fn test_trigger_requests() {
        let page_show = RefreshTrigger::PageShow.request();
        assert!(page_show.is_forced());
        assert_eq!(page_show.delay(), Duration::from_millis(1_000));

        let manual = RefreshTrigger::Manual.request();
        assert!(manual.is_forced());
        assert!(manual.clear_cache());
        assert!(manual.delay().is_zero());

        let mount = RefreshTrigger::ComponentMount.request();
        assert!(!mount.is_forced());
        assert_eq!(mount.delay(), Duration::from_millis(100));
    }
}
