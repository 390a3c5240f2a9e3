//! The page as seen by provider adapters.
//!
//! Adapters never touch markup or vendor scripts directly. They clear
//! containers and issue reinitialization calls through [`AdSurface`], which a
//! host binds to the real page (or, in tests, to [`InMemorySurface`]).

use super::provider::Provider;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Which ad containers to clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerSelector {
    /// Every container whose id starts with the prefix.
    IdPrefix(&'static str),
    /// Containers with this class that currently hold a rendered creative.
    RenderedClass(&'static str),
}

/// A vendor reinitialization entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReinitCall {
    /// Ezoic `showAds` for the given placement ids.
    ShowAds {
        /// Placement ids to request.
        placements: Vec<u32>,
    },
    /// Push an empty config onto `adsbygoogle`.
    PushAdsByGoogle,
    /// Reinitialize the Monetag tag.
    MonetagInit,
    /// Reinitialize one Adsterra container.
    AdsterraInit {
        /// Container to fill.
        container_id: String,
    },
}

impl ReinitCall {
    /// Provider this call belongs to.
    pub fn provider(&self) -> Provider {
        match self {
            ReinitCall::ShowAds { .. } => Provider::Ezoic,
            ReinitCall::PushAdsByGoogle => Provider::AdSense,
            ReinitCall::MonetagInit => Provider::Monetag,
            ReinitCall::AdsterraInit { .. } => Provider::Adsterra,
        }
    }
}

/// Failure reported by the page collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurfaceError {
    /// Containers could not be cleared.
    #[error("failed to clear containers: {0}")]
    Clear(String),

    /// The vendor entry point threw.
    #[error("vendor call failed: {0}")]
    Call(String),
}

/// Containers and vendor libraries of the host page.
#[async_trait]
pub trait AdSurface: Send + Sync {
    /// Returns `true` if the provider's script is loaded.
    fn library_available(&self, provider: Provider) -> bool;

    /// Empties matching containers and returns their ids.
    async fn clear_containers(&self, selector: ContainerSelector)
        -> Result<Vec<String>, SurfaceError>;

    /// Issues a vendor reinitialization call. Returns once the call is made,
    /// not once a creative has rendered.
    async fn invoke(&self, call: ReinitCall) -> Result<(), SurfaceError>;
}

/// How [`InMemorySurface`] answers `invoke` for a provider.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InvokeBehavior {
    /// Record the call and succeed.
    #[default]
    Succeed,
    /// Record the call and fail with this message.
    Fail(String),
    /// Record the call and never return.
    Hang,
}

/// One ad slot on an in-memory page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdContainer {
    /// Element id.
    pub id: String,
    /// Element class, if any.
    pub class: Option<String>,
    /// Current markup. Empty means nothing rendered.
    pub content: String,
}

#[derive(Debug, Default)]
struct SurfaceState {
    containers: Vec<AdContainer>,
    libraries: BTreeSet<Provider>,
    behaviors: BTreeMap<Provider, InvokeBehavior>,
    clear_failure: Option<String>,
    calls: Vec<ReinitCall>,
}

/// A scriptable page for tests and demos.
///
/// ```rust
/// use adrefresh::{InMemorySurface, Provider};
///
/// let surface = InMemorySurface::new()
///     .with_library(Provider::Monetag)
///     .with_container("monetag-footer", None, "<iframe>");
///
/// assert_eq!(surface.content("monetag-footer").as_deref(), Some("<iframe>"));
/// ```
#[derive(Debug, Default)]
pub struct InMemorySurface {
    state: Mutex<SurfaceState>,
}

impl InMemorySurface {
    /// Creates an empty page with no vendor libraries loaded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a provider's library as loaded.
    pub fn with_library(self, provider: Provider) -> Self {
        self.state.lock().libraries.insert(provider);
        self
    }

    /// Adds a container.
    pub fn with_container(self, id: &str, class: Option<&str>, content: &str) -> Self {
        self.state.lock().containers.push(AdContainer {
            id: id.to_string(),
            class: class.map(str::to_string),
            content: content.to_string(),
        });
        self
    }

    /// Sets how `invoke` behaves for a provider.
    pub fn with_behavior(self, provider: Provider, behavior: InvokeBehavior) -> Self {
        self.set_behavior(provider, behavior);
        self
    }

    /// Changes how `invoke` behaves for a provider.
    pub fn set_behavior(&self, provider: Provider, behavior: InvokeBehavior) {
        self.state.lock().behaviors.insert(provider, behavior);
    }

    /// Makes every `clear_containers` call fail with `reason`, or succeed again
    /// with `None`.
    pub fn set_clear_failure(&self, reason: Option<&str>) {
        self.state.lock().clear_failure = reason.map(str::to_string);
    }

    /// Calls issued so far, oldest first.
    pub fn calls(&self) -> Vec<ReinitCall> {
        self.state.lock().calls.clone()
    }

    /// Markup of a container.
    pub fn content(&self, id: &str) -> Option<String> {
        self.state
            .lock()
            .containers
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.content.clone())
    }
}

#[async_trait]
impl AdSurface for InMemorySurface {
    fn library_available(&self, provider: Provider) -> bool {
        self.state.lock().libraries.contains(&provider)
    }

    async fn clear_containers(
        &self,
        selector: ContainerSelector,
    ) -> Result<Vec<String>, SurfaceError> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.clear_failure {
            return Err(SurfaceError::Clear(reason.clone()));
        }

        let mut cleared = Vec::new();
        for container in state.containers.iter_mut() {
            let matches = match selector {
                ContainerSelector::IdPrefix(prefix) => container.id.starts_with(prefix),
                ContainerSelector::RenderedClass(class) => {
                    container.class.as_deref() == Some(class) && !container.content.is_empty()
                }
            };
            if matches {
                container.content.clear();
                cleared.push(container.id.clone());
            }
        }
        Ok(cleared)
    }

    async fn invoke(&self, call: ReinitCall) -> Result<(), SurfaceError> {
        let behavior = {
            let mut state = self.state.lock();
            let behavior = state
                .behaviors
                .get(&call.provider())
                .cloned()
                .unwrap_or_default();
            state.calls.push(call);
            behavior
        };

        match behavior {
            InvokeBehavior::Succeed => Ok(()),
            InvokeBehavior::Fail(reason) => Err(SurfaceError::Call(reason)),
            InvokeBehavior::Hang => std::future::pending().await,
        }
    }
}
