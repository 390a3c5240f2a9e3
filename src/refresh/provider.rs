//! # Provider Adapters
//!
//! One adapter per ad network, all sharing the same contract:
//!
//! ```text
//!     Provider::refresh(surface, settings)
//!          │
//!          ├─► vendor library loaded?  ── no ──► ScriptLoad (not retryable)
//!          │
//!          ├─► clear stale containers
//!          │
//!          └─► issue vendor entry point ── error ──► ScriptLoad (retryable)
//!                    │
//!                    ▼
//!                Ok(())   "request issued", not "creative painted"
//! ```
//!
//! | Provider | Containers cleared                   | Entry point             |
//! |----------|--------------------------------------|-------------------------|
//! | Ezoic    | id `ezoic-pub-ad-placeholder-*`      | `showAds(placements)`   |
//! | AdSense  | class `adsbygoogle`, rendered only   | `adsbygoogle.push({})`  |
//! | Monetag  | id `monetag-*`                       | Monetag init            |
//! | Adsterra | id `adsterra-*`                      | init per container      |

use super::config::AdSettings;
use super::error::RefreshError;
use super::surface::{AdSurface, ContainerSelector, ReinitCall};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Pause between clearing and reinitializing, giving the page a moment to
/// settle.
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Name reported when no provider is configured.
pub const NO_PROVIDER: &str = "none";

/// The supported ad networks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Ezoic standalone.
    Ezoic,
    /// Google AdSense.
    AdSense,
    /// Monetag.
    Monetag,
    /// Adsterra.
    Adsterra,
}

impl Provider {
    /// Every provider.
    pub const ALL: [Provider; 4] = [
        Provider::Ezoic,
        Provider::AdSense,
        Provider::Monetag,
        Provider::Adsterra,
    ];

    /// Lowercase identifier, as used in configuration.
    pub const fn name(self) -> &'static str {
        match self {
            Provider::Ezoic => "ezoic",
            Provider::AdSense => "adsense",
            Provider::Monetag => "monetag",
            Provider::Adsterra => "adsterra",
        }
    }

    /// Brand name for messages.
    pub const fn display_name(self) -> &'static str {
        match self {
            Provider::Ezoic => "Ezoic",
            Provider::AdSense => "AdSense",
            Provider::Monetag => "Monetag",
            Provider::Adsterra => "Adsterra",
        }
    }

    /// Containers this provider renders into.
    pub const fn containers(self) -> ContainerSelector {
        match self {
            Provider::Ezoic => ContainerSelector::IdPrefix("ezoic-pub-ad-placeholder-"),
            Provider::AdSense => ContainerSelector::RenderedClass("adsbygoogle"),
            Provider::Monetag => ContainerSelector::IdPrefix("monetag-"),
            Provider::Adsterra => ContainerSelector::IdPrefix("adsterra-"),
        }
    }

    /// Clears this provider's stale creatives and asks its script to fill
    /// them again.
    ///
    /// # Errors
    ///
    /// `ScriptLoad` if the vendor library is missing (not retryable) or if
    /// clearing or the vendor call fails (retryable).
    pub async fn refresh(
        self,
        surface: &dyn AdSurface,
        settings: &AdSettings,
    ) -> Result<(), RefreshError> {
        if !surface.library_available(self) {
            return Err(RefreshError::library_missing(self));
        }

        let cleared = surface
            .clear_containers(self.containers())
            .await
            .map_err(|err| RefreshError::entry_point_failed(self, err))?;

        match self {
            Provider::Ezoic => {
                let placements = settings.ezoic_placements.clone();
                self.issue(surface, ReinitCall::ShowAds { placements }).await?;
            }
            Provider::AdSense => {
                tokio::time::sleep(SETTLE_DELAY).await;
                self.issue(surface, ReinitCall::PushAdsByGoogle).await?;
            }
            Provider::Monetag => {
                self.issue(surface, ReinitCall::MonetagInit).await?;
            }
            Provider::Adsterra => {
                if !cleared.is_empty() {
                    tokio::time::sleep(SETTLE_DELAY).await;
                }
                for container_id in cleared.iter().cloned() {
                    self.issue(surface, ReinitCall::AdsterraInit { container_id })
                        .await?;
                }
            }
        }

        info!(
            "{} ads refreshed ({} containers cleared)",
            self.display_name(),
            cleared.len()
        );
        Ok(())
    }

    async fn issue(self, surface: &dyn AdSurface, call: ReinitCall) -> Result<(), RefreshError> {
        surface
            .invoke(call)
            .await
            .map_err(|err| RefreshError::entry_point_failed(self, err))
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Provider::ALL
            .into_iter()
            .find(|p| p.name() == normalized)
            .ok_or_else(|| ConfigError::UnknownProvider(s.to_string()))
    }
}

/// Snapshot of which provider is active, rebuilt for every refresh cycle.
///
/// ```rust
/// use adrefresh::{Provider, ProviderInfo};
///
/// let info = ProviderInfo::new(Some(Provider::AdSense));
/// assert_eq!(info.active_provider_name, "adsense");
/// assert!(info.is_active(Provider::AdSense));
/// assert!(!info.is_active(Provider::Ezoic));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
    /// Active provider's name, or `"none"`.
    pub active_provider_name: String,
    /// Active flag for every provider.
    pub flags: BTreeMap<Provider, bool>,
}

impl ProviderInfo {
    /// Builds the snapshot for an optional active provider.
    pub fn new(active: Option<Provider>) -> Self {
        Self {
            active_provider_name: active.map_or(NO_PROVIDER, Provider::name).to_string(),
            flags: Provider::ALL
                .into_iter()
                .map(|p| (p, Some(p) == active))
                .collect(),
        }
    }

    /// The provider to dispatch to, checked in priority order.
    pub fn active_provider(&self) -> Option<Provider> {
        Provider::ALL.into_iter().find(|p| self.is_active(*p))
    }

    /// Whether `provider` is flagged active.
    pub fn is_active(&self, provider: Provider) -> bool {
        self.flags.get(&provider).copied().unwrap_or(false)
    }
}
