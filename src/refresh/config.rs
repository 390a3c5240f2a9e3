//! # Refresh Configuration
//!
//! Settings come from two places:
//!
//! ```text
//!     Environment (read once)              AdSettings
//!     ──────────────────────────           ───────────────────
//!     ADREFRESH_PROVIDER          ───────► provider
//!     ADREFRESH_PROFILE           ───────► profile ──► RefreshConfig
//!     ADREFRESH_EZOIC_PLACEMENTS  ───────► ezoic_placements
//!
//!     Profile        min interval   retries   retry delay   cache timeout
//!     development    2s             2         1s            30s
//!     production     5s             3         2s            300s
//! ```

use super::provider::{Provider, ProviderInfo, NO_PROVIDER};
use crate::error::ConfigError;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Selects the active provider (`ezoic`, `adsense`, `monetag`, `adsterra` or `none`).
pub const PROVIDER_ENV: &str = "ADREFRESH_PROVIDER";

/// Selects the profile (`development` or `production`).
pub const PROFILE_ENV: &str = "ADREFRESH_PROFILE";

/// Comma-separated Ezoic placement ids.
pub const EZOIC_PLACEMENTS_ENV: &str = "ADREFRESH_EZOIC_PLACEMENTS";

/// Placements shown when none are configured.
pub const DEFAULT_EZOIC_PLACEMENTS: [u32; 4] = [101, 102, 103, 104];

/// Upper bound accepted for `max_retry_attempts`.
pub const MAX_RETRY_ATTEMPTS_LIMIT: u32 = 10;

/// Deployment profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    /// Short intervals for local testing.
    Development,
    /// Conservative intervals.
    #[default]
    Production,
}

impl Profile {
    /// Lowercase identifier.
    pub const fn as_str(self) -> &'static str {
        match self {
            Profile::Development => "development",
            Profile::Production => "production",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Profile::Development),
            "production" | "prod" => Ok(Profile::Production),
            _ => Err(ConfigError::UnknownProfile(s.to_string())),
        }
    }
}

/// How long each provider's adapter may run before the attempt times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderTimeouts {
    /// Ezoic budget.
    pub ezoic: Duration,
    /// AdSense budget, also used for unknown provider names.
    pub adsense: Duration,
    /// Monetag budget.
    pub monetag: Duration,
    /// Adsterra budget.
    pub adsterra: Duration,
}

impl Default for ProviderTimeouts {
    fn default() -> Self {
        Self {
            ezoic: Duration::from_millis(10_000),
            adsense: Duration::from_millis(8_000),
            monetag: Duration::from_millis(6_000),
            adsterra: Duration::from_millis(6_000),
        }
    }
}

impl ProviderTimeouts {
    /// Budget for a provider.
    pub fn for_provider(&self, provider: Provider) -> Duration {
        match provider {
            Provider::Ezoic => self.ezoic,
            Provider::AdSense => self.adsense,
            Provider::Monetag => self.monetag,
            Provider::Adsterra => self.adsterra,
        }
    }

    /// Budget for a provider name. Unknown names get the AdSense budget.
    ///
    /// ```rust
    /// use adrefresh::ProviderTimeouts;
    /// use std::time::Duration;
    ///
    /// let timeouts = ProviderTimeouts::default();
    /// assert_eq!(timeouts.for_name("EZOIC"), Duration::from_secs(10));
    /// assert_eq!(timeouts.for_name("mystery"), Duration::from_secs(8));
    /// ```
    pub fn for_name(&self, name: &str) -> Duration {
        name.parse::<Provider>()
            .map(|p| self.for_provider(p))
            .unwrap_or(self.adsense)
    }
}

/// Delays applied before refreshes started by page events.
#[derive(Debug, Clone, Copy)]
pub struct RefreshDelays;

impl RefreshDelays {
    /// Page became visible.
    pub const VISIBILITY_CHANGE: Duration = Duration::from_millis(1_000);
    /// Window gained focus.
    pub const FOCUS: Duration = Duration::from_millis(500);
    /// Page restored from the back-forward cache.
    pub const PAGE_SHOW: Duration = Duration::from_millis(1_000);
    /// User-requested refresh.
    pub const MANUAL: Duration = Duration::ZERO;
    /// Ad component mounted.
    pub const COMPONENT_MOUNT: Duration = Duration::from_millis(100);
}

/// Metrics batching settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalyticsSettings {
    /// Queue length that triggers a flush.
    pub batch_size: usize,
    /// Period of the background flush.
    pub flush_interval: Duration,
    /// Successful durations kept for the rolling average.
    pub max_samples: usize,
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            flush_interval: Duration::from_secs(30),
            max_samples: 100,
        }
    }
}

impl AnalyticsSettings {
    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::invalid("batch_size", "must be greater than 0"));
        }
        if self.flush_interval.is_zero() {
            return Err(ConfigError::invalid(
                "flush_interval",
                "must be greater than 0",
            ));
        }
        if self.max_samples == 0 {
            return Err(ConfigError::invalid("max_samples", "must be greater than 0"));
        }
        Ok(())
    }
}

/// Orchestrator behavior.
///
/// ## Example
///
/// ```rust
/// use adrefresh::{Profile, RefreshConfig};
/// use std::time::Duration;
///
/// let config = RefreshConfig::for_profile(Profile::Development)
///     .with_max_retry_attempts(1)
///     .with_abort_on_timeout(true);
///
/// assert_eq!(config.min_refresh_interval, Duration::from_secs(2));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshConfig {
    /// Minimum time between accepted non-forced refreshes.
    pub min_refresh_interval: Duration,
    /// Retries after the first attempt.
    pub max_retry_attempts: u32,
    /// Pause before each retry.
    pub retry_delay: Duration,
    /// Lifetime of cached ad responses. Informational; the purge ignores it.
    pub cache_timeout: Duration,
    /// Whether outcomes are reported to the metrics aggregator.
    pub enable_analytics: bool,
    /// Abort the adapter task when its attempt times out.
    pub abort_on_timeout: bool,
    /// Per-provider timeout budgets.
    pub timeouts: ProviderTimeouts,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl RefreshConfig {
    /// Fast settings for local testing.
    pub fn development() -> Self {
        Self {
            min_refresh_interval: Duration::from_millis(2_000),
            max_retry_attempts: 2,
            retry_delay: Duration::from_millis(1_000),
            cache_timeout: Duration::from_millis(30_000),
            enable_analytics: true,
            abort_on_timeout: false,
            timeouts: ProviderTimeouts::default(),
        }
    }

    /// Production settings.
    pub fn production() -> Self {
        Self {
            min_refresh_interval: Duration::from_millis(5_000),
            max_retry_attempts: 3,
            retry_delay: Duration::from_millis(2_000),
            cache_timeout: Duration::from_millis(300_000),
            enable_analytics: true,
            abort_on_timeout: false,
            timeouts: ProviderTimeouts::default(),
        }
    }

    /// Preset for a profile.
    pub fn for_profile(profile: Profile) -> Self {
        match profile {
            Profile::Development => Self::development(),
            Profile::Production => Self::production(),
        }
    }

    /// Sets the retry budget.
    pub fn with_max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = attempts;
        self
    }

    /// Sets the pause before each retry.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Enables or disables metrics reporting.
    pub fn with_analytics(mut self, enabled: bool) -> Self {
        self.enable_analytics = enabled;
        self
    }

    /// Aborts timed-out adapter work instead of letting it finish.
    pub fn with_abort_on_timeout(mut self, abort: bool) -> Self {
        self.abort_on_timeout = abort;
        self
    }

    /// Replaces the timeout budgets.
    pub fn with_timeouts(mut self, timeouts: ProviderTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Throttle interval in milliseconds.
    #[inline]
    pub fn min_refresh_interval_ms(&self) -> u64 {
        self.min_refresh_interval.as_millis() as u64
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the retry budget exceeds
    /// [`MAX_RETRY_ATTEMPTS_LIMIT`] or a timeout budget is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retry_attempts > MAX_RETRY_ATTEMPTS_LIMIT {
            return Err(ConfigError::invalid(
                "max_retry_attempts",
                format!("must be at most {MAX_RETRY_ATTEMPTS_LIMIT}"),
            ));
        }
        if Provider::ALL
            .into_iter()
            .any(|p| self.timeouts.for_provider(p).is_zero())
        {
            return Err(ConfigError::invalid(
                "timeouts",
                "every provider needs a non-zero budget",
            ));
        }
        Ok(())
    }
}

/// Process-wide ad settings, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdSettings {
    /// Active provider. `None` disables dispatch.
    pub provider: Option<Provider>,
    /// Selected profile.
    pub profile: Profile,
    /// Placement ids passed to Ezoic.
    pub ezoic_placements: Vec<u32>,
}

impl Default for AdSettings {
    fn default() -> Self {
        Self::new(None)
    }
}

impl AdSettings {
    /// Settings for a provider with the production profile.
    pub fn new(provider: Option<Provider>) -> Self {
        Self {
            provider,
            profile: Profile::default(),
            ezoic_placements: DEFAULT_EZOIC_PLACEMENTS.to_vec(),
        }
    }

    /// Sets the profile.
    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = profile;
        self
    }

    /// Reads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unrecognized value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Reads settings through `lookup`. Unset or blank variables take their
    /// defaults.
    ///
    /// ```rust
    /// use adrefresh::{AdSettings, Profile, Provider};
    ///
    /// let settings = AdSettings::from_lookup(|var| match var {
    ///     "ADREFRESH_PROVIDER" => Some("monetag".to_string()),
    ///     "ADREFRESH_PROFILE" => Some("development".to_string()),
    ///     _ => None,
    /// })
    /// .unwrap();
    ///
    /// assert_eq!(settings.provider, Some(Provider::Monetag));
    /// assert_eq!(settings.profile, Profile::Development);
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let provider = match read(PROVIDER_ENV) {
            None => None,
            Some(value) if value.eq_ignore_ascii_case(NO_PROVIDER) => None,
            Some(value) => Some(value.parse::<Provider>()?),
        };

        let profile = match read(PROFILE_ENV) {
            None => Profile::default(),
            Some(value) => value.parse::<Profile>()?,
        };

        let ezoic_placements = match read(EZOIC_PLACEMENTS_ENV) {
            None => DEFAULT_EZOIC_PLACEMENTS.to_vec(),
            Some(value) => parse_placements(&value).ok_or(ConfigError::InvalidEnv {
                var: EZOIC_PLACEMENTS_ENV,
                value,
            })?,
        };

        Ok(Self {
            provider,
            profile,
            ezoic_placements,
        })
    }

    /// Fresh provider snapshot.
    pub fn provider_info(&self) -> ProviderInfo {
        ProviderInfo::new(self.provider)
    }

    /// Orchestrator preset for the selected profile.
    pub fn refresh_config(&self) -> RefreshConfig {
        RefreshConfig::for_profile(self.profile)
    }
}

fn parse_placements(raw: &str) -> Option<Vec<u32>> {
    let placements = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u32>().ok())
        .collect::<Option<Vec<_>>>()?;

    (!placements.is_empty()).then_some(placements)
}
