//! Purging cached ad responses before a refresh.
//!
//! Stale creatives served from a response cache defeat the point of a
//! refresh, so the orchestrator deletes every cached request whose URL
//! belongs to a known ad domain. The purge is best effort.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Domains whose cached responses are considered ad traffic.
pub const AD_DOMAINS: [&str; 8] = [
    "googlesyndication.com",
    "googletagservices.com",
    "doubleclick.net",
    "ezojs.com",
    "ezoic.com",
    "highperformanceformat.com",
    "adsterra.com",
    "monetag.com",
];

/// Returns `true` if `url` mentions one of the [`AD_DOMAINS`].
///
/// ```rust
/// use adrefresh::is_ad_related;
///
/// assert!(is_ad_related("https://pagead2.googlesyndication.com/pagead/js"));
/// assert!(!is_ad_related("https://example.com/app.js"));
/// ```
pub fn is_ad_related(url: &str) -> bool {
    AD_DOMAINS.iter().any(|domain| url.contains(domain))
}

/// Failure of a [`ResponseCache`] operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The cache storage cannot be opened.
    #[error("response cache unavailable: {0}")]
    Unavailable(String),

    /// An operation on a named cache failed.
    #[error("cache `{cache}` operation failed: {reason}")]
    Operation {
        /// Cache name.
        cache: String,
        /// Failure description.
        reason: String,
    },
}

/// Named caches of HTTP responses, keyed by request URL.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Names of all caches.
    async fn cache_names(&self) -> Result<Vec<String>, CacheError>;

    /// Request URLs stored in `cache`.
    async fn keys(&self, cache: &str) -> Result<Vec<String>, CacheError>;

    /// Deletes one entry. Returns whether it existed.
    async fn delete(&self, cache: &str, url: &str) -> Result<bool, CacheError>;
}

/// Deletes every ad-related entry from every cache. Returns how many were
/// removed.
///
/// # Errors
///
/// Stops at the first failing cache operation.
pub async fn purge_ad_responses(cache: &dyn ResponseCache) -> Result<usize, CacheError> {
    let mut removed = 0;

    for name in cache.cache_names().await? {
        let ad_urls: Vec<String> = cache
            .keys(&name)
            .await?
            .into_iter()
            .filter(|url| is_ad_related(url))
            .collect();

        for url in &ad_urls {
            if cache.delete(&name, url).await? {
                removed += 1;
            }
        }
    }

    Ok(removed)
}

/// In-memory response cache for tests and demos.
#[derive(Debug, Default)]
pub struct MemoryResponseCache {
    caches: Mutex<BTreeMap<String, Vec<String>>>,
    failing: AtomicBool,
}

impl MemoryResponseCache {
    /// Creates an empty cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `url` in the named cache.
    pub fn insert(&self, cache: &str, url: &str) {
        self.caches
            .lock()
            .entry(cache.to_string())
            .or_default()
            .push(url.to_string());
    }

    /// URLs currently stored in the named cache.
    pub fn urls(&self, cache: &str) -> Vec<String> {
        self.caches.lock().get(cache).cloned().unwrap_or_default()
    }

    /// Makes every operation fail until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.failing.load(Ordering::Acquire) {
            Err(CacheError::Unavailable("cache storage is disabled".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ResponseCache for MemoryResponseCache {
    async fn cache_names(&self) -> Result<Vec<String>, CacheError> {
        self.check()?;
        Ok(self.caches.lock().keys().cloned().collect())
    }

    async fn keys(&self, cache: &str) -> Result<Vec<String>, CacheError> {
        self.check()?;
        Ok(self.urls(cache))
    }

    async fn delete(&self, cache: &str, url: &str) -> Result<bool, CacheError> {
        self.check()?;
        let mut caches = self.caches.lock();
        let Some(entries) = caches.get_mut(cache) else {
            return Ok(false);
        };
        let before = entries.len();
        entries.retain(|u| u != url);
        Ok(entries.len() != before)
    }
}
