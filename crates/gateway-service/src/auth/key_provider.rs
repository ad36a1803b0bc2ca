//! Cached provider of the current verification key.
//!
//! The provider owns the only shared mutable state in the gateway: a slot
//! holding zero or one `Arc<KeyMaterial>`. The slot is replaced wholesale,
//! never mutated, so readers always see a complete key.
//!
//! # Fetch coalescing
//!
//! Network fetches are serialized behind `fetch_lock`, which also holds the
//! outcome of the most recent fetch. Every fetch is numbered when it starts
//! and again when it completes. A caller queued behind the lock reuses that
//! outcome, success or error, only when it is recent enough for the caller:
//!
//! - `get_key` reuses any fetch that completed after the caller missed the
//!   cache, so a burst of misses against a slow or failing key service costs
//!   one request and one timeout.
//! - `refresh` reuses only a fetch that started after the caller asked for
//!   the refresh. A fetch already in flight may predate a key rotation, so
//!   callers arriving during it fetch again once it finishes. A burst of
//!   refreshes costs at most two requests.
//!
//! # Stale keys
//!
//! [`StaleKeyPolicy::FailClosed`] (the default) returns the fetch error once
//! the cached key is past its TTL. [`StaleKeyPolicy::FailOpen`] keeps serving
//! the expired key while the key service is failing. Fail-open survives
//! issuer outages but will keep accepting tokens signed by a key the issuer
//! may have revoked.

use crate::auth::key_source::KeySource;
use crate::auth::keys::{KeyError, KeyMaterial};
use crate::observability::metrics::{record_key_cache_lookup, record_key_fetch};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

/// Default cache TTL (60 seconds).
pub const DEFAULT_KEY_CACHE_TTL: Duration = Duration::from_millis(60_000);

/// What `get_key` does when the cached key is expired and the fetch fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StaleKeyPolicy {
    /// Reject: return the fetch error.
    #[default]
    FailClosed,

    /// Serve the expired key if one exists.
    FailOpen,
}

/// Why a fetch was issued. Used as a metrics label.
#[derive(Debug, Clone, Copy)]
enum FetchTrigger {
    Expired,
    Refresh,
}

impl FetchTrigger {
    fn as_str(self) -> &'static str {
        match self {
            FetchTrigger::Expired => "expired",
            FetchTrigger::Refresh => "refresh",
        }
    }
}

/// Outcome of the most recent fetch, shared with callers queued behind it.
struct FetchAttempt {
    /// Sequence number taken when the fetch started.
    started: u64,

    /// Sequence number taken when the fetch completed.
    completed: u64,

    result: Result<Arc<KeyMaterial>, KeyError>,
}

/// Supplies the current verification key, fetching through a [`KeySource`].
pub struct KeyProvider {
    source: Arc<dyn KeySource>,

    /// Current key; `None` until the first successful fetch.
    cache: RwLock<Option<Arc<KeyMaterial>>>,

    /// Held for the duration of a network fetch.
    fetch_lock: Mutex<Option<FetchAttempt>>,

    /// Number of fetches started.
    fetches_started: AtomicU64,

    /// Number of fetches completed, successfully or not.
    fetches_completed: AtomicU64,

    ttl: Duration,

    stale_policy: StaleKeyPolicy,
}

impl KeyProvider {
    /// Create a fail-closed provider with an empty cache.
    pub fn new(source: Arc<dyn KeySource>, ttl: Duration) -> Self {
        Self {
            source,
            cache: RwLock::new(None),
            fetch_lock: Mutex::new(None),
            fetches_started: AtomicU64::new(0),
            fetches_completed: AtomicU64::new(0),
            ttl,
            stale_policy: StaleKeyPolicy::FailClosed,
        }
    }

    /// Override the stale key policy.
    #[must_use]
    pub fn with_stale_policy(mut self, stale_policy: StaleKeyPolicy) -> Self {
        self.stale_policy = stale_policy;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stale_policy(&self) -> StaleKeyPolicy {
        self.stale_policy
    }

    /// Current snapshot without fetching, fresh or not.
    pub async fn cached(&self) -> Option<Arc<KeyMaterial>> {
        self.cache.read().await.clone()
    }

    /// Return the cached key if fresh, otherwise fetch and cache a new one.
    ///
    /// # Errors
    ///
    /// Returns the `KeyError` from the fetch when the cache is empty or
    /// expired and the key service cannot supply a key (unless fail-open
    /// has a stale key to serve). Callers that queued behind a failing fetch
    /// get its error without fetching again.
    #[instrument(skip_all, name = "gw.auth.keys.get_key")]
    pub async fn get_key(&self) -> Result<Arc<KeyMaterial>, KeyError> {
        if let Some(key) = self.fresh_snapshot().await {
            record_key_cache_lookup("hit");
            tracing::trace!(target: "gw.auth.keys", "Key cache hit");
            return Ok(key);
        }
        record_key_cache_lookup("miss");

        let missed_after = self.fetches_completed.load(Ordering::SeqCst);
        let mut last_fetch = self.fetch_lock.lock().await;

        // Another caller may have completed the fetch while we queued
        if let Some(key) = self.fresh_snapshot().await {
            tracing::debug!(target: "gw.auth.keys", "Key fetched by concurrent caller");
            return Ok(key);
        }

        let shared = last_fetch
            .as_ref()
            .filter(|attempt| attempt.completed > missed_after)
            .map(|attempt| attempt.result.clone());

        let result = match shared {
            Some(result) => {
                tracing::debug!(target: "gw.auth.keys", "Reusing concurrent key fetch result");
                result
            }
            None => self.fetch_and_store(FetchTrigger::Expired, &mut last_fetch).await,
        };
        drop(last_fetch);

        match result {
            Ok(key) => Ok(key),
            Err(e) => self.stale_fallback(e).await,
        }
    }

    /// Fetch a new key regardless of the cached key's freshness.
    ///
    /// Concurrent refreshes coalesce: a caller that waited while another
    /// fetch ran returns that fetch's outcome only if the fetch started after
    /// this call did. Otherwise it fetches again.
    ///
    /// # Errors
    ///
    /// Returns the `KeyError` from the fetch. The previously cached key is
    /// left in place.
    #[instrument(skip_all, name = "gw.auth.keys.refresh")]
    pub async fn refresh(&self) -> Result<Arc<KeyMaterial>, KeyError> {
        let requested_after = self.fetches_started.load(Ordering::SeqCst);
        let mut last_fetch = self.fetch_lock.lock().await;

        if let Some(attempt) = last_fetch
            .as_ref()
            .filter(|attempt| attempt.started > requested_after)
        {
            tracing::debug!(target: "gw.auth.keys", "Key refreshed by concurrent caller");
            return attempt.result.clone();
        }

        self.fetch_and_store(FetchTrigger::Refresh, &mut last_fetch).await
    }

    async fn fresh_snapshot(&self) -> Option<Arc<KeyMaterial>> {
        self.cache
            .read()
            .await
            .as_ref()
            .filter(|key| key.is_fresh(self.ttl))
            .cloned()
    }

    /// Fetch from the source, replace the cache on success, and record the
    /// outcome in `last_fetch`. Caller holds `fetch_lock`.
    async fn fetch_and_store(
        &self,
        trigger: FetchTrigger,
        last_fetch: &mut Option<FetchAttempt>,
    ) -> Result<Arc<KeyMaterial>, KeyError> {
        let started = self.fetches_started.fetch_add(1, Ordering::SeqCst) + 1;
        let start = Instant::now();
        let result = self.source.fetch().await;
        let duration = start.elapsed();

        let result = match result {
            Ok(key) => {
                record_key_fetch(trigger.as_str(), "success", duration);
                let key = Arc::new(key);
                *self.cache.write().await = Some(Arc::clone(&key));
                tracing::info!(
                    target: "gw.auth.keys",
                    trigger = trigger.as_str(),
                    algorithm = %key.algorithm(),
                    duration_ms = duration.as_millis() as u64,
                    "Verification key cache refreshed"
                );
                Ok(key)
            }
            Err(e) => {
                record_key_fetch(trigger.as_str(), "error", duration);
                tracing::warn!(
                    target: "gw.auth.keys",
                    trigger = trigger.as_str(),
                    error = %e,
                    "Verification key fetch failed"
                );
                Err(e)
            }
        };

        let completed = self.fetches_completed.fetch_add(1, Ordering::SeqCst) + 1;
        *last_fetch = Some(FetchAttempt {
            started,
            completed,
            result: result.clone(),
        });

        result
    }

    async fn stale_fallback(&self, error: KeyError) -> Result<Arc<KeyMaterial>, KeyError> {
        if self.stale_policy == StaleKeyPolicy::FailClosed {
            return Err(error);
        }

        match self.cached().await {
            Some(stale) => {
                tracing::warn!(
                    target: "gw.auth.keys",
                    error = %error,
                    age_ms = stale.fetched_at().elapsed().as_millis() as u64,
                    "Serving expired verification key (fail-open)"
                );
                Ok(stale)
            }
            None => Err(error),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::keys::tests::ed25519_spki;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

    /// Key source that counts fetches and hands out a new key per fetch.
    ///
    /// The key is chosen when the fetch starts, like a response the issuer
    /// has already produced.
    struct MockKeySource {
        fetches: AtomicUsize,
        next_fill: AtomicU8,
        failing: AtomicBool,
        delay: Duration,
    }

    impl MockKeySource {
        fn new() -> Self {
            Self::with_delay(Duration::ZERO)
        }

        fn with_delay(delay: Duration) -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                next_fill: AtomicU8::new(1),
                failing: AtomicBool::new(false),
                delay,
            }
        }

        fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }

        fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl KeySource for MockKeySource {
        async fn fetch(&self) -> Result<KeyMaterial, KeyError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let failing = self.failing.load(Ordering::SeqCst);
            let fill = self.next_fill.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if failing {
                return Err(KeyError::Fetch("connection refused".to_string()));
            }
            KeyMaterial::from_spki_der("Ed25519", ed25519_spki(fill))
        }
    }

    fn provider(source: &Arc<MockKeySource>, ttl: Duration) -> KeyProvider {
        KeyProvider::new(Arc::clone(source) as Arc<dyn KeySource>, ttl)
    }

    #[tokio::test]
    async fn test_cache_starts_empty() {
        let source = Arc::new(MockKeySource::new());
        let provider = provider(&source, DEFAULT_KEY_CACHE_TTL);

        assert!(provider.cached().await.is_none());
        assert_eq!(source.fetch_count(), 0);
        assert_eq!(provider.stale_policy(), StaleKeyPolicy::FailClosed);
    }

    #[tokio::test]
    async fn test_sequential_get_key_within_ttl_fetches_once() {
        let source = Arc::new(MockKeySource::new());
        let provider = provider(&source, DEFAULT_KEY_CACHE_TTL);

        let first = provider.get_key().await.unwrap();
        for _ in 0..10 {
            let key = provider.get_key().await.unwrap();
            assert!(Arc::ptr_eq(&first, &key));
        }

        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_expired_key_is_refetched() {
        let source = Arc::new(MockKeySource::new());
        let provider = provider(&source, Duration::from_millis(1));

        let first = provider.get_key().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = provider.get_key().await.unwrap();

        assert_eq!(source.fetch_count(), 2);
        assert_ne!(first.raw_key_bytes(), second.raw_key_bytes());
    }

    #[tokio::test]
    async fn test_refresh_always_fetches() {
        let source = Arc::new(MockKeySource::new());
        let provider = provider(&source, DEFAULT_KEY_CACHE_TTL);

        let cached = provider.get_key().await.unwrap();
        let refreshed = provider.refresh().await.unwrap();

        assert_eq!(source.fetch_count(), 2);
        assert_ne!(cached.raw_key_bytes(), refreshed.raw_key_bytes());

        // The refreshed key replaces the cache for later callers
        let after = provider.get_key().await.unwrap();
        assert!(Arc::ptr_eq(&refreshed, &after));
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_refresh_on_empty_cache_fetches() {
        let source = Arc::new(MockKeySource::new());
        let provider = provider(&source, DEFAULT_KEY_CACHE_TTL);

        provider.refresh().await.unwrap();

        assert_eq!(source.fetch_count(), 1);
        assert!(provider.cached().await.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_cache_misses_share_one_fetch() {
        let source = Arc::new(MockKeySource::with_delay(Duration::from_millis(50)));
        let provider = Arc::new(provider(&source, DEFAULT_KEY_CACHE_TTL));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let provider = Arc::clone(&provider);
                tokio::spawn(async move { provider.get_key().await })
            })
            .collect();

        let keys = join_keys(tasks).await;

        assert_eq!(source.fetch_count(), 1);
        let first = keys.first().unwrap();
        assert!(keys.iter().all(|k| Arc::ptr_eq(first, k)));
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_coalesce() {
        let source = Arc::new(MockKeySource::with_delay(Duration::from_millis(50)));
        let provider = Arc::new(provider(&source, DEFAULT_KEY_CACHE_TTL));
        provider.get_key().await.unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let provider = Arc::clone(&provider);
                tokio::spawn(async move { provider.refresh().await })
            })
            .collect();

        let keys = join_keys(tasks).await;

        // Initial key, the first refresh, and one fetch shared by every
        // refresh that arrived while the first was in flight
        assert_eq!(source.fetch_count(), 3);
        let last = keys.last().unwrap();
        let sharing_last = keys.iter().filter(|k| Arc::ptr_eq(last, k)).count();
        assert_eq!(sharing_last, keys.len() - 1);
    }

    #[tokio::test]
    async fn test_refresh_does_not_reuse_fetch_started_before_it() {
        let source = Arc::new(MockKeySource::with_delay(Duration::from_millis(100)));
        let provider = Arc::new(provider(&source, DEFAULT_KEY_CACHE_TTL));
        provider.get_key().await.unwrap();

        // This refresh's response is fixed before the issuer rotates
        let in_flight = tokio::spawn({
            let provider = Arc::clone(&provider);
            async move { provider.refresh().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let rotated = provider.refresh().await.unwrap();
        let earlier = in_flight.await.unwrap().unwrap();

        assert_eq!(source.fetch_count(), 3);
        assert!(!Arc::ptr_eq(&earlier, &rotated));
        assert_eq!(rotated.raw_key_bytes(), ed25519_spki(3).as_slice());
        assert!(Arc::ptr_eq(&provider.cached().await.unwrap(), &rotated));
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_failed_fetch() {
        let source = Arc::new(MockKeySource::with_delay(Duration::from_millis(200)));
        source.set_failing(true);
        let provider = Arc::new(provider(&source, DEFAULT_KEY_CACHE_TTL));

        let start = Instant::now();
        let results = futures::future::join_all((0..10).map(|_| {
            let provider = Arc::clone(&provider);
            async move { provider.get_key().await }
        }))
        .await;
        let elapsed = start.elapsed();

        assert!(results.iter().all(|r| matches!(r, Err(KeyError::Fetch(_)))));
        assert_eq!(source.fetch_count(), 1);
        assert!(elapsed < Duration::from_millis(1000), "waited {elapsed:?}");
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_reused_by_later_miss() {
        let source = Arc::new(MockKeySource::new());
        source.set_failing(true);
        let provider = provider(&source, DEFAULT_KEY_CACHE_TTL);

        assert!(provider.get_key().await.is_err());
        source.set_failing(false);

        assert!(provider.get_key().await.is_ok());
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_fail_closed_rejects_when_expired_and_fetch_fails() {
        let source = Arc::new(MockKeySource::new());
        let provider = provider(&source, Duration::from_millis(1));

        provider.get_key().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        source.set_failing(true);

        let err = provider.get_key().await.unwrap_err();
        assert!(matches!(err, KeyError::Fetch(_)));
        // The stale key stays in the slot
        assert!(provider.cached().await.is_some());
    }

    #[tokio::test]
    async fn test_fail_open_serves_stale_key() {
        let source = Arc::new(MockKeySource::new());
        let provider =
            provider(&source, Duration::from_millis(1)).with_stale_policy(StaleKeyPolicy::FailOpen);

        let original = provider.get_key().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        source.set_failing(true);

        let served = provider.get_key().await.unwrap();
        assert!(Arc::ptr_eq(&original, &served));
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_fail_open_without_cached_key_still_errors() {
        let source = Arc::new(MockKeySource::new());
        source.set_failing(true);
        let provider =
            provider(&source, DEFAULT_KEY_CACHE_TTL).with_stale_policy(StaleKeyPolicy::FailOpen);

        assert!(provider.get_key().await.is_err());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_key() {
        let source = Arc::new(MockKeySource::new());
        let provider = provider(&source, DEFAULT_KEY_CACHE_TTL);

        let original = provider.get_key().await.unwrap();
        source.set_failing(true);

        assert!(provider.refresh().await.is_err());
        let current = provider.cached().await.unwrap();
        assert!(Arc::ptr_eq(&original, &current));

        // Still fresh, so get_key serves it without a network call
        let served = provider.get_key().await.unwrap();
        assert!(Arc::ptr_eq(&original, &served));
        assert_eq!(source.fetch_count(), 2);
    }

    async fn join_keys(
        tasks: Vec<tokio::task::JoinHandle<Result<Arc<KeyMaterial>, KeyError>>>,
    ) -> Vec<Arc<KeyMaterial>> {
        futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect()
    }
}
