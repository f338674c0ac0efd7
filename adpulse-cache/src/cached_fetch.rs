//! Composed fetch entry point for UI consumers.
//!
//! [`FetchCache`] is the shared service (TTL cache, coalescer, freshness
//! classifier, lifecycle guard). Each consumer gets a [`CachedFetch`] bound
//! to one key and one producer; it exposes the current [`FetchState`] and
//! `load` / `refresh` operations.
//!
//! ## Read path
//!
//! 1. `load` serves a live cache entry without calling the producer.
//! 2. On a miss (or on `refresh`) the producer runs, coalesced per key and
//!    bounded by the fetch timeout.
//! 3. On success the result goes through the same acceptance policy as the
//!    shared broker (see [`crate::dataset`]). Accepted parts are cached and
//!    published; if nothing is accepted the live entry is kept and reported
//!    with its original source.
//! 4. On failure the expired entry, if any, is served tagged `StaleCache`.
//!    Timeouts and aborts are recovered silently; upstream failures are
//!    surfaced in [`FetchState::error`].
//!
//! Every continuation checks the consumer's [`LifecycleToken`] after the
//! await. A disposed consumer's result is discarded without touching any
//! state.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use adpulse_core::{
    Clock, FetchError, FreshnessTier, Publication, SourceTag, SyncConfig, Timestamp,
};
use futures_util::future::BoxFuture;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::coalescer::RequestCoalescer;
use crate::dataset::{least_trusted, Admission, Dataset};
use crate::freshness::{FreshnessClassifier, FreshnessReport};
use crate::lifecycle::{LifecycleGuard, LifecycleToken};
use crate::source::SourceClassifier;
use crate::stats::{CacheStats, CoalescerStats};
use crate::ttl::{CacheEntry, TtlCache};

/// Producer bound to a consumer. Called once per uncoalesced fetch.
pub type Producer<V> =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Publication<V>, FetchError>> + Send + Sync>;

/// What a consumer renders.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchState<V> {
    pub value: Option<V>,
    pub tier: FreshnessTier,
    pub age_label: String,
    pub source: Option<SourceTag>,
    pub source_label: Option<&'static str>,
    pub is_loading: bool,
    /// Last upstream failure. Timeouts and aborts never appear here.
    pub error: Option<FetchError>,
    pub fetched_at: Option<Timestamp>,
}

impl<V> FetchState<V> {
    pub fn initial() -> Self {
        Self {
            value: None,
            tier: FreshnessTier::Unknown,
            age_label: FreshnessReport::unknown().label,
            source: None,
            source_label: None,
            is_loading: false,
            error: None,
            fetched_at: None,
        }
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    fn with_freshness(mut self, report: FreshnessReport) -> Self {
        self.tier = report.tier;
        self.age_label = report.label;
        self
    }
}

impl<V> Default for FetchState<V> {
    fn default() -> Self {
        Self::initial()
    }
}

struct FetchCacheInner<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + fmt::Debug + 'static,
    V: Dataset,
{
    cache: TtlCache<K, V>,
    requests: RequestCoalescer<K, Publication<V>>,
    freshness: FreshnessClassifier,
    lifecycle: LifecycleGuard,
    fetch_timeout: Duration,
}

/// Shared cache service behind every [`CachedFetch`].
///
/// Construct one per UI tree and pass it down; clones share state.
pub struct FetchCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + fmt::Debug + 'static,
    V: Dataset,
{
    inner: Arc<FetchCacheInner<K, V>>,
}

impl<K, V> Clone for FetchCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + fmt::Debug + 'static,
    V: Dataset,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> FetchCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + fmt::Debug + 'static,
    V: Dataset,
{
    pub fn new(default_ttl: Duration, fetch_timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(FetchCacheInner {
                cache: TtlCache::with_clock(default_ttl, Arc::clone(&clock)),
                requests: RequestCoalescer::with_clock(Arc::clone(&clock)),
                freshness: FreshnessClassifier::new(clock),
                lifecycle: LifecycleGuard::new(),
                fetch_timeout,
            }),
        }
    }

    pub fn from_config(config: &SyncConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(config.dataset_ttl, config.fetch_timeout, clock)
    }

    /// Bind a consumer to `key`. `ttl` overrides the default lifetime of
    /// entries this consumer writes.
    pub fn consumer(&self, key: K, ttl: Option<Duration>, producer: Producer<V>) -> CachedFetch<K, V> {
        let (state, _rx) = watch::channel(FetchState::initial());
        CachedFetch {
            service: self.clone(),
            key,
            ttl: ttl.unwrap_or_else(|| self.inner.cache.default_ttl()),
            producer,
            token: self.inner.lifecycle.create(),
            state,
        }
    }

    pub fn invalidate(&self, key: &K) -> bool {
        self.inner.requests.forget(key);
        self.inner.cache.invalidate(key)
    }

    pub fn invalidate_all(&self) -> usize {
        self.inner.requests.clear_history();
        self.inner.cache.invalidate_all()
    }

    pub fn lifecycle(&self) -> &LifecycleGuard {
        &self.inner.lifecycle
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    pub fn coalescer_stats(&self) -> CoalescerStats {
        self.inner.requests.stats()
    }
}

/// One consumer's view of a cached key.
///
/// Dropping it disposes its lifecycle token.
pub struct CachedFetch<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + fmt::Debug + 'static,
    V: Dataset,
{
    service: FetchCache<K, V>,
    key: K,
    ttl: Duration,
    producer: Producer<V>,
    token: LifecycleToken,
    state: watch::Sender<FetchState<V>>,
}

impl<K, V> CachedFetch<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + fmt::Debug + 'static,
    V: Dataset,
{
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn token(&self) -> &LifecycleToken {
        &self.token
    }

    /// Current state with freshness recomputed against the clock.
    pub fn state(&self) -> FetchState<V> {
        let current = self.state.borrow().clone();
        let report = self.service.inner.freshness.classify(current.fetched_at);
        current.with_freshness(report)
    }

    pub fn subscribe(&self) -> watch::Receiver<FetchState<V>> {
        self.state.subscribe()
    }

    /// Serve from cache if live, otherwise fetch.
    pub async fn load(&self) -> FetchState<V> {
        if !self.token.is_alive() {
            return self.state();
        }
        if let Some(entry) = self.service.inner.cache.get(&self.key) {
            debug!(key = ?self.key, "Serving live cache entry");
            self.apply_entry(entry, SourceTag::FreshCache);
            return self.state();
        }
        self.fetch().await
    }

    /// Fetch regardless of the cache.
    pub async fn refresh(&self) -> FetchState<V> {
        if !self.token.is_alive() {
            return self.state();
        }
        self.fetch().await
    }

    /// Tear the consumer down. Later results are discarded.
    pub fn dispose(&self) -> bool {
        self.token.dispose()
    }

    async fn fetch(&self) -> FetchState<V> {
        self.state.send_modify(|s| s.is_loading = true);

        let producer = Arc::clone(&self.producer);
        let budget = self.service.inner.fetch_timeout;
        let pending = self.service.inner.requests.fetch(self.key.clone(), move || async move {
            match tokio::time::timeout(budget, producer()).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::timeout("fetch", budget)),
            }
        });
        let result = pending.await;

        let applied = self.token.run_if_alive(|| match result {
            Ok(publication) => self.apply_publication(publication),
            Err(error) => self.apply_failure(error),
        });
        if applied.is_none() {
            debug!(key = ?self.key, "Discarded fetch result for disposed consumer");
        }
        self.state()
    }

    fn apply_publication(&self, publication: Publication<V>) {
        let Publication {
            value,
            source,
            authoritative,
        } = publication;
        let cache = &self.service.inner.cache;

        let stored = cache.put_with(self.key.clone(), self.ttl, |current, now| {
            let live = current.filter(|entry| entry.is_live_at(now));
            let admission = Admission::judge(&value, live.map(CacheEntry::value), authoritative);
            let source = match live {
                Some(entry) if admission.outcome().is_partial() => {
                    least_trusted(entry.source(), source)
                }
                _ => source,
            };
            admission
                .apply(value, live.map(CacheEntry::value), false)
                .map(|value| (value, source))
        });

        match stored.or_else(|| {
            debug!(key = ?self.key, source = %source, "Kept live entry over empty result");
            cache.get(&self.key)
        }) {
            Some(entry) => {
                let source = entry.source();
                self.apply_entry(entry, source);
            }
            None => self.state.send_modify(|s| s.is_loading = false),
        }
    }

    fn apply_entry(&self, entry: CacheEntry<K, V>, source: SourceTag) {
        let fetched_at = entry.fetched_at();
        let value = entry.into_value();
        self.state.send_modify(|s| {
            s.value = Some(value);
            s.source = Some(source);
            s.source_label = Some(SourceClassifier::classify(source).label);
            s.fetched_at = Some(fetched_at);
            s.is_loading = false;
            s.error = None;
        });
    }

    fn apply_failure(&self, error: FetchError) {
        warn!(key = ?self.key, error = %error, "Fetch failed");
        let fallback = self
            .service
            .inner
            .cache
            .get_stale(&self.key)
            .map(|entry| entry.with_source(SourceTag::StaleCache));

        if let Some(entry) = fallback {
            self.apply_entry(entry, SourceTag::StaleCache);
        }
        let surfaced = (!error.is_recoverable()).then_some(error);
        self.state.send_modify(|s| {
            s.is_loading = false;
            s.error = surfaced;
        });
    }
}

impl<K, V> Drop for CachedFetch<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + fmt::Debug + 'static,
    V: Dataset,
{
    fn drop(&mut self) {
        self.token.dispose();
    }
}

/// Wrap an async closure as a [`Producer`].
pub fn producer<V, F, Fut>(f: F) -> Producer<V>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Publication<V>, FetchError>> + Send + 'static,
{
    use futures_util::FutureExt;
    Arc::new(move || f().boxed())
}
