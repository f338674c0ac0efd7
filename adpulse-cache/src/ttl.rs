//! Key/value store with per-entry fetch time and lifetime.
//!
//! Expiry is evaluated lazily on read against the injected [`Clock`]. There
//! is no background eviction: an expired entry stays in the map so callers
//! can fall back to it with [`TtlCache::get_stale`], but a plain
//! [`TtlCache::get`] treats it as a miss.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use adpulse_core::{Clock, SourceTag, SystemClock, Timestamp};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::stats::{CacheCounters, CacheStats};

/// A cached value with its provenance and lifetime.
///
/// Absence is modelled by the entry not existing; a present entry always
/// holds a value.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<K, V> {
    key: K,
    value: V,
    fetched_at: Timestamp,
    ttl: Duration,
    source: SourceTag,
}

impl<K, V> CacheEntry<K, V> {
    pub fn new(key: K, value: V, fetched_at: Timestamp, ttl: Duration, source: SourceTag) -> Self {
        Self {
            key,
            value,
            fetched_at,
            ttl,
            source,
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn into_value(self) -> V {
        self.value
    }

    pub fn fetched_at(&self) -> Timestamp {
        self.fetched_at
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn source(&self) -> SourceTag {
        self.source
    }

    /// Age of the entry at `now`. Negative if `fetched_at` is in the future.
    pub fn age_at(&self, now: Timestamp) -> chrono::Duration {
        now.signed_duration_since(self.fetched_at)
    }

    /// `true` iff `now - fetched_at < ttl`.
    pub fn is_live_at(&self, now: Timestamp) -> bool {
        within_ttl(self.fetched_at, self.ttl, now)
    }

    /// Replace the provenance, e.g. when an expired entry is served as a
    /// fallback.
    pub fn with_source(mut self, source: SourceTag) -> Self {
        self.source = source;
        self
    }
}

/// Half-open lifetime check: live while `now - fetched_at < ttl`.
///
/// A TTL too large for chrono never expires. A `fetched_at` in the future
/// counts as live.
pub fn within_ttl(fetched_at: Timestamp, ttl: Duration, now: Timestamp) -> bool {
    let age = now.signed_duration_since(fetched_at);
    match chrono::Duration::from_std(ttl) {
        Ok(ttl) => age < ttl,
        Err(_) => true,
    }
}

/// TTL cache keyed by `K`.
pub struct TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    entries: DashMap<K, CacheEntry<K, V>>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
    counters: CacheCounters,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache on the system clock.
    pub fn new(default_ttl: Duration) -> Self {
        Self::with_clock(default_ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            default_ttl,
            counters: CacheCounters::default(),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Get a live entry. Expired entries are misses.
    pub fn get(&self, key: &K) -> Option<CacheEntry<K, V>> {
        let now = self.clock.now();
        let hit = self
            .entries
            .get(key)
            .filter(|entry| entry.is_live_at(now))
            .map(|entry| entry.value().clone());

        if hit.is_some() {
            CacheCounters::bump(&self.counters.hits, 1);
        } else {
            CacheCounters::bump(&self.counters.misses, 1);
        }
        hit
    }

    /// Get the entry whether or not it has expired.
    pub fn get_stale(&self, key: &K) -> Option<CacheEntry<K, V>> {
        let now = self.clock.now();
        let entry = self.entries.get(key).map(|entry| entry.value().clone())?;
        if !entry.is_live_at(now) {
            CacheCounters::bump(&self.counters.stale_reads, 1);
        }
        Some(entry)
    }

    /// Check for a live entry without touching hit/miss statistics.
    pub fn contains_live(&self, key: &K) -> bool {
        let now = self.clock.now();
        self.entries
            .get(key)
            .map(|entry| entry.is_live_at(now))
            .unwrap_or(false)
    }

    /// Store a value, overwriting any previous entry.
    pub fn put(&self, key: K, value: V, source: SourceTag, ttl: Duration) -> CacheEntry<K, V> {
        let entry = CacheEntry::new(key.clone(), value, self.clock.now(), ttl, source);
        self.entries.insert(key, entry.clone());
        entry
    }

    /// Store a value with the cache's default TTL.
    pub fn put_default(&self, key: K, value: V, source: SourceTag) -> CacheEntry<K, V> {
        self.put(key, value, source, self.default_ttl)
    }

    /// Store a value only if `accept` approves, atomically with respect to
    /// other writers of the same key.
    ///
    /// `accept` sees the current entry (live or expired) and the current
    /// time. Returns the stored entry, or `None` if the write was declined.
    pub fn put_if<F>(
        &self,
        key: K,
        value: V,
        source: SourceTag,
        ttl: Duration,
        accept: F,
    ) -> Option<CacheEntry<K, V>>
    where
        F: FnOnce(Option<&CacheEntry<K, V>>, Timestamp) -> bool,
    {
        self.put_with(key, ttl, |current, now| {
            accept(current, now).then_some((value, source))
        })
    }

    /// Build the stored value and its source from the current entry under
    /// the key's lock.
    ///
    /// `build` returning `None` leaves the entry untouched.
    pub fn put_with<F>(&self, key: K, ttl: Duration, build: F) -> Option<CacheEntry<K, V>>
    where
        F: FnOnce(Option<&CacheEntry<K, V>>, Timestamp) -> Option<(V, SourceTag)>,
    {
        let now = self.clock.now();
        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let (value, source) = build(Some(occupied.get()), now)?;
                let entry = CacheEntry::new(key, value, now, ttl, source);
                occupied.insert(entry.clone());
                Some(entry)
            }
            Entry::Vacant(vacant) => {
                let (value, source) = build(None, now)?;
                let entry = CacheEntry::new(key, value, now, ttl, source);
                vacant.insert(entry.clone());
                Some(entry)
            }
        }
    }

    /// Remove one entry. Returns whether it existed.
    pub fn invalidate(&self, key: &K) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            CacheCounters::bump(&self.counters.invalidations, 1);
        }
        removed
    }

    /// Remove every entry whose key matches `predicate`.
    pub fn invalidate_where<P>(&self, mut predicate: P) -> usize
    where
        P: FnMut(&K) -> bool,
    {
        let mut removed = 0usize;
        self.entries.retain(|key, _| {
            if predicate(key) {
                removed += 1;
                false
            } else {
                true
            }
        });
        CacheCounters::bump(&self.counters.invalidations, removed as u64);
        removed
    }

    /// Remove every entry.
    pub fn invalidate_all(&self) -> usize {
        self.invalidate_where(|_| true)
    }

    /// Drop expired entries. Never called implicitly.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live_at(now));
        before.saturating_sub(self.entries.len())
    }

    /// Entries held, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.entries.len() as u64)
    }
}
