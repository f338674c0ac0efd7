//! Per-key request coalescing.
//!
//! At most one producer runs per key. Callers arriving while it is pending
//! attach to the same shared future and observe the same outcome. The
//! pending entry is removed before the outcome is delivered, so a caller
//! that arrives after settlement always starts a new request.
//!
//! The coalescer never writes to a cache. Callers decide what to do with
//! the result.
//!
//! Settlement history is kept per key for [`RequestCoalescer::state`]. It
//! is bounded; once the limit is reached the oldest settlement is evicted.

use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use adpulse_core::{Clock, FetchError, SystemClock, Timestamp};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tracing::debug;

use crate::stats::CoalescerStats;

/// Outcome handle shared by every caller of one coalesced request.
pub type SharedFetch<V, E = FetchError> = Shared<BoxFuture<'static, Result<V, E>>>;

/// Settlements remembered before the oldest is evicted.
pub const DEFAULT_HISTORY_LIMIT: usize = 1024;

/// Per-key request state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Nothing has run for this key yet.
    Idle,
    /// A producer is running.
    Pending { subscribers: usize },
    /// The last request settled at `at`.
    Settled { at: Timestamp, succeeded: bool },
}

impl RequestState {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }
}

struct PendingRequest<V, E> {
    generation: u64,
    future: SharedFetch<V, E>,
    subscribers: Arc<AtomicUsize>,
}

#[derive(Debug, Clone, Copy)]
struct Settlement {
    at: Timestamp,
    succeeded: bool,
}

/// Collapses concurrent fetches for the same key into one producer call.
///
/// `E` is the producer's error type. Producers that cannot fail use
/// [`std::convert::Infallible`].
pub struct RequestCoalescer<K, V, E = FetchError>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pending: Arc<DashMap<K, PendingRequest<V, E>>>,
    settled: Arc<DashMap<K, Settlement>>,
    history_limit: usize,
    clock: Arc<dyn Clock>,
    next_generation: AtomicU64,
    started: AtomicU64,
    joined: AtomicU64,
}

impl<K, V, E> RequestCoalescer<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            settled: Arc::new(DashMap::new()),
            history_limit: DEFAULT_HISTORY_LIMIT,
            clock,
            next_generation: AtomicU64::new(0),
            started: AtomicU64::new(0),
            joined: AtomicU64::new(0),
        }
    }

    /// Cap the number of remembered settlements (at least one).
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    /// Join the pending request for `key`, or start `producer` if there is
    /// none.
    ///
    /// The producer is driven on a spawned task, so it settles (and the
    /// pending entry is cleared) even if every caller drops its handle.
    /// Must be called from within a tokio runtime.
    pub fn fetch<F, Fut>(&self, key: K, producer: F) -> SharedFetch<V, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let started = match self.pending.entry(key.clone()) {
            Entry::Occupied(occupied) => {
                let request = occupied.get();
                let subscribers = request.subscribers.fetch_add(1, Ordering::SeqCst) + 1;
                self.joined.fetch_add(1, Ordering::Relaxed);
                debug!(key = ?key, subscribers, "Joined pending request");
                return request.future.clone();
            }
            Entry::Vacant(vacant) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                let future = self.settling_future(key.clone(), generation, producer);
                vacant.insert(PendingRequest {
                    generation,
                    future: future.clone(),
                    subscribers: Arc::new(AtomicUsize::new(1)),
                });
                future
            }
        };

        // The shard lock is released here; the producer may now settle and
        // remove its own entry.
        self.started.fetch_add(1, Ordering::Relaxed);
        debug!(key = ?key, "Started request");
        tokio::spawn(started.clone());
        started
    }

    fn settling_future<F, Fut>(&self, key: K, generation: u64, producer: F) -> SharedFetch<V, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let pending = Arc::clone(&self.pending);
        let settled = Arc::clone(&self.settled);
        let history_limit = self.history_limit;
        let clock = Arc::clone(&self.clock);

        async move {
            let result = producer().await;
            pending.remove_if(&key, |_, request| request.generation == generation);
            settled.insert(
                key,
                Settlement {
                    at: clock.now(),
                    succeeded: result.is_ok(),
                },
            );
            evict_oldest(&settled, history_limit);
            result
        }
        .boxed()
        .shared()
    }

    pub fn state(&self, key: &K) -> RequestState {
        if let Some(request) = self.pending.get(key) {
            return RequestState::Pending {
                subscribers: request.subscribers.load(Ordering::SeqCst),
            };
        }
        match self.settled.get(key) {
            Some(settlement) => RequestState::Settled {
                at: settlement.at,
                succeeded: settlement.succeeded,
            },
            None => RequestState::Idle,
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Forget settlement history. Pending requests are unaffected.
    pub fn clear_history(&self) {
        self.settled.clear();
    }

    /// Forget the settlement of one key. Returns whether there was one.
    pub fn forget(&self, key: &K) -> bool {
        self.settled.remove(key).is_some()
    }

    /// Forget the settlement of every key matching `predicate`.
    pub fn forget_where<P>(&self, mut predicate: P) -> usize
    where
        P: FnMut(&K) -> bool,
    {
        let before = self.settled.len();
        self.settled.retain(|key, _| !predicate(key));
        before.saturating_sub(self.settled.len())
    }

    pub fn history_len(&self) -> usize {
        self.settled.len()
    }

    pub fn stats(&self) -> CoalescerStats {
        CoalescerStats {
            started: self.started.load(Ordering::Relaxed),
            joined: self.joined.load(Ordering::Relaxed),
            pending: self.pending.len() as u64,
        }
    }
}

impl<K, V, E> Default for RequestCoalescer<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

fn evict_oldest<K>(settled: &DashMap<K, Settlement>, limit: usize)
where
    K: Eq + Hash + Clone,
{
    while settled.len() > limit {
        let oldest = settled
            .iter()
            .min_by_key(|entry| entry.value().at)
            .map(|entry| entry.key().clone());
        match oldest {
            Some(key) => {
                settled.remove(&key);
            }
            None => break,
        }
    }
}
