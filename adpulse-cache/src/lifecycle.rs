//! Liveness tokens for UI consumers.
//!
//! Every consumer (a panel, the session bootstrapper) holds one
//! [`LifecycleToken`]. Asynchronous continuations capture a clone and check
//! it after each suspension point; once the consumer is torn down the token
//! is dead and the continuation discards its result without error.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for token creation and disposal.
///
/// Observability only. Nothing in the cache layer reads these to make
/// decisions.
#[derive(Debug, Default)]
pub struct LifecycleMetrics {
    /// Tokens created since startup
    pub created: AtomicU64,
    /// Tokens disposed since startup
    pub disposed: AtomicU64,
    /// Continuations dropped because their token was dead
    pub discarded: AtomicU64,
}

impl LifecycleMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokens currently alive.
    pub fn live(&self) -> u64 {
        self.created
            .load(Ordering::Relaxed)
            .saturating_sub(self.disposed.load(Ordering::Relaxed))
    }

    pub fn snapshot(&self) -> LifecycleSnapshot {
        LifecycleSnapshot {
            created: self.created.load(Ordering::Relaxed),
            disposed: self.disposed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of lifecycle metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleSnapshot {
    pub created: u64,
    pub disposed: u64,
    pub discarded: u64,
}

/// Issues tokens and records their lifecycle.
#[derive(Debug, Clone, Default)]
pub struct LifecycleGuard {
    metrics: Arc<LifecycleMetrics>,
    next_id: Arc<AtomicU64>,
}

impl LifecycleGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a live token for one consumer instance.
    pub fn create(&self) -> LifecycleToken {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.metrics.created.fetch_add(1, Ordering::Relaxed);
        LifecycleToken {
            inner: Arc::new(TokenInner {
                id,
                alive: AtomicBool::new(true),
                metrics: Arc::clone(&self.metrics),
            }),
        }
    }

    /// Dispose a token. Idempotent.
    pub fn dispose(&self, token: &LifecycleToken) -> bool {
        token.dispose()
    }

    pub fn metrics(&self) -> &LifecycleMetrics {
        &self.metrics
    }
}

#[derive(Debug)]
struct TokenInner {
    id: u64,
    alive: AtomicBool,
    metrics: Arc<LifecycleMetrics>,
}

/// Shared liveness flag for one consumer.
///
/// Clones observe the same flag. It starts `true`, flips to `false` once on
/// disposal and never comes back.
#[derive(Debug, Clone)]
pub struct LifecycleToken {
    inner: Arc<TokenInner>,
}

impl LifecycleToken {
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::SeqCst)
    }

    /// Mark the owning consumer as torn down.
    ///
    /// Returns `true` only for the call that actually flipped the flag.
    pub fn dispose(&self) -> bool {
        let was_alive = self.inner.alive.swap(false, Ordering::SeqCst);
        if was_alive {
            self.inner.metrics.disposed.fetch_add(1, Ordering::Relaxed);
        }
        was_alive
    }

    /// Run `f` only while the token is alive.
    ///
    /// A dead token turns the call into a silent no-op returning `None`.
    pub fn run_if_alive<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        if self.is_alive() {
            Some(f())
        } else {
            self.inner.metrics.discarded.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(token = self.inner.id, "Discarded continuation for dead token");
            None
        }
    }

    /// Dispose this token when the returned guard is dropped.
    pub fn dispose_on_drop(&self) -> DisposeOnDrop {
        DisposeOnDrop {
            token: self.clone(),
        }
    }
}

/// Disposes its token on drop. Ties a token to the scope of its owner.
#[derive(Debug)]
pub struct DisposeOnDrop {
    token: LifecycleToken,
}

impl DisposeOnDrop {
    pub fn token(&self) -> &LifecycleToken {
        &self.token
    }
}

impl Drop for DisposeOnDrop {
    fn drop(&mut self) {
        self.token.dispose();
    }
}
