//! Shared datasets for sibling panels.
//!
//! One owning fetch publishes a dataset; every panel keyed on the same
//! [`DatasetKey`] reads it without fetching again. Publishes go through the
//! acceptance policy in [`crate::dataset`], applied per part, so an empty
//! non-authoritative slice never blanks out a live part that already
//! exists.
//!
//! Each part remembers its own source and fetch time. A panel reading one
//! part through [`SharedDataBroker::consume_part`] sees that part's
//! provenance, not the least trusted tag of the whole entry.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use adpulse_core::{
    Clock, DataStatus, FetchError, Publication, SourceTag, SyncConfig, TenantId, Timestamp,
};
use tokio::sync::broadcast;
use tracing::debug;

use crate::coalescer::{RequestCoalescer, RequestState};
use crate::dataset::{least_trusted, Admission, Dataset, PublishOutcome};
use crate::dataset_key::DatasetKey;
use crate::freshness::{FreshnessClassifier, FreshnessReport, StaleDataWarning};
use crate::source::{SourceClassifier, SourceReport};
use crate::stats::{CacheStats, CoalescerStats};
use crate::ttl::{CacheEntry, TtlCache};

/// Change notification sent to broker subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerUpdate {
    pub key: DatasetKey,
    /// Provenance of the stored value; `None` when the key was invalidated.
    pub source: Option<SourceTag>,
}

/// Where one part of a stored value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartProvenance {
    pub source: SourceTag,
    pub fetched_at: Timestamp,
}

/// What a panel sees when it reads a shared key.
#[derive(Debug, Clone)]
pub struct SharedRead<V> {
    pub status: DataStatus,
    pub value: Option<V>,
    pub freshness: FreshnessReport,
    /// `None` while waiting.
    pub source: Option<SourceReport>,
    pub source_tag: Option<SourceTag>,
}

impl<V> SharedRead<V> {
    fn waiting() -> Self {
        Self {
            status: DataStatus::Waiting,
            value: None,
            freshness: FreshnessReport::unknown(),
            source: None,
            source_tag: None,
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.status == DataStatus::Waiting
    }

    pub fn source_label(&self) -> Option<&'static str> {
        self.source.map(|s| s.label)
    }

    pub fn warning(&self) -> Option<StaleDataWarning> {
        self.freshness.warning()
    }
}

#[derive(Debug, Clone)]
struct Stored<V> {
    value: V,
    parts: BTreeMap<String, PartProvenance>,
}

struct BrokerInner<V: Dataset> {
    cache: TtlCache<DatasetKey, Stored<V>>,
    requests: RequestCoalescer<DatasetKey, PublishOutcome>,
    freshness: FreshnessClassifier,
    updates: broadcast::Sender<BrokerUpdate>,
}

/// Shared dataset store with merge policy and change notifications.
///
/// Cheap to clone; clones share state.
pub struct SharedDataBroker<V: Dataset> {
    inner: Arc<BrokerInner<V>>,
}

impl<V: Dataset> Clone for SharedDataBroker<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: Dataset> SharedDataBroker<V> {
    pub fn new(ttl: Duration, event_capacity: usize, clock: Arc<dyn Clock>) -> Self {
        let (updates, _rx) = broadcast::channel(event_capacity.max(1));
        Self {
            inner: Arc::new(BrokerInner {
                cache: TtlCache::with_clock(ttl, Arc::clone(&clock)),
                requests: RequestCoalescer::with_clock(Arc::clone(&clock)),
                freshness: FreshnessClassifier::new(clock),
                updates,
            }),
        }
    }

    pub fn from_config(config: &SyncConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(config.dataset_ttl, config.event_capacity, clock)
    }

    /// Publish a value. Accepted parts replace the current entry; rejected
    /// parts keep their live value.
    pub fn publish(&self, key: &DatasetKey, publication: Publication<V>) -> PublishOutcome {
        first_outcome(self.write(key, vec![publication], false))
    }

    /// Publish a partial value. Accepted parts are folded into the live
    /// entry (if any) instead of replacing it.
    pub fn publish_merged(&self, key: &DatasetKey, publication: Publication<V>) -> PublishOutcome {
        first_outcome(self.write(key, vec![publication], true))
    }

    /// Merge several partial values in one atomic write with at most one
    /// notification. Each publication is judged on its own, in order.
    pub fn publish_merged_batch(
        &self,
        key: &DatasetKey,
        publications: Vec<Publication<V>>,
    ) -> Vec<PublishOutcome> {
        self.write(key, publications, true)
    }

    fn write(
        &self,
        key: &DatasetKey,
        publications: Vec<Publication<V>>,
        merge: bool,
    ) -> Vec<PublishOutcome> {
        let ttl = self.inner.cache.default_ttl();
        let mut outcomes = Vec::with_capacity(publications.len());

        let stored = self.inner.cache.put_with(key.clone(), ttl, |current, now| {
            let mut stored = current
                .filter(|entry| entry.is_live_at(now))
                .map(|entry| entry.value().clone());
            let mut last_source = None;

            for publication in publications {
                let Publication {
                    value,
                    source,
                    authoritative,
                } = publication;
                let live = stored.as_ref().map(|s| &s.value);
                let admission = Admission::judge(&value, live, authoritative);
                let outcome = admission.outcome();
                outcomes.push(outcome);

                let Some(next) = admission.apply(value, live, merge) else {
                    debug!(key = %key, source = %source, "Rejected empty publish over live data");
                    continue;
                };
                debug!(key = %key, source = %source, outcome = ?outcome, "Accepted publish");

                let mut parts = stored.take().map(|s| s.parts).unwrap_or_default();
                if !merge {
                    parts.retain(|part, _| admission.is_rejected(part));
                }
                for part in admission.accepted_parts() {
                    parts.insert(
                        part.to_string(),
                        PartProvenance {
                            source,
                            fetched_at: now,
                        },
                    );
                }
                stored = Some(Stored { value: next, parts });
                last_source = Some(source);
            }

            let source = last_source?;
            let stored = stored?;
            let source = stored
                .parts
                .values()
                .map(|p| p.source)
                .reduce(least_trusted)
                .unwrap_or(source);
            Some((stored, source))
        });

        if let Some(entry) = stored {
            self.notify(BrokerUpdate {
                key: key.clone(),
                source: Some(entry.source()),
            });
        }
        outcomes
    }

    /// Read the current value for a key.
    ///
    /// `Waiting` until something has been accepted (and after expiry or
    /// invalidation); `Empty` when the live value has no activity. The
    /// freshness is that of the oldest part.
    pub fn consume(&self, key: &DatasetKey) -> SharedRead<V> {
        let Some(entry) = self.inner.cache.get(key) else {
            return SharedRead::waiting();
        };
        let source = entry.source();
        let fetched_at = oldest_part(&entry).unwrap_or_else(|| entry.fetched_at());
        let value = entry.into_value().value;
        let status = if value.has_primary_activity() {
            DataStatus::Ready
        } else {
            DataStatus::Empty
        };
        SharedRead {
            status,
            value: Some(value),
            freshness: self.inner.freshness.classify(Some(fetched_at)),
            source: Some(SourceClassifier::classify(source)),
            source_tag: Some(source),
        }
    }

    /// Read one part of the value for a key, with that part's own source
    /// and age.
    ///
    /// `Waiting` while the part is absent; `Empty` when it is present but
    /// has no activity.
    pub fn consume_part<P, F>(&self, key: &DatasetKey, part: &str, extract: F) -> SharedRead<P>
    where
        F: FnOnce(&V) -> Option<P>,
    {
        let Some(entry) = self.inner.cache.get(key) else {
            return SharedRead::waiting();
        };
        let fallback = PartProvenance {
            source: entry.source(),
            fetched_at: entry.fetched_at(),
        };
        let stored = entry.into_value();
        let (Some(active), Some(value)) = (stored.value.part_activity(part), extract(&stored.value))
        else {
            return SharedRead::waiting();
        };
        let provenance = stored.parts.get(part).copied().unwrap_or(fallback);

        SharedRead {
            status: if active {
                DataStatus::Ready
            } else {
                DataStatus::Empty
            },
            value: Some(value),
            freshness: self.inner.freshness.classify(Some(provenance.fetched_at)),
            source: Some(SourceClassifier::classify(provenance.source)),
            source_tag: Some(provenance.source),
        }
    }

    /// Provenance of one live part, if stored.
    pub fn part_provenance(&self, key: &DatasetKey, part: &str) -> Option<PartProvenance> {
        self.inner
            .cache
            .get(key)
            .and_then(|entry| entry.value().parts.get(part).copied())
    }

    /// Run `producer` (coalesced per key) and publish its result under the
    /// same key.
    pub async fn refresh<F, Fut>(&self, key: &DatasetKey, producer: F) -> Result<PublishOutcome, FetchError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Publication<V>, FetchError>> + Send + 'static,
    {
        self.refresh_inner(key.clone(), key.clone(), producer, false)
            .await
    }

    /// Run `producer` coalesced on `request_key` and merge its result into
    /// `target`.
    pub async fn refresh_slice<F, Fut>(
        &self,
        request_key: &DatasetKey,
        target: &DatasetKey,
        producer: F,
    ) -> Result<PublishOutcome, FetchError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Publication<V>, FetchError>> + Send + 'static,
    {
        self.refresh_inner(request_key.clone(), target.clone(), producer, true)
            .await
    }

    async fn refresh_inner<F, Fut>(
        &self,
        request_key: DatasetKey,
        target: DatasetKey,
        producer: F,
        merge: bool,
    ) -> Result<PublishOutcome, FetchError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Publication<V>, FetchError>> + Send + 'static,
    {
        let broker = self.clone();
        self.inner
            .requests
            .fetch(request_key, move || async move {
                let publication = producer().await?;
                Ok(first_outcome(broker.write(&target, vec![publication], merge)))
            })
            .await
    }

    pub fn request_state(&self, key: &DatasetKey) -> RequestState {
        self.inner.requests.state(key)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BrokerUpdate> {
        self.inner.updates.subscribe()
    }

    pub fn invalidate(&self, key: &DatasetKey) -> bool {
        self.inner.requests.forget(key);
        let removed = self.inner.cache.invalidate(key);
        if removed {
            self.notify(BrokerUpdate {
                key: key.clone(),
                source: None,
            });
        }
        removed
    }

    /// Drop every dataset of one tenant, along with its request history.
    pub fn invalidate_tenant(&self, tenant_id: TenantId) -> usize {
        self.inner
            .requests
            .forget_where(|key| key.belongs_to(tenant_id));
        let mut removed = Vec::new();
        self.inner.cache.invalidate_where(|key| {
            let hit = key.belongs_to(tenant_id);
            if hit {
                removed.push(key.clone());
            }
            hit
        });
        let count = removed.len();
        for key in removed {
            self.notify(BrokerUpdate { key, source: None });
        }
        debug!(tenant_id = %tenant_id, removed = count, "Invalidated tenant datasets");
        count
    }

    pub fn invalidate_all(&self) -> usize {
        self.inner.requests.clear_history();
        let mut removed = Vec::new();
        self.inner.cache.invalidate_where(|key| {
            removed.push(key.clone());
            true
        });
        let count = removed.len();
        for key in removed {
            self.notify(BrokerUpdate { key, source: None });
        }
        count
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    pub fn coalescer_stats(&self) -> CoalescerStats {
        self.inner.requests.stats()
    }

    fn notify(&self, update: BrokerUpdate) {
        if self.inner.updates.send(update).is_err() {
            debug!("No broker subscribers");
        }
    }
}

fn first_outcome(outcomes: Vec<PublishOutcome>) -> PublishOutcome {
    outcomes.into_iter().next().unwrap_or(PublishOutcome::Rejected)
}

fn oldest_part<V>(entry: &CacheEntry<DatasetKey, Stored<V>>) -> Option<Timestamp> {
    entry.value().parts.values().map(|p| p.fetched_at).min()
}
