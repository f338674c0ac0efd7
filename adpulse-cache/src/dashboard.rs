//! The two fetch paths that feed a tenant's shared dataset.
//!
//! The owning container calls [`DashboardSync::load_shared`], which fetches
//! every platform concurrently and publishes each platform's slice under the
//! shared key. A panel whose slice is still missing calls
//! [`DashboardSync::load_panel`], which fetches only its own platform and
//! merges that slice into the same key. Both paths go through the broker's
//! acceptance policy one platform group at a time, so whichever finishes
//! last cannot blank out the other, and each slice keeps its own source.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use adpulse_core::{
    AdPlatform, Clock, FetchError, MetricGroup, MetricWindow, MetricsFetcher, MetricsPayload,
    Publication, SyncConfig, TenantId,
};
use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::broker::{SharedDataBroker, SharedRead};
use crate::coalescer::RequestCoalescer;
use crate::dataset::PublishOutcome;
use crate::dataset_key::DatasetKey;

/// One platform that failed during a shared load.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformFailure {
    pub platform: AdPlatform,
    pub error: FetchError,
}

/// Result of [`DashboardSync::load_shared`].
#[derive(Debug, Clone, PartialEq)]
pub struct SharedLoadReport {
    pub key: DatasetKey,
    pub loaded: Vec<AdPlatform>,
    pub failures: Vec<PlatformFailure>,
    /// Publish outcome per loaded platform. Failed platforms have none.
    pub outcomes: BTreeMap<AdPlatform, PublishOutcome>,
}

impl SharedLoadReport {
    pub fn failure_for(&self, platform: AdPlatform) -> Option<&FetchError> {
        self.failures
            .iter()
            .find(|f| f.platform == platform)
            .map(|f| &f.error)
    }

    pub fn outcome_for(&self, platform: AdPlatform) -> Option<PublishOutcome> {
        self.outcomes.get(&platform).copied()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// True if at least one platform's slice was written.
    pub fn published(&self) -> bool {
        self.outcomes.values().any(PublishOutcome::is_accepted)
    }
}

struct DashboardInner {
    broker: SharedDataBroker<MetricsPayload>,
    fetchers: BTreeMap<AdPlatform, Arc<dyn MetricsFetcher>>,
    shared_loads: RequestCoalescer<DatasetKey, SharedLoadReport, Infallible>,
    fetch_timeout: Duration,
}

/// Coordinates the shared and per-panel fetch paths for all platforms.
#[derive(Clone)]
pub struct DashboardSync {
    inner: Arc<DashboardInner>,
}

impl DashboardSync {
    pub fn new(
        broker: SharedDataBroker<MetricsPayload>,
        fetchers: Vec<Arc<dyn MetricsFetcher>>,
        fetch_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let fetchers = fetchers
            .into_iter()
            .map(|fetcher| (fetcher.platform(), fetcher))
            .collect();
        Self {
            inner: Arc::new(DashboardInner {
                broker,
                fetchers,
                shared_loads: RequestCoalescer::with_clock(clock),
                fetch_timeout,
            }),
        }
    }

    pub fn from_config(
        config: &SyncConfig,
        fetchers: Vec<Arc<dyn MetricsFetcher>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let broker = SharedDataBroker::from_config(config, Arc::clone(&clock));
        Self::new(broker, fetchers, config.fetch_timeout, clock)
    }

    pub fn broker(&self) -> &SharedDataBroker<MetricsPayload> {
        &self.inner.broker
    }

    pub fn platforms(&self) -> Vec<AdPlatform> {
        self.inner.fetchers.keys().copied().collect()
    }

    /// Fetch every platform concurrently and publish the merged dataset.
    ///
    /// Concurrent calls for the same tenant and window share one load.
    pub async fn load_shared(&self, tenant_id: TenantId, window: MetricWindow) -> SharedLoadReport {
        let key = DatasetKey::shared(tenant_id, window);
        let this = self.clone();
        let load_key = key.clone();
        let result = self
            .inner
            .shared_loads
            .fetch(key, move || async move {
                Ok::<_, Infallible>(this.run_shared_load(load_key).await)
            })
            .await;

        match result {
            Ok(report) => report,
            Err(never) => match never {},
        }
    }

    async fn run_shared_load(&self, key: DatasetKey) -> SharedLoadReport {
        let tenant_id = key.tenant_id();
        let window = key.window();
        let budget = self.inner.fetch_timeout;

        let results = join_all(self.inner.fetchers.iter().map(|(platform, fetcher)| {
            let fetcher = Arc::clone(fetcher);
            let platform = *platform;
            async move {
                (
                    platform,
                    fetch_with_timeout(fetcher, tenant_id, window, budget).await,
                )
            }
        }))
        .await;

        let mut loaded = Vec::new();
        let mut failures = Vec::new();
        let mut publications = Vec::new();

        for (platform, result) in results {
            match result {
                Ok(publication) => {
                    loaded.push(platform);
                    publications.push(publication);
                }
                Err(error) => {
                    warn!(key = %key, platform = %platform, error = %error, "Platform fetch failed");
                    failures.push(PlatformFailure { platform, error });
                }
            }
        }

        let outcomes: BTreeMap<AdPlatform, PublishOutcome> = if publications.is_empty() {
            BTreeMap::new()
        } else {
            let outcomes = self.inner.broker.publish_merged_batch(&key, publications);
            loaded.iter().copied().zip(outcomes).collect()
        };
        debug!(
            key = %key,
            loaded = loaded.len(),
            failed = failures.len(),
            outcomes = ?outcomes,
            "Shared load finished"
        );

        SharedLoadReport {
            key,
            loaded,
            failures,
            outcomes,
        }
    }

    /// Per-panel fallback.
    ///
    /// If the shared dataset already holds this platform's slice, returns
    /// it without fetching. Otherwise fetches the platform alone (coalesced
    /// per platform key) and merges it into the shared dataset.
    pub async fn load_panel(
        &self,
        tenant_id: TenantId,
        platform: AdPlatform,
        window: MetricWindow,
    ) -> Result<SharedRead<MetricGroup>, FetchError> {
        let current = self.panel_read(tenant_id, platform, window);
        if !current.is_waiting() {
            return Ok(current);
        }

        let fetcher = self
            .inner
            .fetchers
            .get(&platform)
            .cloned()
            .ok_or_else(|| FetchError::upstream(platform.as_str(), "no fetcher registered"))?;
        let budget = self.inner.fetch_timeout;
        let request_key = DatasetKey::platform(tenant_id, platform, window);
        let shared_key = request_key.to_shared();

        let outcome = self
            .inner
            .broker
            .refresh_slice(&request_key, &shared_key, move || {
                fetch_with_timeout(fetcher, tenant_id, window, budget)
            })
            .await?;
        debug!(key = %request_key, outcome = ?outcome, "Panel fallback finished");

        Ok(self.panel_read(tenant_id, platform, window))
    }

    /// One platform's slice of the shared dataset, with the source and age
    /// of that slice.
    ///
    /// `Waiting` until that platform's group has been published, even if a
    /// sibling's group already has.
    pub fn panel_read(
        &self,
        tenant_id: TenantId,
        platform: AdPlatform,
        window: MetricWindow,
    ) -> SharedRead<MetricGroup> {
        self.inner.broker.consume_part(
            &DatasetKey::shared(tenant_id, window),
            platform.as_str(),
            |payload| payload.platform(platform).cloned(),
        )
    }

    /// Read the whole shared dataset.
    pub fn shared_read(&self, tenant_id: TenantId, window: MetricWindow) -> SharedRead<MetricsPayload> {
        self.inner.broker.consume(&DatasetKey::shared(tenant_id, window))
    }

    /// Drop a tenant's datasets and the history of its shared loads.
    pub fn invalidate_tenant(&self, tenant_id: TenantId) -> usize {
        self.inner
            .shared_loads
            .forget_where(|key| key.belongs_to(tenant_id));
        self.inner.broker.invalidate_tenant(tenant_id)
    }

    pub fn shared_load_history(&self) -> usize {
        self.inner.shared_loads.history_len()
    }
}

async fn fetch_with_timeout(
    fetcher: Arc<dyn MetricsFetcher>,
    tenant_id: TenantId,
    window: MetricWindow,
    budget: Duration,
) -> Result<Publication<MetricsPayload>, FetchError> {
    let platform = fetcher.platform();
    match tokio::time::timeout(budget, fetcher.fetch_metrics(tenant_id, window)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(platform = %platform, budget_ms = budget.as_millis() as u64, "Platform fetch timed out");
            Err(FetchError::timeout(platform.as_str(), budget))
        }
    }
}
