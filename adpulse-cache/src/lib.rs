//! AdPulse Cache - Shared Data Synchronization
//!
//! Coordinates fetches of advertising metrics between sibling dashboard
//! panels: one fetch per key at a time, lazily expiring cached results, and
//! trust annotations on everything handed to the UI.
//!
//! # Design Philosophy
//!
//! Caches that hide their staleness lead to dashboards that confidently show
//! old numbers. Every read here carries its provenance ([`SourceTag`]) and
//! its age tier ([`FreshnessTier`]), and an empty placeholder can never
//! silently replace real data, judged per platform group (see
//! [`Admission`]).
//!
//! # Lifecycle Safety
//!
//! Consumers hold a [`LifecycleToken`]. Results that arrive after a consumer
//! was torn down are discarded without mutating anything.
//!
//! # Example
//!
//! ```ignore
//! let sync = DashboardSync::from_config(&config, fetchers, clock);
//!
//! // Owning container loads every platform at once
//! let report = sync.load_shared(tenant_id, window).await;
//!
//! // A panel reads its slice, falling back to its own fetch while waiting
//! let read = sync.load_panel(tenant_id, AdPlatform::MetaAds, window).await?;
//! if let Some(warning) = read.warning() {
//!     tracing::info!(%warning, "Showing stale metrics");
//! }
//! ```
//!
//! [`SourceTag`]: adpulse_core::SourceTag
//! [`FreshnessTier`]: adpulse_core::FreshnessTier

pub mod broker;
pub mod cached_fetch;
pub mod coalescer;
pub mod dashboard;
pub mod dataset;
pub mod dataset_key;
pub mod freshness;
pub mod lifecycle;
pub mod source;
pub mod stats;
pub mod ttl;

pub use broker::{BrokerUpdate, PartProvenance, SharedDataBroker, SharedRead};
pub use cached_fetch::{producer, CachedFetch, FetchCache, FetchState, Producer};
pub use coalescer::{RequestCoalescer, RequestState, SharedFetch, DEFAULT_HISTORY_LIMIT};
pub use dashboard::{DashboardSync, PlatformFailure, SharedLoadReport};
pub use dataset::{least_trusted, AcceptReason, Admission, Dataset, PublishOutcome};
pub use dataset_key::DatasetKey;
pub use freshness::{
    age_label, classify_age, FreshnessClassifier, FreshnessReport, StaleDataWarning,
};
pub use lifecycle::{
    DisposeOnDrop, LifecycleGuard, LifecycleMetrics, LifecycleSnapshot, LifecycleToken,
};
pub use source::{SourceClassifier, SourceReport};
pub use stats::{CacheStats, CoalescerStats};
pub use ttl::{within_ttl, CacheEntry, TtlCache};
