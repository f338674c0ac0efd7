//! AdPulse Core - Entity Types
//!
//! Pure data structures shared by the cache and session crates: identifiers,
//! provenance and freshness enums, metrics payloads, the error taxonomy,
//! configuration and the clock abstraction. No coordination logic lives here.

pub mod clock;
pub mod config;
pub mod entities;
pub mod enums;
pub mod error;
pub mod identity;
pub mod providers;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SyncConfig;
pub use entities::{MetricGroup, MetricWindow, MetricsPayload, Profile, Session, User};
pub use enums::{
    AdPlatform, AuthEventKind, DataStatus, FreshnessTier, IndicatorColor, SessionPhase,
    SourceCategory, SourceTag, UserRole, UserRoleParseError,
};
pub use error::{AdPulseError, AdPulseResult, ConfigError, FetchError};
pub use identity::{EntityIdType, TenantId, Timestamp, UserId};
pub use providers::{AuthEvent, MetricsFetcher, ProfileStore, Publication, SessionProvider};

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
