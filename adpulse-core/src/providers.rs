//! External collaborator traits
//!
//! The identity provider, the profile store and the per-platform metrics
//! fetchers are owned elsewhere; the synchronization layer only depends on
//! these boundaries. Implementations must be `Send + Sync` so they can be
//! shared across spawned tasks.

use crate::{
    AdPlatform, AdPulseResult, AuthEventKind, FetchError, MetricWindow, MetricsPayload, Profile,
    Session, SourceTag, TenantId, User, UserId,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ============================================================================
// PUBLICATIONS
// ============================================================================

/// A fetched value together with its provenance.
///
/// Producers decide `source` and `authoritative` at the fetch boundary; the
/// cache layer never infers them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication<V> {
    pub value: V,
    pub source: SourceTag,
    /// Trusted even when it carries no activity (e.g. an explicit refresh).
    pub authoritative: bool,
}

impl<V> Publication<V> {
    pub fn new(value: V, source: SourceTag) -> Self {
        Self {
            value,
            source,
            authoritative: false,
        }
    }

    /// An update that replaces cached data even if it is empty.
    pub fn authoritative(value: V, source: SourceTag) -> Self {
        Self {
            value,
            source,
            authoritative: true,
        }
    }

    /// Result of a user-requested forced refresh.
    pub fn forced_refresh(value: V) -> Self {
        Self::authoritative(value, SourceTag::ForcedRefresh)
    }

    pub fn live(value: V) -> Self {
        Self::new(value, SourceTag::LiveApi)
    }

    pub fn placeholder(value: V) -> Self {
        Self::new(value, SourceTag::Placeholder)
    }

    pub fn map<U, F>(self, f: F) -> Publication<U>
    where
        F: FnOnce(V) -> U,
    {
        Publication {
            value: f(self.value),
            source: self.source,
            authoritative: self.authoritative,
        }
    }
}

// ============================================================================
// IDENTITY PROVIDER
// ============================================================================

/// Auth state change pushed by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    /// The user after the change; `None` means signed out.
    pub user: Option<User>,
}

impl AuthEvent {
    pub fn signed_in(user: User) -> Self {
        Self {
            kind: AuthEventKind::SignedIn,
            user: Some(user),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            kind: AuthEventKind::SignedOut,
            user: None,
        }
    }

    pub fn token_refreshed(user: User) -> Self {
        Self {
            kind: AuthEventKind::TokenRefreshed,
            user: Some(user),
        }
    }
}

/// Session/identity provider.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Fetch the current session, if any.
    async fn current_session(&self) -> AdPulseResult<Session>;

    /// Subscribe to auth state changes. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;

    /// End the current session.
    async fn sign_out(&self) -> AdPulseResult<()>;
}

/// Profile store keyed by user.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetch the profile for a user. `Ok(None)` if the user has none.
    async fn profile_for_user(&self, user_id: UserId) -> AdPulseResult<Option<Profile>>;
}

// ============================================================================
// AD PLATFORM FETCHERS
// ============================================================================

/// Metrics fetcher for one advertising platform.
#[async_trait]
pub trait MetricsFetcher: Send + Sync {
    fn platform(&self) -> AdPlatform;

    /// Fetch a tenant's totals for a window, tagged with their provenance.
    async fn fetch_metrics(
        &self,
        tenant_id: TenantId,
        window: MetricWindow,
    ) -> Result<Publication<MetricsPayload>, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publication_constructors() {
        let p = Publication::live(1u32);
        assert_eq!(p.source, SourceTag::LiveApi);
        assert!(!p.authoritative);

        let forced = Publication::forced_refresh(0u32);
        assert_eq!(forced.source, SourceTag::ForcedRefresh);
        assert!(forced.authoritative);

        let mapped = forced.map(|v| v + 1);
        assert_eq!(mapped.value, 1);
        assert!(mapped.authoritative);
    }

    #[test]
    fn test_auth_event_constructors() {
        assert_eq!(AuthEvent::signed_out().user, None);
        assert_eq!(AuthEvent::signed_out().kind, AuthEventKind::SignedOut);
    }
}
