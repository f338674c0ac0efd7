//! AdPulse Test Utilities
//!
//! Centralized test infrastructure for the AdPulse workspace:
//! - Mock identity provider, profile store and platform fetchers
//! - Proptest generators for core types
//! - Test fixtures for common scenarios

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

// Re-export core types for convenience
pub use adpulse_core::{
    AdPlatform, AdPulseError, AdPulseResult, AuthEvent, AuthEventKind, EntityIdType, FetchError,
    MetricGroup, MetricWindow, MetricsFetcher, MetricsPayload, Profile, ProfileStore, Publication,
    Session, SessionProvider, SourceTag, TenantId, User, UserId, UserRole,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn hang() {
    std::future::pending::<()>().await
}

// ============================================================================
// MOCK SESSION PROVIDER
// ============================================================================

/// How [`MockSessionProvider::current_session`] behaves.
#[derive(Debug, Clone)]
pub enum SessionBehavior {
    Respond(Session),
    /// Respond after a delay (use with paused tokio time).
    Delay(Duration, Session),
    Fail(String),
    /// Never resolve.
    Hang,
}

/// Identity provider with scripted session results and a manual event feed.
#[derive(Debug)]
pub struct MockSessionProvider {
    behavior: Mutex<SessionBehavior>,
    events: broadcast::Sender<AuthEvent>,
    session_calls: AtomicUsize,
    sign_out_calls: AtomicUsize,
    fail_sign_out: Mutex<Option<String>>,
}

impl MockSessionProvider {
    pub fn new(behavior: SessionBehavior) -> Self {
        let (events, _rx) = broadcast::channel(64);
        Self {
            behavior: Mutex::new(behavior),
            events,
            session_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
            fail_sign_out: Mutex::new(None),
        }
    }

    /// Provider whose current session belongs to `user`.
    pub fn signed_in(user: User) -> Self {
        Self::new(SessionBehavior::Respond(fixtures::session_for(Some(user))))
    }

    pub fn signed_out() -> Self {
        Self::new(SessionBehavior::Respond(fixtures::session_for(None)))
    }

    pub fn hanging() -> Self {
        Self::new(SessionBehavior::Hang)
    }

    pub fn set_behavior(&self, behavior: SessionBehavior) {
        *lock(&self.behavior) = behavior;
    }

    /// Make `sign_out` fail with an upstream error.
    pub fn fail_sign_out(&self, message: impl Into<String>) {
        *lock(&self.fail_sign_out) = Some(message.into());
    }

    /// Push an auth event to every subscriber. Returns the receiver count.
    pub fn emit(&self, event: AuthEvent) -> usize {
        self.events.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    pub fn session_calls(&self) -> usize {
        self.session_calls.load(Ordering::SeqCst)
    }

    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionProvider for MockSessionProvider {
    async fn current_session(&self) -> AdPulseResult<Session> {
        self.session_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = lock(&self.behavior).clone();
        match behavior {
            SessionBehavior::Respond(session) => Ok(session),
            SessionBehavior::Delay(delay, session) => {
                tokio::time::sleep(delay).await;
                Ok(session)
            }
            SessionBehavior::Fail(message) => {
                Err(FetchError::upstream("session_provider", message).into())
            }
            SessionBehavior::Hang => {
                hang().await;
                Err(FetchError::aborted("session").into())
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn sign_out(&self) -> AdPulseResult<()> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = lock(&self.fail_sign_out).clone() {
            return Err(FetchError::upstream("session_provider", message).into());
        }
        self.emit(AuthEvent::signed_out());
        Ok(())
    }
}

// ============================================================================
// MOCK PROFILE STORE
// ============================================================================

/// How [`MockProfileStore::profile_for_user`] behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileBehavior {
    Respond,
    Fail,
    Hang,
}

/// In-memory profile store with call counting.
#[derive(Debug)]
pub struct MockProfileStore {
    profiles: Mutex<HashMap<UserId, Profile>>,
    behavior: Mutex<ProfileBehavior>,
    delay: Mutex<Option<Duration>>,
    calls: Mutex<Vec<UserId>>,
}

impl MockProfileStore {
    pub fn new() -> Self {
        Self {
            profiles: Mutex::new(HashMap::new()),
            behavior: Mutex::new(ProfileBehavior::Respond),
            delay: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_profiles(profiles: impl IntoIterator<Item = Profile>) -> Self {
        let store = Self::new();
        for profile in profiles {
            store.insert(profile);
        }
        store
    }

    pub fn insert(&self, profile: Profile) {
        lock(&self.profiles).insert(profile.user_id, profile);
    }

    pub fn set_behavior(&self, behavior: ProfileBehavior) {
        *lock(&self.behavior) = behavior;
    }

    /// Delay every response (use with paused tokio time).
    pub fn set_delay(&self, delay: Option<Duration>) {
        *lock(&self.delay) = delay;
    }

    pub fn calls(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn calls_for(&self, user_id: UserId) -> usize {
        lock(&self.calls).iter().filter(|id| **id == user_id).count()
    }
}

impl Default for MockProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProfileStore for MockProfileStore {
    async fn profile_for_user(&self, user_id: UserId) -> AdPulseResult<Option<Profile>> {
        lock(&self.calls).push(user_id);
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let behavior = *lock(&self.behavior);
        match behavior {
            ProfileBehavior::Respond => Ok(lock(&self.profiles).get(&user_id).cloned()),
            ProfileBehavior::Fail => {
                Err(FetchError::upstream("profile_store", "connection reset").into())
            }
            ProfileBehavior::Hang => {
                hang().await;
                Ok(None)
            }
        }
    }
}

// ============================================================================
// MOCK METRICS FETCHER
// ============================================================================

/// One scripted fetcher response.
#[derive(Debug, Clone)]
pub enum FetchScript {
    Respond(Publication<MetricsPayload>),
    Fail(FetchError),
    Hang,
}

/// Platform fetcher that replays scripted responses.
///
/// Responses are consumed in order; the last one repeats once the queue is
/// down to a single entry.
#[derive(Debug)]
pub struct MockMetricsFetcher {
    platform: AdPlatform,
    script: Mutex<VecDeque<FetchScript>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl MockMetricsFetcher {
    pub fn new(platform: AdPlatform) -> Self {
        Self {
            platform,
            script: Mutex::new(VecDeque::new()),
            delay: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fetcher that always returns a live payload with `clicks` clicks.
    pub fn live(platform: AdPlatform, clicks: u64) -> Self {
        Self::new(platform).then(FetchScript::Respond(Publication::live(
            fixtures::platform_payload(platform, clicks),
        )))
    }

    pub fn failing(platform: AdPlatform, message: &str) -> Self {
        Self::new(platform).then(FetchScript::Fail(FetchError::upstream(
            platform.as_str(),
            message,
        )))
    }

    pub fn hanging(platform: AdPlatform) -> Self {
        Self::new(platform).then(FetchScript::Hang)
    }

    pub fn then(self, step: FetchScript) -> Self {
        self.push(step);
        self
    }

    pub fn push(&self, step: FetchScript) {
        lock(&self.script).push_back(step);
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *lock(&self.delay) = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Option<FetchScript> {
        let mut script = lock(&self.script);
        if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        }
    }
}

#[async_trait]
impl MetricsFetcher for MockMetricsFetcher {
    fn platform(&self) -> AdPlatform {
        self.platform
    }

    async fn fetch_metrics(
        &self,
        _tenant_id: TenantId,
        _window: MetricWindow,
    ) -> Result<Publication<MetricsPayload>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.next_step() {
            Some(FetchScript::Respond(publication)) => Ok(publication),
            Some(FetchScript::Fail(error)) => Err(error),
            Some(FetchScript::Hang) => {
                hang().await;
                Err(FetchError::aborted(self.platform.as_str()))
            }
            None => Ok(Publication::placeholder(MetricsPayload::new())),
        }
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating AdPulse core types.

    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use uuid::Uuid;

    pub fn arb_tenant_id() -> impl Strategy<Value = TenantId> {
        any::<u128>().prop_map(|n| TenantId::from_uuid(Uuid::from_u128(n)))
    }

    pub fn arb_user_id() -> impl Strategy<Value = UserId> {
        any::<u128>().prop_map(|n| UserId::from_uuid(Uuid::from_u128(n)))
    }

    pub fn arb_platform() -> impl Strategy<Value = AdPlatform> {
        prop_oneof![Just(AdPlatform::GoogleAds), Just(AdPlatform::MetaAds)]
    }

    pub fn arb_source_tag() -> impl Strategy<Value = SourceTag> {
        prop_oneof![
            Just(SourceTag::FreshCache),
            Just(SourceTag::StaleCache),
            Just(SourceTag::ForcedRefresh),
            Just(SourceTag::Database),
            Just(SourceTag::LiveApi),
            Just(SourceTag::Placeholder),
            Just(SourceTag::Unknown),
        ]
    }

    pub fn arb_user_role() -> impl Strategy<Value = UserRole> {
        prop_oneof![
            Just(UserRole::Admin),
            Just(UserRole::Staff),
            Just(UserRole::Client)
        ]
    }

    /// Groups that are empty about half the time.
    pub fn arb_metric_group() -> impl Strategy<Value = MetricGroup> {
        prop_oneof![
            Just(MetricGroup::default()),
            (0u64..10_000, 0u64..1_000, 0u64..100, 0u64..1_000_000)
                .prop_map(|(i, c, v, s)| MetricGroup::new(i, c, v, s)),
        ]
    }

    pub fn arb_payload() -> impl Strategy<Value = MetricsPayload> {
        proptest::collection::btree_map(arb_platform(), arb_metric_group(), 0..=2).prop_map(
            |groups| {
                let mut payload = MetricsPayload::new();
                for (platform, group) in groups {
                    payload.insert_platform(platform, group);
                }
                payload
            },
        )
    }

    pub fn arb_publication() -> impl Strategy<Value = Publication<MetricsPayload>> {
        (arb_payload(), arb_source_tag(), any::<bool>()).prop_map(
            |(value, source, authoritative)| Publication {
                value,
                source,
                authoritative,
            },
        )
    }

    pub fn arb_window() -> impl Strategy<Value = MetricWindow> {
        (0i64..3_000, 1u32..90).prop_map(|(offset, days)| {
            let base = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or(NaiveDate::MIN);
            let end = base + chrono::Duration::days(offset);
            MetricWindow::trailing_days(end, days)
        })
    }

    /// Ages in minutes spanning every freshness tier.
    pub fn arb_age_minutes() -> impl Strategy<Value = i64> {
        0i64..(48 * 60)
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built objects for common test scenarios.

    use super::*;
    use chrono::NaiveDate;

    pub fn test_user(email: &str) -> User {
        User::new(UserId::now_v7(), email)
    }

    pub fn session_for(user: Option<User>) -> Session {
        Session {
            user,
            expires_at: None,
        }
    }

    pub fn test_profile(user: &User, role: UserRole) -> Profile {
        Profile::new(user.id, role).with_display_name(user.email.clone())
    }

    pub fn client_profile(user: &User, tenant_id: TenantId) -> Profile {
        test_profile(user, UserRole::Client).with_tenant(tenant_id)
    }

    /// March 2024, the window most tests use.
    pub fn test_window() -> MetricWindow {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap_or(NaiveDate::MIN);
        let end = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap_or(NaiveDate::MIN);
        MetricWindow::new(start, end)
    }

    pub fn platform_payload(platform: AdPlatform, clicks: u64) -> MetricsPayload {
        MetricsPayload::for_platform(platform, MetricGroup::new(clicks * 20, clicks, 0, clicks * 35))
    }

    /// Payload with every platform at `clicks` clicks.
    pub fn sample_payload(clicks: u64) -> MetricsPayload {
        let mut payload = MetricsPayload::new();
        for platform in AdPlatform::ALL {
            payload.merge(platform_payload(platform, clicks));
        }
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetcher_replays_script_and_repeats_last() {
        let fetcher = MockMetricsFetcher::new(AdPlatform::MetaAds)
            .then(FetchScript::Fail(FetchError::upstream("meta_ads", "500")))
            .then(FetchScript::Respond(Publication::live(fixtures::platform_payload(
                AdPlatform::MetaAds,
                3,
            ))));
        let tenant = TenantId::now_v7();
        let window = fixtures::test_window();

        assert!(fetcher.fetch_metrics(tenant, window).await.is_err());
        assert!(fetcher.fetch_metrics(tenant, window).await.is_ok());
        assert!(fetcher.fetch_metrics(tenant, window).await.is_ok());
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test]
    async fn test_session_provider_sign_out_emits_event() {
        let provider = MockSessionProvider::signed_in(fixtures::test_user("a@example.com"));
        let mut rx = provider.subscribe();
        provider.sign_out().await.unwrap();
        assert_eq!(rx.recv().await.unwrap().kind, AuthEventKind::SignedOut);
        assert_eq!(provider.sign_out_calls(), 1);
    }

    #[tokio::test]
    async fn test_profile_store_counts_calls() {
        let user = fixtures::test_user("a@example.com");
        let store = MockProfileStore::with_profiles([fixtures::test_profile(&user, UserRole::Admin)]);
        let profile = store.profile_for_user(user.id).await.unwrap();
        assert_eq!(profile.map(|p| p.role), Some(UserRole::Admin));
        assert_eq!(store.calls_for(user.id), 1);

        store.set_behavior(ProfileBehavior::Fail);
        assert!(store.profile_for_user(user.id).await.is_err());
    }
}
