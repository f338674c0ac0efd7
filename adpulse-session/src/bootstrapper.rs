//! Session bootstrap and auth event reconciliation.
//!
//! ## State machine
//!
//! `Uninitialized -> Initializing -> Ready`. The boot sequence and the
//! provider's auth event stream both write the session state:
//!
//! - Boot asks for the current session under a hard timeout. Timeout or
//!   error still ends in `Ready`, with no user.
//! - Each auth event replaces the user. An event that lands while the boot
//!   request is in flight wins; boot then only completes the phase.
//! - Profiles load in the background, never blocking `Ready`. Loads are
//!   cached per user, skipped while one is already running for that user,
//!   and bounded by their own timeout. A failed load yields no profile.
//! - Sign-out purges the whole profile cache.
//!
//! Teardown disposes the lifecycle token, stops the event listener and
//! resets the re-entrancy flags so a later `mount` boots from scratch.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use adpulse_cache::{CacheStats, LifecycleGuard, LifecycleSnapshot, LifecycleToken, TtlCache};
use adpulse_core::{
    AdPulseResult, AuthEvent, Clock, Profile, ProfileStore, SessionPhase, SessionProvider,
    SourceTag, SyncConfig, User, UserId,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::events::{SessionEvent, SessionEventBus};
use crate::handle::SessionHandle;
use crate::state::SessionState;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Replace the user, dropping the profile if the identity changed.
fn set_user(state: &mut SessionState, user: Option<User>) {
    let same_identity = state.user_id() == user.as_ref().map(|u| u.id);
    if !same_identity {
        state.profile = None;
        state.profile_loading = false;
    }
    state.user = user;
}

struct BootstrapInner {
    provider: Arc<dyn SessionProvider>,
    profiles: Arc<dyn ProfileStore>,
    config: SyncConfig,
    profile_cache: TtlCache<UserId, Option<Profile>>,
    /// user -> id of the load currently in flight
    profile_inflight: DashMap<UserId, u64>,
    next_load: AtomicU64,
    booting: AtomicBool,
    /// Bumped on every auth event and local sign-out.
    auth_epoch: AtomicU64,
    state: watch::Sender<SessionState>,
    events: SessionEventBus,
    lifecycle: LifecycleGuard,
    token: Mutex<Option<LifecycleToken>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

/// Owns the session and profile state for one UI instance.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionBootstrapper {
    inner: Arc<BootstrapInner>,
}

impl SessionBootstrapper {
    pub fn new(
        provider: Arc<dyn SessionProvider>,
        profiles: Arc<dyn ProfileStore>,
        config: SyncConfig,
        clock: Arc<dyn Clock>,
    ) -> AdPulseResult<Self> {
        config.validate()?;
        let (state, _rx) = watch::channel(SessionState::default());
        Ok(Self {
            inner: Arc::new(BootstrapInner {
                provider,
                profiles,
                profile_cache: TtlCache::with_clock(config.profile_ttl, clock),
                profile_inflight: DashMap::new(),
                next_load: AtomicU64::new(0),
                booting: AtomicBool::new(false),
                auth_epoch: AtomicU64::new(0),
                state,
                events: SessionEventBus::new(config.event_capacity),
                lifecycle: LifecycleGuard::new(),
                token: Mutex::new(None),
                listener: Mutex::new(None),
                config,
            }),
        })
    }

    /// Start listening for auth events and run the boot sequence.
    ///
    /// Returns once the phase is `Ready` (at most the session timeout). A
    /// second call while mounted is a no-op.
    pub async fn mount(&self) -> SessionHandle {
        if self.inner.booting.swap(true, Ordering::SeqCst) {
            debug!("Session already mounted");
            return self.handle();
        }

        let token = self.inner.lifecycle.create();
        *lock(&self.inner.token) = Some(token.clone());
        self.inner
            .state
            .send_modify(|s| s.phase = SessionPhase::Initializing);

        self.start_listener(token.clone());
        self.boot(&token).await;
        self.handle()
    }

    fn start_listener(&self, token: LifecycleToken) {
        let mut rx = self.inner.provider.subscribe();
        let this = self.clone();
        let listener = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if !token.is_alive() {
                            break;
                        }
                        this.handle_auth_event(event, &token);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Auth event listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Auth event listener stopped");
        });

        if let Some(previous) = lock(&self.inner.listener).replace(listener) {
            previous.abort();
        }
    }

    async fn boot(&self, token: &LifecycleToken) {
        let epoch = self.inner.auth_epoch.load(Ordering::SeqCst);
        let budget = self.inner.config.session_timeout;

        let user = match tokio::time::timeout(budget, self.inner.provider.current_session()).await
        {
            Ok(Ok(session)) => session.user,
            Ok(Err(error)) => {
                warn!(error = %error, "Session request failed");
                None
            }
            Err(_) => {
                warn!(
                    budget_ms = budget.as_millis() as u64,
                    "Session request timed out"
                );
                None
            }
        };

        let profile_target = token.run_if_alive(|| {
            let event_won = self.inner.auth_epoch.load(Ordering::SeqCst) != epoch;
            self.inner.state.send_modify(|s| {
                s.phase = SessionPhase::Ready;
                if !event_won {
                    set_user(s, user.clone());
                }
            });
            let user_id = self.inner.state.borrow().user_id();
            info!(user_id = ?user_id, event_won, "Session ready");
            self.inner.events.broadcast(SessionEvent::Booted { user_id });

            if event_won {
                None
            } else {
                user.as_ref().map(|u| u.id)
            }
        });

        if let Some(Some(user_id)) = profile_target {
            self.spawn_profile_load(user_id, token.clone());
        }
    }

    fn handle_auth_event(&self, event: AuthEvent, token: &LifecycleToken) {
        self.inner.auth_epoch.fetch_add(1, Ordering::SeqCst);
        debug!(kind = ?event.kind, "Auth state changed");

        match event.user {
            Some(user) => {
                let user_id = user.id;
                self.inner.state.send_modify(|s| set_user(s, Some(user)));
                self.inner
                    .events
                    .broadcast(SessionEvent::SignedIn { user_id });
                self.spawn_profile_load(user_id, token.clone());
            }
            None => self.clear_signed_out(),
        }
    }

    fn clear_signed_out(&self) {
        self.inner.state.send_modify(SessionState::clear_identity);
        let purged = self.inner.profile_cache.invalidate_all();
        debug!(purged, "Signed out; profile cache purged");
        self.inner.events.broadcast(SessionEvent::SignedOut);
    }

    fn spawn_profile_load(&self, user_id: UserId, token: LifecycleToken) {
        let this = self.clone();
        tokio::spawn(async move {
            this.load_profile(user_id, token, false).await;
        });
    }

    async fn load_profile(
        &self,
        user_id: UserId,
        token: LifecycleToken,
        force: bool,
    ) -> Option<Profile> {
        if !force {
            if let Some(entry) = self.inner.profile_cache.get(&user_id) {
                debug!(user_id = %user_id, "Profile served from cache");
                let profile = entry.into_value();
                self.apply_profile(user_id, profile.clone(), &token);
                return profile;
            }
        }

        let load_id = self.inner.next_load.fetch_add(1, Ordering::Relaxed);
        match self.inner.profile_inflight.entry(user_id) {
            Entry::Occupied(_) => {
                debug!(user_id = %user_id, "Profile load already in flight");
                return self.current_profile(user_id);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(load_id);
            }
        }

        token.run_if_alive(|| {
            self.inner.state.send_if_modified(|s| {
                if s.is_current_user(user_id) && !s.profile_loading {
                    s.profile_loading = true;
                    true
                } else {
                    false
                }
            })
        });

        let budget = self.inner.config.profile_timeout;
        let result =
            tokio::time::timeout(budget, self.inner.profiles.profile_for_user(user_id)).await;
        self.inner
            .profile_inflight
            .remove_if(&user_id, |_, id| *id == load_id);

        let profile = match result {
            Ok(Ok(profile)) => {
                if token.is_alive() && self.inner.state.borrow().is_current_user(user_id) {
                    self.inner.profile_cache.put_default(
                        user_id,
                        profile.clone(),
                        SourceTag::LiveApi,
                    );
                }
                profile
            }
            Ok(Err(error)) => {
                warn!(user_id = %user_id, error = %error, "Profile request failed");
                None
            }
            Err(_) => {
                warn!(
                    user_id = %user_id,
                    budget_ms = budget.as_millis() as u64,
                    "Profile request timed out"
                );
                None
            }
        };

        self.apply_profile(user_id, profile.clone(), &token);
        profile
    }

    /// Profile currently applied for `user_id`, if any.
    fn current_profile(&self, user_id: UserId) -> Option<Profile> {
        self.inner
            .state
            .borrow()
            .profile
            .clone()
            .filter(|profile| profile.user_id == user_id)
    }

    fn apply_profile(&self, user_id: UserId, profile: Option<Profile>, token: &LifecycleToken) {
        token.run_if_alive(|| {
            let found = profile.is_some();
            let applied = self.inner.state.send_if_modified(|s| {
                if !s.is_current_user(user_id) {
                    return false;
                }
                s.profile = profile;
                s.profile_loading = false;
                true
            });
            if applied {
                self.inner
                    .events
                    .broadcast(SessionEvent::ProfileApplied { user_id, found });
            } else {
                debug!(user_id = %user_id, "Discarded profile for a user who is no longer current");
            }
        });
    }

    fn live_token(&self) -> Option<LifecycleToken> {
        lock(&self.inner.token)
            .as_ref()
            .filter(|token| token.is_alive())
            .cloned()
    }

    /// End the session with the provider and clear it locally.
    ///
    /// The local state is cleared even if the provider call fails; the
    /// provider error is still returned.
    pub async fn sign_out(&self) -> AdPulseResult<()> {
        let result = self.inner.provider.sign_out().await;
        if let Err(error) = &result {
            warn!(error = %error, "Provider sign-out failed; clearing local session anyway");
        }

        self.inner.auth_epoch.fetch_add(1, Ordering::SeqCst);
        match self.live_token() {
            Some(_) => self.clear_signed_out(),
            None => {
                self.inner.profile_cache.invalidate_all();
            }
        }
        result
    }

    /// Reload the current user's profile, bypassing the cache.
    ///
    /// If a load for the user is already running, returns the profile that
    /// is currently applied instead of starting another.
    pub async fn refresh_profile(&self) -> Option<Profile> {
        let token = self.live_token()?;
        let user_id = self.inner.state.borrow().user_id()?;
        self.inner.profile_cache.invalidate(&user_id);
        self.load_profile(user_id, token, true).await
    }

    /// Tear down the owning UI instance.
    pub fn teardown(&self) {
        if let Some(token) = lock(&self.inner.token).take() {
            token.dispose();
        }
        if let Some(listener) = lock(&self.inner.listener).take() {
            listener.abort();
        }
        self.inner.profile_inflight.clear();
        self.inner.booting.store(false, Ordering::SeqCst);
        self.inner.events.broadcast(SessionEvent::TornDown);
        debug!("Session torn down");
    }

    pub fn is_mounted(&self) -> bool {
        self.live_token().is_some()
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(self.clone(), self.inner.state.subscribe())
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn profile_cache_stats(&self) -> CacheStats {
        self.inner.profile_cache.stats()
    }

    pub fn lifecycle_snapshot(&self) -> LifecycleSnapshot {
        self.inner.lifecycle.metrics().snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adpulse_core::EntityIdType;

    fn user(email: &str) -> User {
        User::new(UserId::now_v7(), email)
    }

    #[test]
    fn test_set_user_keeps_profile_for_same_identity() {
        let alice = user("a@example.com");
        let mut state = SessionState {
            user: Some(alice.clone()),
            profile: Some(Profile::new(alice.id, adpulse_core::UserRole::Admin)),
            ..Default::default()
        };
        set_user(&mut state, Some(alice.clone()));
        assert!(state.profile.is_some());

        set_user(&mut state, Some(user("b@example.com")));
        assert!(state.profile.is_none());
    }

    #[test]
    fn test_set_user_none_clears_profile() {
        let alice = user("a@example.com");
        let mut state = SessionState {
            user: Some(alice.clone()),
            profile: Some(Profile::new(alice.id, adpulse_core::UserRole::Client)),
            profile_loading: true,
            ..Default::default()
        };
        set_user(&mut state, None);
        assert!(state.user.is_none());
        assert!(state.profile.is_none());
        assert!(!state.profile_loading);
    }
}
