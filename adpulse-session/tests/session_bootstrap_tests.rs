//! Session Bootstrap Scenario Tests
//!
//! Boot and profile loading under hung providers, auth events racing the
//! boot request, sign-out cache purging, re-entrancy and teardown. Every
//! timeout scenario runs on paused tokio time.

use std::sync::Arc;
use std::time::Duration;

use adpulse_core::{ManualClock, SessionPhase, SyncConfig, UserRole};
use adpulse_session::{SessionBootstrapper, SessionEvent};
use adpulse_test_utils::fixtures::{session_for, test_profile, test_user};
use adpulse_test_utils::{
    AuthEvent, MockProfileStore, MockSessionProvider, ProfileBehavior, SessionBehavior,
};
use tokio::sync::broadcast;
use tokio::time::Instant;

fn bootstrapper(
    provider: Arc<MockSessionProvider>,
    store: Arc<MockProfileStore>,
) -> SessionBootstrapper {
    bootstrapper_with_clock(provider, store, Arc::new(ManualClock::at_epoch_2024()))
}

fn bootstrapper_with_clock(
    provider: Arc<MockSessionProvider>,
    store: Arc<MockProfileStore>,
    clock: Arc<ManualClock>,
) -> SessionBootstrapper {
    SessionBootstrapper::new(provider, store, SyncConfig::default(), clock)
        .expect("default config is valid")
}

async fn next_event<F>(rx: &mut broadcast::Receiver<SessionEvent>, predicate: F) -> SessionEvent
where
    F: Fn(&SessionEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            let event = rx.recv().await.expect("session event bus closed");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("expected session event never arrived")
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_hanging_session_request_still_reaches_ready() {
    let provider = Arc::new(MockSessionProvider::hanging());
    let session = bootstrapper(provider, Arc::new(MockProfileStore::new()));

    let started = Instant::now();
    let handle = session.mount().await;
    let elapsed = started.elapsed();

    assert_eq!(handle.phase(), SessionPhase::Ready);
    assert!(handle.user().is_none());
    assert!(!handle.loading());
    assert!(elapsed >= Duration::from_secs(2), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(2_100), "elapsed {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_failed_session_request_is_ready_without_user() {
    let provider = Arc::new(MockSessionProvider::new(SessionBehavior::Fail(
        "network down".to_string(),
    )));
    let session = bootstrapper(provider, Arc::new(MockProfileStore::new()));

    let started = Instant::now();
    let handle = session.mount().await;
    assert_eq!(handle.phase(), SessionPhase::Ready);
    assert!(handle.user().is_none());
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_hanging_profile_request_resolves_to_no_profile() {
    let alice = test_user("alice@example.com");
    let provider = Arc::new(MockSessionProvider::signed_in(alice.clone()));
    let store = Arc::new(MockProfileStore::new());
    store.set_behavior(ProfileBehavior::Hang);
    let session = bootstrapper(provider, store);
    let mut events = session.events();

    let started = Instant::now();
    let handle = session.mount().await;
    assert_eq!(handle.phase(), SessionPhase::Ready);
    assert_eq!(handle.user(), Some(alice.clone()));
    assert!(started.elapsed() < Duration::from_millis(100));

    let event = next_event(&mut events, |e| matches!(e, SessionEvent::ProfileApplied { .. })).await;
    let elapsed = started.elapsed();

    assert_eq!(
        event,
        SessionEvent::ProfileApplied {
            user_id: alice.id,
            found: false
        }
    );
    assert!(handle.profile().is_none());
    assert!(!handle.profile_loading());
    assert!(elapsed >= Duration::from_secs(3), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(3_100), "elapsed {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_profile_loads_in_background_after_ready() {
    let alice = test_user("alice@example.com");
    let provider = Arc::new(MockSessionProvider::signed_in(alice.clone()));
    let store = Arc::new(MockProfileStore::with_profiles([test_profile(
        &alice,
        UserRole::Admin,
    )]));
    store.set_delay(Some(Duration::from_millis(500)));
    let session = bootstrapper(provider, Arc::clone(&store));

    let mut handle = session.mount().await;
    assert_eq!(handle.phase(), SessionPhase::Ready);
    assert!(handle.profile().is_none());

    let state = handle
        .wait_for(|s| s.profile.is_some())
        .await
        .expect("bootstrapper alive");
    assert_eq!(state.profile.map(|p| p.role), Some(UserRole::Admin));
    assert_eq!(store.calls_for(alice.id), 1);
}

#[tokio::test(start_paused = true)]
async fn test_sign_out_purges_cached_profile_before_next_sign_in() {
    let alice = test_user("alice@example.com");
    let bob = test_user("bob@example.com");
    let provider = Arc::new(MockSessionProvider::signed_in(alice.clone()));
    let store = Arc::new(MockProfileStore::with_profiles([
        test_profile(&alice, UserRole::Staff),
        test_profile(&bob, UserRole::Client),
    ]));
    let session = bootstrapper(Arc::clone(&provider), Arc::clone(&store));
    let mut events = session.events();

    let handle = session.mount().await;
    next_event(&mut events, |e| {
        matches!(e, SessionEvent::ProfileApplied { user_id, .. } if *user_id == alice.id)
    })
    .await;
    assert_eq!(session.profile_cache_stats().entry_count, 1);

    provider.emit(AuthEvent::signed_out());
    next_event(&mut events, |e| *e == SessionEvent::SignedOut).await;
    assert!(handle.user().is_none());
    assert!(handle.profile().is_none());
    assert_eq!(session.profile_cache_stats().entry_count, 0);

    provider.emit(AuthEvent::signed_in(bob.clone()));
    next_event(&mut events, |e| {
        matches!(e, SessionEvent::ProfileApplied { user_id, .. } if *user_id == bob.id)
    })
    .await;

    let profile = handle.profile().expect("bob's profile");
    assert_eq!(profile.user_id, bob.id);
    assert_eq!(profile.role, UserRole::Client);

    // Alice signing back in must hit the store again; her entry was purged.
    provider.emit(AuthEvent::signed_in(alice.clone()));
    next_event(&mut events, |e| {
        matches!(e, SessionEvent::ProfileApplied { user_id, .. } if *user_id == alice.id)
    })
    .await;
    assert_eq!(store.calls_for(alice.id), 2);
}

#[tokio::test(start_paused = true)]
async fn test_auth_event_during_boot_wins() {
    let alice = test_user("alice@example.com");
    let bob = test_user("bob@example.com");
    let provider = Arc::new(MockSessionProvider::new(SessionBehavior::Delay(
        Duration::from_secs(1),
        session_for(Some(alice.clone())),
    )));
    let session = bootstrapper(Arc::clone(&provider), Arc::new(MockProfileStore::new()));

    let mount = {
        let session = session.clone();
        tokio::spawn(async move { session.mount().await })
    };
    while provider.subscriber_count() == 0 {
        tokio::task::yield_now().await;
    }
    provider.emit(AuthEvent::signed_in(bob.clone()));

    let handle = mount.await.expect("mount task");
    assert_eq!(handle.phase(), SessionPhase::Ready);
    assert_eq!(handle.user(), Some(bob));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_profile_loads_for_same_user_are_collapsed() {
    let alice = test_user("alice@example.com");
    let provider = Arc::new(MockSessionProvider::signed_in(alice.clone()));
    let store = Arc::new(MockProfileStore::with_profiles([test_profile(
        &alice,
        UserRole::Admin,
    )]));
    store.set_delay(Some(Duration::from_millis(800)));
    let session = bootstrapper(Arc::clone(&provider), Arc::clone(&store));
    let mut events = session.events();

    session.mount().await;
    settle().await;
    provider.emit(AuthEvent::token_refreshed(alice.clone()));
    provider.emit(AuthEvent::token_refreshed(alice.clone()));
    settle().await;

    next_event(&mut events, |e| matches!(e, SessionEvent::ProfileApplied { .. })).await;
    assert_eq!(store.calls_for(alice.id), 1);
    assert!(session.state().profile.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_second_mount_is_a_noop() {
    let provider = Arc::new(MockSessionProvider::signed_out());
    let session = bootstrapper(Arc::clone(&provider), Arc::new(MockProfileStore::new()));

    session.mount().await;
    session.mount().await;
    assert_eq!(provider.session_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_teardown_stops_transitions_and_allows_remount() {
    let alice = test_user("alice@example.com");
    let bob = test_user("bob@example.com");
    let provider = Arc::new(MockSessionProvider::signed_in(alice.clone()));
    let session = bootstrapper(Arc::clone(&provider), Arc::new(MockProfileStore::new()));

    let handle = session.mount().await;
    settle().await;
    session.teardown();
    assert!(!session.is_mounted());

    provider.emit(AuthEvent::signed_in(bob.clone()));
    settle().await;
    assert_eq!(handle.user(), Some(alice.clone()));

    provider.set_behavior(SessionBehavior::Respond(session_for(Some(bob.clone()))));
    let handle = session.mount().await;
    assert!(session.is_mounted());
    assert_eq!(provider.session_calls(), 2);
    assert_eq!(handle.user(), Some(bob));
    assert_eq!(session.lifecycle_snapshot().created, 2);
}

#[tokio::test(start_paused = true)]
async fn test_profile_arriving_after_teardown_is_discarded() {
    let alice = test_user("alice@example.com");
    let provider = Arc::new(MockSessionProvider::signed_in(alice.clone()));
    let store = Arc::new(MockProfileStore::with_profiles([test_profile(
        &alice,
        UserRole::Admin,
    )]));
    store.set_delay(Some(Duration::from_secs(1)));
    let session = bootstrapper(provider, Arc::clone(&store));

    let handle = session.mount().await;
    settle().await;
    session.teardown();
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(store.calls(), 1);
    assert!(handle.profile().is_none());
    assert_eq!(session.profile_cache_stats().entry_count, 0);
    assert!(session.lifecycle_snapshot().discarded >= 1);
}

#[tokio::test(start_paused = true)]
async fn test_sign_out_clears_locally_even_if_provider_fails() {
    let alice = test_user("alice@example.com");
    let provider = Arc::new(MockSessionProvider::signed_in(alice));
    provider.fail_sign_out("provider unavailable");
    let session = bootstrapper(Arc::clone(&provider), Arc::new(MockProfileStore::new()));

    let handle = session.mount().await;
    let result = handle.sign_out().await;

    assert!(result.is_err());
    assert!(handle.user().is_none());
    assert_eq!(provider.sign_out_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_profile_bypasses_cache() {
    let alice = test_user("alice@example.com");
    let provider = Arc::new(MockSessionProvider::signed_in(alice.clone()));
    let store = Arc::new(MockProfileStore::with_profiles([test_profile(
        &alice,
        UserRole::Staff,
    )]));
    let session = bootstrapper(provider, Arc::clone(&store));
    let mut events = session.events();

    let handle = session.mount().await;
    next_event(&mut events, |e| matches!(e, SessionEvent::ProfileApplied { .. })).await;

    store.insert(test_profile(&alice, UserRole::Admin));
    let refreshed = handle.refresh_profile().await.expect("profile");

    assert_eq!(refreshed.role, UserRole::Admin);
    assert_eq!(handle.profile().map(|p| p.role), Some(UserRole::Admin));
    assert_eq!(store.calls_for(alice.id), 2);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_while_load_in_flight_returns_current_profile() {
    let alice = test_user("alice@example.com");
    let provider = Arc::new(MockSessionProvider::signed_in(alice.clone()));
    let store = Arc::new(MockProfileStore::with_profiles([test_profile(
        &alice,
        UserRole::Staff,
    )]));
    store.set_delay(Some(Duration::from_millis(500)));
    let session = bootstrapper(provider, Arc::clone(&store));
    let mut events = session.events();

    let handle = session.mount().await;
    next_event(&mut events, |e| matches!(e, SessionEvent::ProfileApplied { .. })).await;

    store.insert(test_profile(&alice, UserRole::Admin));
    let (first, second) = tokio::join!(handle.refresh_profile(), handle.refresh_profile());

    assert_eq!(first.map(|p| p.role), Some(UserRole::Admin));
    assert_eq!(second.map(|p| p.role), Some(UserRole::Staff));
    assert_eq!(handle.profile().map(|p| p.role), Some(UserRole::Admin));
    assert_eq!(store.calls_for(alice.id), 2);
}

#[tokio::test(start_paused = true)]
async fn test_profile_is_cached_per_user_until_ttl_expires() {
    let alice = test_user("alice@example.com");
    let provider = Arc::new(MockSessionProvider::signed_in(alice.clone()));
    let store = Arc::new(MockProfileStore::with_profiles([test_profile(
        &alice,
        UserRole::Staff,
    )]));
    let clock = Arc::new(ManualClock::at_epoch_2024());
    let session = bootstrapper_with_clock(Arc::clone(&provider), Arc::clone(&store), clock.clone());
    let mut events = session.events();
    let applied_for_alice = |e: &SessionEvent| {
        matches!(e, SessionEvent::ProfileApplied { user_id, found: true } if *user_id == alice.id)
    };

    session.mount().await;
    next_event(&mut events, applied_for_alice).await;
    assert_eq!(store.calls_for(alice.id), 1);

    // Within the TTL a reload is served from the per-user cache.
    clock.advance(Duration::from_secs(10));
    provider.emit(AuthEvent::token_refreshed(alice.clone()));
    next_event(&mut events, applied_for_alice).await;
    assert_eq!(store.calls_for(alice.id), 1);

    clock.advance(SyncConfig::default().profile_ttl);
    provider.emit(AuthEvent::token_refreshed(alice.clone()));
    next_event(&mut events, applied_for_alice).await;
    assert_eq!(store.calls_for(alice.id), 2);
    assert_eq!(session.state().profile.map(|p| p.role), Some(UserRole::Staff));
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let result = SessionBootstrapper::new(
        Arc::new(MockSessionProvider::signed_out()),
        Arc::new(MockProfileStore::new()),
        SyncConfig::default().with_session_timeout(Duration::ZERO),
        Arc::new(ManualClock::at_epoch_2024()),
    );
    assert!(result.is_err());
}
