//! UI-facing view of the session.

use adpulse_core::{AdPulseResult, Profile, SessionPhase, TenantId, User};
use tokio::sync::watch;

use crate::bootstrapper::SessionBootstrapper;
use crate::state::SessionState;

/// What a UI component holds to read and act on the session.
#[derive(Clone)]
pub struct SessionHandle {
    bootstrapper: SessionBootstrapper,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    pub(crate) fn new(bootstrapper: SessionBootstrapper, state: watch::Receiver<SessionState>) -> Self {
        Self {
            bootstrapper,
            state,
        }
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    pub fn profile(&self) -> Option<Profile> {
        self.state.borrow().profile.clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.borrow().phase
    }

    /// `true` until boot has finished.
    pub fn loading(&self) -> bool {
        !self.state.borrow().is_ready()
    }

    pub fn profile_loading(&self) -> bool {
        self.state.borrow().profile_loading
    }

    pub fn can_view_tenant(&self, tenant_id: TenantId) -> bool {
        self.state.borrow().can_view_tenant(tenant_id)
    }

    /// Wait for the next state change. Returns `false` once the
    /// bootstrapper is gone.
    pub async fn changed(&mut self) -> bool {
        self.state.changed().await.is_ok()
    }

    /// Wait until `predicate` holds for the current state.
    pub async fn wait_for<F>(&mut self, mut predicate: F) -> Option<SessionState>
    where
        F: FnMut(&SessionState) -> bool,
    {
        self.state
            .wait_for(|s| predicate(s))
            .await
            .ok()
            .map(|s| (*s).clone())
    }

    pub async fn sign_out(&self) -> AdPulseResult<()> {
        self.bootstrapper.sign_out().await
    }

    pub async fn refresh_profile(&self) -> Option<Profile> {
        self.bootstrapper.refresh_profile().await
    }
}
