//! Observable session state.

use adpulse_core::{Profile, SessionPhase, TenantId, User, UserId};

/// Identity and profile as currently known.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub user: Option<User>,
    pub profile: Option<Profile>,
    pub profile_loading: bool,
}

impl SessionState {
    pub fn is_ready(&self) -> bool {
        self.phase == SessionPhase::Ready
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user.as_ref().map(|u| u.id)
    }

    pub fn is_current_user(&self, user_id: UserId) -> bool {
        self.user_id() == Some(user_id)
    }

    /// Whether the signed-in profile may request data for `tenant_id`.
    /// `false` until a profile is loaded.
    pub fn can_view_tenant(&self, tenant_id: TenantId) -> bool {
        self.profile
            .as_ref()
            .is_some_and(|p| p.can_view_tenant(tenant_id))
    }

    pub(crate) fn clear_identity(&mut self) {
        self.user = None;
        self.profile = None;
        self.profile_loading = false;
    }
}
