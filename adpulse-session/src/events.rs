//! Session change notifications.
//!
//! The bootstrapper reports each transition on a tokio broadcast channel.
//! Slow subscribers lag and miss events; nothing blocks on them.

use adpulse_core::UserId;
use tokio::sync::broadcast;
use tracing::debug;

/// A transition of the session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Boot finished; the session is interactive.
    Booted { user_id: Option<UserId> },
    /// An auth event set a user.
    SignedIn { user_id: UserId },
    /// User and profile were cleared and the profile cache purged.
    SignedOut,
    /// A profile request settled and was applied.
    ProfileApplied { user_id: UserId, found: bool },
    /// The owner was torn down.
    TornDown,
}

impl SessionEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::Booted { .. } => "booted",
            SessionEvent::SignedIn { .. } => "signed_in",
            SessionEvent::SignedOut => "signed_out",
            SessionEvent::ProfileApplied { .. } => "profile_applied",
            SessionEvent::TornDown => "torn_down",
        }
    }
}

/// Fan-out of [`SessionEvent`]s.
#[derive(Debug, Clone)]
pub struct SessionEventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Send to every subscriber. Dropped silently if there are none.
    pub fn broadcast(&self, event: SessionEvent) {
        let event_type = event.event_type();
        match self.tx.send(event) {
            Ok(receivers) => {
                debug!(event_type = event_type, receivers = receivers, "Broadcast session event");
            }
            Err(_) => {
                debug!(event_type = event_type, "No receivers for session event");
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}
