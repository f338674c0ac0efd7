//! AdPulse Session - Identity Bootstrap
//!
//! Boots the authenticated session and the user's dashboard profile under
//! fixed time budgets, and keeps both in step with the identity provider's
//! auth event stream.
//!
//! ## Architecture
//!
//! - [`SessionBootstrapper`] owns the state and runs boot, profile loads and
//!   the auth event listener
//! - [`SessionHandle`] is the read/act view given to UI components
//! - [`SessionEventBus`] broadcasts transitions to observers
//! - [`telemetry`] installs the tracing subscriber
//!
//! ## Example
//!
//! ```ignore
//! let config = SyncConfig::from_env();
//! init_tracing(&TelemetryConfig::from_env())?;
//!
//! let session = SessionBootstrapper::new(provider, profiles, config, Arc::new(SystemClock))?;
//! let handle = session.mount().await;
//! if let Some(profile) = handle.profile() {
//!     // gate tenant selection on profile.can_view_tenant(...)
//! }
//! ```

pub mod bootstrapper;
pub mod events;
pub mod handle;
pub mod state;
pub mod telemetry;

pub use bootstrapper::SessionBootstrapper;
pub use events::{SessionEvent, SessionEventBus};
pub use handle::SessionHandle;
pub use state::SessionState;
pub use telemetry::{init_tracing, TelemetryConfig};
