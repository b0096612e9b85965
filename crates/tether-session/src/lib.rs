//! Session lifecycle management for Tether.
//!
//! This crate owns the one session a client process has and keeps its
//! tokens fresh:
//!
//! 1. **Login** ([`SessionLifecycle::send_otp`], [`SessionLifecycle::verify_otp`]),
//!    through an [`AuthBackend`].
//! 2. **Expiry tracking**: the refresh token's `exp` claim arms a warning
//!    timer (2 minutes before) and a refresh timer (1 minute before).
//! 3. **Refresh** ([`RefreshCoordinator`]): single-flight, bounded by a
//!    timeout, terminal on failure.
//! 4. **Authenticated calls** ([`RequestGateway`]): bearer attached, one
//!    refresh-and-retry on 401.
//! 5. **Activity** ([`ActivityMonitor`]): user input reschedules the timers
//!    without extending the session.
//!
//! # How it fits in the stack
//!
//! ```text
//! Application (above)  ← login screen, warning prompt, API calls
//!     ↕
//! Session Layer (this crate)  ← owns tokens, timers and refresh
//!     ↕
//! Schedule / Store / Protocol / Transport (below)
//! ```

mod activity;
mod backend;
mod error;
mod gateway;
mod lifecycle;
mod refresh;
mod session;
mod state;

pub use activity::{ActivityKind, ActivityMonitor, ActivityStats};
pub use backend::{AuthBackend, HttpAuthBackend};
pub use error::SessionError;
pub use gateway::{Attempt, RequestGateway};
pub use lifecycle::{LoginOutcome, SessionLifecycle};
pub use refresh::RefreshCoordinator;
pub use session::{Session, SessionConfig, SessionStatus};
