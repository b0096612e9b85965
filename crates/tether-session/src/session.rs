//! Session types: the single record describing who is signed in.
//!
//! A "session" is the client's view of its credentials. It tracks:
//! - WHAT tokens to present (access token, refresh token)
//! - WHEN they stop working (`expires_at`, from the refresh token's `exp`)
//! - WHO is signed in (user id and profile)
//! - WHERE in the login/refresh cycle we are ([`SessionStatus`])

use std::collections::HashSet;
use std::fmt;
use std::ops::RangeInclusive;
use std::time::{Duration, SystemTime};

use tether_protocol::{User, UserId};
use tether_schedule::ScheduleConfig;
use tracing::warn;

use crate::ActivityKind;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for session behavior.
///
/// Sensible defaults are provided; override only the fields you care about
/// and pass the result through [`validated`](Self::validated) (the
/// lifecycle does this for you).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Warning and refresh lead times.
    pub schedule: ScheduleConfig,

    /// Upper bound on one refresh call. A refresh that hasn't answered by
    /// then counts as failed and ends the session.
    ///
    /// Default: 30 seconds.
    pub refresh_timeout: Duration,

    /// Minimum spacing between two activity-driven reschedules.
    ///
    /// Default: 5 seconds.
    pub activity_debounce: Duration,

    /// Which user interactions count as activity. Default: all of them.
    pub activity_kinds: HashSet<ActivityKind>,

    /// Accepted OTP lengths. Default: 4 to 8 digits.
    pub otp_length: RangeInclusive<usize>,

    /// Longest display name accepted by `set_name`, in characters.
    ///
    /// Default: 64.
    pub max_name_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            schedule: ScheduleConfig::default(),
            refresh_timeout: Duration::from_secs(30),
            activity_debounce: Duration::from_secs(5),
            activity_kinds: ActivityKind::ALL.into_iter().collect(),
            otp_length: 4..=8,
            max_name_len: 64,
        }
    }
}

impl SessionConfig {
    /// Replaces unusable values with their defaults, logging each fix.
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        self.schedule = self.schedule.validated();

        if self.refresh_timeout.is_zero() {
            warn!("refresh_timeout is zero, using the default");
            self.refresh_timeout = defaults.refresh_timeout;
        }
        if self.otp_length.is_empty() || *self.otp_length.start() == 0 {
            warn!(
                start = *self.otp_length.start(),
                end = *self.otp_length.end(),
                "otp_length is empty, using the default"
            );
            self.otp_length = defaults.otp_length;
        }
        if self.max_name_len == 0 {
            warn!("max_name_len is zero, using the default");
            self.max_name_len = defaults.max_name_len;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// SessionStatus
// ---------------------------------------------------------------------------

/// Where the session is in its lifecycle.
///
/// ```text
///   Anonymous ──send_otp──→ Authenticating ──verify_otp──→ Verifying
///                                 ↑                           │ ok
///   Expired ───send_otp───────────┘                           ▼
///      ↑                                    Active ──timer──→ Warning
///      │ failed                                │                │
///      └──────────────── Refreshing ←──────────┴────────────────┘
///                            │ ok
///                            ▼
///                    Active (or Warning)
/// ```
///
/// A rejected OTP goes back from `Verifying` to `Authenticating`.
/// Any state may go to `Anonymous` (sign-out). `Expired` is terminal until
/// a new login.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    /// Nobody is signed in.
    #[default]
    Anonymous,
    /// An OTP was sent; waiting for the user to enter it.
    Authenticating,
    /// The OTP was submitted; waiting for the server.
    Verifying,
    /// Signed in, tokens valid.
    Active,
    /// Signed in, but the refresh token expires soon (or its expiry is
    /// unknown). The user should be prompted.
    Warning,
    /// A refresh call is in flight.
    Refreshing,
    /// A refresh failed. The session was cleared.
    Expired,
}

impl SessionStatus {
    /// Whether moving from `self` to `next` is a legal edge.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;

        if next == Anonymous {
            return true;
        }
        matches!(
            (self, next),
            (Anonymous | Expired | Authenticating | Verifying, Authenticating)
                | (Authenticating, Verifying)
                | (Verifying, Active | Warning)
                // Restoring a persisted session.
                | (Anonymous, Active | Warning)
                | (Active, Warning | Refreshing)
                | (Warning, Refreshing)
                | (Refreshing, Active | Warning | Expired)
        )
    }

    /// `true` while tokens are held: Active, Warning or Refreshing.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Active | Self::Warning | Self::Refreshing)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Anonymous => "anonymous",
            Self::Authenticating => "authenticating",
            Self::Verifying => "verifying",
            Self::Active => "active",
            Self::Warning => "warning",
            Self::Refreshing => "refreshing",
            Self::Expired => "expired",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The process-wide session record.
///
/// There is exactly one of these, owned by the lifecycle. Everything else
/// reads snapshots of it (`SessionLifecycle::session`) or watches it
/// (`SessionLifecycle::subscribe`).
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub status: SessionStatus,

    /// Bearer token attached to every authenticated call.
    pub access_token: Option<String>,

    /// Used only to obtain a new access token.
    pub refresh_token: Option<String>,

    /// When the refresh token stops working.
    ///
    /// Always decoded from the refresh token's `exp` claim and never taken
    /// from anywhere else. `None` when that claim is missing or unreadable,
    /// in which case the session sits in [`SessionStatus::Warning`].
    pub expires_at: Option<SystemTime>,

    pub user_id: Option<UserId>,

    /// The profile, when the server has sent one this run.
    pub user: Option<User>,

    /// First-time user who hasn't picked a display name yet.
    pub needs_name: bool,

    /// The normalized phone an OTP was last sent to.
    pub pending_phone: Option<String>,
}

impl Session {
    /// The access token, if the session is live.
    pub fn bearer(&self) -> Option<&str> {
        self.access_token
            .as_deref()
            .filter(|_| self.status.is_live())
    }

    /// `true` when a signed-in user is present.
    pub fn is_authenticated(&self) -> bool {
        self.bearer().is_some()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("status", &self.status)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("user_id", &self.user_id)
            .field("user", &self.user)
            .field("needs_name", &self.needs_name)
            .field("pending_phone", &self.pending_phone)
            .finish()
    }
}
