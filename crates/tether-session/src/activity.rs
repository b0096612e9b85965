//! User-activity tracking.
//!
//! The host application forwards input events to [`ActivityMonitor::record`].
//! Activity *reschedules* the expiry timers from the session's current
//! expiry. It never pushes the expiry out: only a refresh can do that.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use crate::state::{SessionCore, lock};

/// Kinds of user interaction the monitor can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    PointerMove,
    KeyPress,
    Scroll,
    Click,
    Touch,
    Focus,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 6] = [
        Self::PointerMove,
        Self::KeyPress,
        Self::Scroll,
        Self::Click,
        Self::Touch,
        Self::Focus,
    ];
}

/// Counters for [`ActivityMonitor`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivityStats {
    /// Signals that led to a reschedule.
    pub accepted: u64,
    /// Signals dropped by the throttle.
    pub dropped: u64,
}

/// Throttled activity-to-reschedule bridge.
///
/// Leading edge: the first signal reschedules at once, then everything
/// for the next `debounce` is dropped.
pub struct ActivityMonitor {
    core: Arc<SessionCore>,
    kinds: HashSet<ActivityKind>,
    debounce: Duration,
    last_accepted: Mutex<Option<Instant>>,
    accepted: AtomicU64,
    dropped: AtomicU64,
}

impl ActivityMonitor {
    pub(crate) fn new(
        core: Arc<SessionCore>,
        kinds: HashSet<ActivityKind>,
        debounce: Duration,
    ) -> Self {
        Self {
            core,
            kinds,
            debounce,
            last_accepted: Mutex::new(None),
            accepted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Reports one user interaction. Returns `true` if it rescheduled the
    /// timers.
    ///
    /// Ignored when `kind` isn't observed, when the throttle window is
    /// open, or when the session has nothing to reschedule (no refresh
    /// token, no known expiry, or not Active/Warning).
    pub fn record(&self, kind: ActivityKind) -> bool {
        if !self.kinds.contains(&kind) {
            return false;
        }

        let mut last = lock(&self.last_accepted);
        let now = Instant::now();
        if last.is_some_and(|at| now.duration_since(at) < self.debounce) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            trace!(?kind, "activity throttled");
            return false;
        }

        if !self.core.rearm_from_activity() {
            trace!(?kind, "activity ignored, nothing to reschedule");
            return false;
        }
        *last = Some(now);
        self.accepted.fetch_add(1, Ordering::Relaxed);
        trace!(?kind, "activity rescheduled expiry timers");
        true
    }

    /// Whether `kind` is observed.
    pub fn observes(&self, kind: ActivityKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn stats(&self) -> ActivityStats {
        ActivityStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}
