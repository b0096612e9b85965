//! Wall-clock sources.
//!
//! Token expiries are wall-clock timestamps, while tokio timers run on a
//! monotonic clock. The scheduler converts between the two once per arm,
//! reading "now" from a [`Clock`] so tests can control it.

use std::time::SystemTime;

use tokio::time::Instant;

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> SystemTime;
}

/// The operating system's wall clock. Use this in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A wall clock that advances with tokio's clock.
///
/// Anchored to a wall time at construction, it then moves exactly as far
/// as `tokio::time::Instant` does. Under `tokio::time::pause` it stands
/// still, and `tokio::time::advance` moves it, which makes expiry math
/// deterministic in tests.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    wall_anchor: SystemTime,
    mono_anchor: Instant,
}

impl TokioClock {
    /// Anchors to the current system time.
    pub fn new() -> Self {
        Self::starting_at(SystemTime::now())
    }

    /// Anchors to an arbitrary wall time.
    pub fn starting_at(wall: SystemTime) -> Self {
        Self {
            wall_anchor: wall,
            mono_anchor: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> SystemTime {
        self.wall_anchor + self.mono_anchor.elapsed()
    }
}
