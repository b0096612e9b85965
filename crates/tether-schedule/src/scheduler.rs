//! The two-timer expiry scheduler.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, trace};

use crate::{Clock, ScheduleConfig};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A timer firing, tagged with the arm generation that scheduled it.
///
/// Consumers must drop events whose generation is no longer current
/// (see [`ExpiryScheduler::is_current`]); the scheduler never emits a
/// stale event itself, but one may already be sitting in the channel when
/// a re-arm happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryEvent {
    /// The warning deadline (`expiry − warning_lead`) was reached.
    Warning { generation: u64 },
    /// The refresh deadline (`expiry − refresh_lead`) was reached.
    Refresh { generation: u64 },
}

impl ExpiryEvent {
    pub fn generation(&self) -> u64 {
        match self {
            Self::Warning { generation } | Self::Refresh { generation } => *generation,
        }
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Counters for the scheduler's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleMetrics {
    /// Calls to `arm`.
    pub arms: u64,
    /// Calls to `disarm`.
    pub disarms: u64,
    /// Warning events emitted.
    pub warnings_fired: u64,
    /// Refresh events emitted.
    pub refreshes_fired: u64,
    /// Timers that woke up after being superseded and stayed silent.
    pub stale_suppressed: u64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum TimerKind {
    Warning,
    Refresh,
}

#[derive(Debug, Default)]
struct TimerState {
    generation: u64,
    expires_at: Option<SystemTime>,
    warning_fired: bool,
    refresh_fired: bool,
    task: Option<JoinHandle<()>>,
    metrics: ScheduleMetrics,
}

impl TimerState {
    fn cancel_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Owns the warning and refresh timers of one session.
///
/// One timer task exists per arm. It sleeps to the warning deadline, emits
/// [`ExpiryEvent::Warning`], sleeps to the refresh deadline and emits
/// [`ExpiryEvent::Refresh`], so the warning always comes first even when
/// both are due immediately.
///
/// ## Re-arming
///
/// Each arm cancels the previous task and bumps the generation. A timer
/// only emits while holding the state lock AND while its generation is
/// still current, so a superseded timer can never deliver an event after
/// the re-arm returns.
///
/// Re-arming with the same expiry as the current one is a *reschedule*: a
/// callback that already fired for that expiry is not fired again. Only a
/// new expiry resets both.
pub struct ExpiryScheduler {
    config: ScheduleConfig,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<TimerState>>,
    events: mpsc::UnboundedSender<ExpiryEvent>,
}

impl ExpiryScheduler {
    /// Creates an unarmed scheduler and the receiving end of its events.
    pub fn new(
        config: ScheduleConfig,
        clock: Arc<dyn Clock>,
    ) -> (Self, mpsc::UnboundedReceiver<ExpiryEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            config: config.validated(),
            clock,
            state: Arc::new(Mutex::new(TimerState::default())),
            events,
        };
        (scheduler, rx)
    }

    /// Cancels any armed timers and schedules both for `expires_at`.
    ///
    /// Returns the new generation. Must be called from within a Tokio
    /// runtime.
    pub fn arm(&self, expires_at: SystemTime) -> u64 {
        let mut state = lock(&self.state);
        state.cancel_task();
        state.generation += 1;
        state.metrics.arms += 1;
        let generation = state.generation;

        if state.expires_at != Some(expires_at) {
            state.expires_at = Some(expires_at);
            state.warning_fired = false;
            state.refresh_fired = false;
        }

        let deadlines = self.config.deadlines(expires_at, self.clock.now());
        let now = Instant::now();
        let warning_at = (!state.warning_fired).then(|| now + deadlines.warning_in);
        let refresh_at = (!state.refresh_fired).then(|| now + deadlines.refresh_in);

        debug!(
            generation,
            remaining_secs = deadlines.remaining.as_secs(),
            warning_in_secs = warning_at.map(|_| deadlines.warning_in.as_secs()),
            refresh_in_secs = refresh_at.map(|_| deadlines.refresh_in.as_secs()),
            "expiry timers armed"
        );

        if warning_at.is_some() || refresh_at.is_some() {
            state.task = Some(tokio::spawn(run_timers(
                Arc::clone(&self.state),
                self.events.clone(),
                generation,
                warning_at,
                refresh_at,
            )));
        }

        generation
    }

    /// Cancels both timers unconditionally and forgets the armed expiry.
    pub fn disarm(&self) {
        let mut state = lock(&self.state);
        state.cancel_task();
        state.generation += 1;
        state.metrics.disarms += 1;
        state.expires_at = None;
        state.warning_fired = false;
        state.refresh_fired = false;
        debug!(generation = state.generation, "expiry timers disarmed");
    }

    /// Whether an event from `generation` should still be acted on.
    pub fn is_current(&self, generation: u64) -> bool {
        lock(&self.state).generation == generation
    }

    /// The generation of the most recent arm or disarm.
    pub fn generation(&self) -> u64 {
        lock(&self.state).generation
    }

    /// The expiry the timers are currently armed for, if any.
    pub fn armed_expiry(&self) -> Option<SystemTime> {
        lock(&self.state).expires_at
    }

    /// Snapshot of the counters.
    pub fn metrics(&self) -> ScheduleMetrics {
        lock(&self.state).metrics.clone()
    }

    /// The validated configuration in use.
    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    /// Current wall time according to the scheduler's clock.
    pub fn now(&self) -> SystemTime {
        self.clock.now()
    }
}

impl Drop for ExpiryScheduler {
    fn drop(&mut self) {
        lock(&self.state).cancel_task();
    }
}

async fn run_timers(
    state: Arc<Mutex<TimerState>>,
    events: mpsc::UnboundedSender<ExpiryEvent>,
    generation: u64,
    warning_at: Option<Instant>,
    refresh_at: Option<Instant>,
) {
    if let Some(at) = warning_at {
        time::sleep_until(at).await;
        if !fire(&state, &events, generation, TimerKind::Warning) {
            return;
        }
    }
    if let Some(at) = refresh_at {
        time::sleep_until(at).await;
        fire(&state, &events, generation, TimerKind::Refresh);
    }
}

/// Emits one event if `generation` is still current. Returns `false` when
/// the timer has been superseded.
fn fire(
    state: &Mutex<TimerState>,
    events: &mpsc::UnboundedSender<ExpiryEvent>,
    generation: u64,
    kind: TimerKind,
) -> bool {
    let mut state = lock(state);
    if state.generation != generation {
        state.metrics.stale_suppressed += 1;
        trace!(generation, current = state.generation, ?kind, "stale timer suppressed");
        return false;
    }

    let event = match kind {
        TimerKind::Warning => {
            state.warning_fired = true;
            state.metrics.warnings_fired += 1;
            ExpiryEvent::Warning { generation }
        }
        TimerKind::Refresh => {
            state.refresh_fired = true;
            state.metrics.refreshes_fired += 1;
            ExpiryEvent::Refresh { generation }
        }
    };
    debug!(generation, ?kind, "expiry timer fired");

    if events.send(event).is_err() {
        trace!(generation, ?kind, "expiry event dropped, receiver closed");
    }
    true
}

fn lock(state: &Mutex<TimerState>) -> MutexGuard<'_, TimerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
