//! Expiry timers for Tether sessions.
//!
//! Every session has two deadlines derived from its refresh token's expiry:
//!
//! ```text
//!   armed ─────────── warning ─────── refresh ─────── expiry
//!                 expiry − 120s    expiry − 60s
//! ```
//!
//! The warning gives the user time to act before the refresh fires on its
//! own; the refresh runs with a safety margin for latency and clock skew.
//! [`ExpiryScheduler`] owns both timers, and every [`arm`](ExpiryScheduler::arm)
//! cancels whatever was armed before.
//!
//! # Integration
//!
//! The scheduler does not call back into the session. It emits
//! [`ExpiryEvent`]s on a channel that the session driver consumes inside a
//! `tokio::select!` or `while let` loop:
//!
//! ```ignore
//! let (scheduler, mut events) = ExpiryScheduler::new(config, Arc::new(SystemClock));
//! scheduler.arm(expires_at);
//! while let Some(event) = events.recv().await {
//!     if scheduler.is_current(event.generation()) { /* act */ }
//! }
//! ```

mod clock;
mod config;
mod scheduler;

pub use clock::{Clock, SystemClock, TokioClock};
pub use config::{Deadlines, ScheduleConfig};
pub use scheduler::{ExpiryEvent, ExpiryScheduler, ScheduleMetrics};
