//! Single-flight token refresh.
//!
//! Five things can ask for a refresh: the refresh timer, a 401 seen by the
//! gateway, a manual `extend_session`, and (indirectly) activity and the
//! warning prompt. However many ask at once, at most one network refresh
//! runs per session. Everyone else awaits the same outcome.
//!
//! # How
//!
//! The first caller spawns the refresh on its own task and parks a
//! [`Shared`] handle to it in a slot. Later callers clone the handle. The
//! task clears the slot when it finishes, so the next refresh (minutes
//! later) starts fresh.
//!
//! Running the call on a spawned task means a caller that gives up (its
//! future is dropped) never cancels the refresh other callers are waiting
//! on.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture, Shared};
use tracing::{debug, info, warn};

use crate::state::{SessionCore, lock};
use crate::{AuthBackend, SessionError};

type Outcome = Shared<BoxFuture<'static, Result<(), SessionError>>>;

struct Flight {
    id: u64,
    epoch: u64,
    outcome: Outcome,
}

/// Coalesces refresh requests into one network call per session.
pub struct RefreshCoordinator<B> {
    core: Arc<SessionCore>,
    backend: Arc<B>,
    timeout: Duration,
    slot: Arc<Mutex<Option<Flight>>>,
    flights: AtomicU64,
}

impl<B: AuthBackend> RefreshCoordinator<B> {
    pub(crate) fn new(core: Arc<SessionCore>, backend: Arc<B>, timeout: Duration) -> Self {
        Self {
            core,
            backend,
            timeout,
            slot: Arc::new(Mutex::new(None)),
            flights: AtomicU64::new(0),
        }
    }

    /// Refreshes the session, or joins the refresh already in flight.
    ///
    /// # Errors
    /// - [`SessionError::SessionExpired`] if the refresh failed. The
    ///   session has been ended.
    /// - [`SessionError::NotAuthenticated`] if there is no session, or it
    ///   was signed out before the refresh finished.
    pub async fn refresh(&self) -> Result<(), SessionError> {
        self.join_or_start(None)?.await
    }

    /// Refresh on behalf of a request the server rejected with
    /// `rejected_token`.
    ///
    /// If the session already holds a different access token, another
    /// caller refreshed in the meantime and this returns at once.
    pub async fn refresh_after_rejection(&self, rejected_token: &str) -> Result<(), SessionError> {
        self.join_or_start(Some(rejected_token))?.await
    }

    /// Starts a refresh (or notes the one in flight) without waiting for
    /// it. Used by the timer driver.
    pub(crate) fn trigger(&self) -> Result<(), SessionError> {
        self.join_or_start(None).map(drop)
    }

    /// Network refreshes started so far.
    pub fn flights_started(&self) -> u64 {
        self.flights.load(Ordering::Relaxed)
    }

    /// `true` while a refresh is running.
    pub fn in_flight(&self) -> bool {
        lock(&self.slot).is_some()
    }

    fn join_or_start(&self, rejected_token: Option<&str>) -> Result<Outcome, SessionError> {
        let mut slot = lock(&self.slot);

        if let Some(flight) = slot.as_ref() {
            if flight.epoch == self.core.epoch() {
                debug!(flight = flight.id, "joining refresh in flight");
                return Ok(flight.outcome.clone());
            }
        }

        if let Some(rejected) = rejected_token {
            let (current, _) = self.core.bearer()?;
            if current != rejected {
                debug!("access token already replaced, skipping refresh");
                return Ok(future::ready(Ok(())).boxed().shared());
            }
        }

        let (epoch, refresh_token) = self.core.begin_refresh()?;
        let id = self.flights.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(flight = id, epoch, "starting refresh");

        let task = tokio::spawn(run_flight(
            Arc::clone(&self.core),
            Arc::clone(&self.backend),
            Arc::clone(&self.slot),
            self.timeout,
            id,
            epoch,
            refresh_token,
        ));
        let outcome = async move {
            task.await.unwrap_or_else(|e| {
                warn!(error = %e, "refresh task did not complete");
                Err(SessionError::NotAuthenticated)
            })
        }
        .boxed()
        .shared();

        *slot = Some(Flight {
            id,
            epoch,
            outcome: outcome.clone(),
        });
        Ok(outcome)
    }
}

async fn run_flight<B: AuthBackend>(
    core: Arc<SessionCore>,
    backend: Arc<B>,
    slot: Arc<Mutex<Option<Flight>>>,
    timeout: Duration,
    id: u64,
    epoch: u64,
    refresh_token: Option<String>,
) -> Result<(), SessionError> {
    let result = match refresh_token {
        None => Err(SessionError::Validation("no refresh token".into())),
        Some(token) => match tokio::time::timeout(timeout, backend.refresh(&token)).await {
            Ok(Ok(response)) => core.commit_refresh(epoch, response),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(SessionError::Network(format!(
                "refresh timed out after {}s",
                timeout.as_secs_f64()
            ))),
        },
    };

    let outcome = match result {
        Ok(()) => {
            info!(flight = id, "refresh complete");
            Ok(())
        }
        Err(SessionError::RefreshRaceIgnored) => {
            debug!(flight = id, epoch, "refresh result discarded, session changed");
            Err(SessionError::NotAuthenticated)
        }
        Err(e) => {
            warn!(flight = id, error = %e, "refresh failed");
            if core.fail_refresh(epoch) {
                Err(SessionError::SessionExpired)
            } else {
                Err(SessionError::NotAuthenticated)
            }
        }
    };

    let mut slot = lock(&slot);
    if slot.as_ref().is_some_and(|flight| flight.id == id) {
        *slot = None;
    }
    outcome
}
