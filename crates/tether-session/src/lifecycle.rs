//! The session facade: login, profile, refresh, sign-out.
//!
//! [`SessionLifecycle`] owns the session and wires the pieces together:
//!
//! ```text
//!                 ┌────────────── SessionLifecycle ───────────────┐
//!   send_otp ────→│ AuthBackend                                   │
//!   verify_otp ──→│     │                                         │
//!                 │     ▼                                         │
//!   sign_out ────→│ SessionCore ←── RefreshCoordinator ←─ driver ←┼── ExpiryScheduler
//!                 │  (watch)           ↑        ↑                 │
//!   activity() ──→│ ActivityMonitor    │   extend_session         │
//!   gateway() ───→│ RequestGateway ────┘                          │
//!                 └───────────────────────────────────────────────┘
//! ```
//!
//! A driver task consumes the scheduler's events: a warning moves the
//! session to Warning, a refresh starts a (single-flight) refresh. The
//! driver is aborted when the lifecycle is dropped.

use std::sync::Arc;

use tether_protocol::{Endpoint, SetName, SetNameResponse, User, normalize_otp, normalize_phone};
use tether_schedule::{Clock, ExpiryEvent, SystemClock};
use tether_store::{StoredTokens, TokenStore};
use tether_transport::Transport;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::activity::ActivityMonitor;
use crate::gateway::RequestGateway;
use crate::refresh::RefreshCoordinator;
use crate::state::{Login, SessionCore};
use crate::{AuthBackend, Session, SessionConfig, SessionError, SessionStatus};

/// What `verify_otp` reports back to the login screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub user: User,
    /// First login: the user should be asked for a display name.
    pub needs_name: bool,
}

/// Owns the one process-wide session.
///
/// Must be created inside a Tokio runtime: it spawns the timer driver.
pub struct SessionLifecycle<B: AuthBackend, T: Transport> {
    config: SessionConfig,
    core: Arc<SessionCore>,
    backend: Arc<B>,
    refresher: Arc<RefreshCoordinator<B>>,
    activity: Arc<ActivityMonitor>,
    gateway: Arc<RequestGateway<T, B>>,
    driver: JoinHandle<()>,
}

impl<B: AuthBackend, T: Transport> SessionLifecycle<B, T> {
    /// Creates an anonymous session using the system clock.
    ///
    /// Call [`restore`](Self::restore) to pick up a persisted session.
    pub fn new(backend: B, transport: T, store: impl TokenStore, config: SessionConfig) -> Self {
        Self::with_clock(backend, transport, store, config, Arc::new(SystemClock))
    }

    /// Like [`new`](Self::new), reading wall time from `clock`.
    pub fn with_clock(
        backend: B,
        transport: T,
        store: impl TokenStore,
        config: SessionConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = config.validated();
        let (core, events) = SessionCore::new(Arc::new(store), config.schedule.clone(), clock);
        let core = Arc::new(core);
        let backend = Arc::new(backend);
        let refresher = Arc::new(RefreshCoordinator::new(
            Arc::clone(&core),
            Arc::clone(&backend),
            config.refresh_timeout,
        ));
        let activity = Arc::new(ActivityMonitor::new(
            Arc::clone(&core),
            config.activity_kinds.clone(),
            config.activity_debounce,
        ));
        let gateway = Arc::new(RequestGateway::new(
            transport,
            Arc::clone(&core),
            Arc::clone(&refresher),
        ));
        let driver = tokio::spawn(drive(Arc::clone(&core), Arc::clone(&refresher), events));

        Self {
            config,
            core,
            backend,
            refresher,
            activity,
            gateway,
            driver,
        }
    }

    // -- Login ------------------------------------------------------------

    /// Sends a one-time password to `phone`.
    ///
    /// # Errors
    /// - [`SessionError::InvalidPhone`] if the number fails the local
    ///   check (nothing is sent) or the server rejects it.
    /// - [`SessionError::InvalidState`] while a session is live.
    /// - [`SessionError::Network`] on transport failures and 5xx.
    pub async fn send_otp(&self, phone: &str) -> Result<(), SessionError> {
        let phone = normalize_phone(phone)?;
        let status = self.core.status();
        if !status.can_transition_to(SessionStatus::Authenticating) {
            return Err(SessionError::InvalidState(status));
        }

        self.backend.send_otp(&phone).await?;
        self.core.begin_authentication(phone)?;
        info!("otp sent");
        Ok(())
    }

    /// Verifies the code sent by [`send_otp`](Self::send_otp) and signs in.
    ///
    /// On any failure the session returns to Authenticating so the user
    /// can try again.
    ///
    /// # Errors
    /// - [`SessionError::InvalidPhone`] / [`SessionError::InvalidOtp`] for
    ///   malformed input. Nothing is sent.
    /// - [`SessionError::InvalidState`] unless Authenticating.
    /// - [`SessionError::InvalidOtp`] when the server rejects the code.
    /// - [`SessionError::Validation`] if `phone` isn't the number the code
    ///   was sent to.
    /// - [`SessionError::Storage`] if the tokens couldn't be persisted.
    pub async fn verify_otp(&self, phone: &str, code: &str) -> Result<LoginOutcome, SessionError> {
        let phone = normalize_phone(phone)?;
        let otp = normalize_otp(code, self.config.otp_length.clone())?;
        let epoch = self.core.begin_verification(&phone)?;

        let result = match self.backend.verify_otp(&phone, &otp).await {
            Ok(response) => {
                let outcome = LoginOutcome {
                    user: response.user.clone(),
                    needs_name: response.is_new_user,
                };
                let login = Login {
                    tokens: StoredTokens::new(
                        response.token,
                        response.refresh_token,
                        Some(response.user.id.clone()),
                    ),
                    user: Some(response.user),
                    needs_name: response.is_new_user,
                };
                self.core.install(epoch, login).map(|_| outcome)
            }
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            debug!(error = %e, "verification failed");
            self.core.abort_verification(epoch);
        }
        result
    }

    /// Reloads a persisted session, deriving its expiry and arming timers
    /// exactly as a fresh login does. Returns `None` if nothing is stored.
    ///
    /// # Errors
    /// - [`SessionError::InvalidState`] unless Anonymous.
    /// - [`SessionError::Storage`] if the store can't be read.
    pub fn restore(&self) -> Result<Option<Session>, SessionError> {
        self.core.restore()
    }

    /// Sets the display name of the signed-in user.
    ///
    /// # Errors
    /// - [`SessionError::Validation`] if the trimmed name is empty or too
    ///   long (nothing is sent), or the server rejects it.
    /// - Anything [`RequestGateway::send`] returns.
    pub async fn set_name(&self, name: &str) -> Result<User, SessionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::Validation("name must not be empty".into()));
        }
        let len = name.chars().count();
        if len > self.config.max_name_len {
            return Err(SessionError::Validation(format!(
                "name is {len} characters, at most {} allowed",
                self.config.max_name_len
            )));
        }

        let epoch = self.core.epoch();
        let request = SetName {
            name: name.to_owned(),
        }
        .to_request()?;
        let response: SetNameResponse = self.gateway.send_json(request).await?;
        let session = self.core.update_user(epoch, response.user.clone())?;
        info!(
            user_id = session.user_id.as_ref().map(tracing::field::display),
            "display name set"
        );
        Ok(response.user)
    }

    // -- Refresh and sign-out ---------------------------------------------

    /// Refreshes now, e.g. from the "stay signed in" button of the warning
    /// prompt. Joins a refresh already in flight.
    ///
    /// # Errors
    /// - [`SessionError::SessionExpired`] if the refresh failed. The
    ///   session has been ended.
    /// - [`SessionError::NotAuthenticated`] with no session.
    pub async fn extend_session(&self) -> Result<(), SessionError> {
        self.refresher.refresh().await
    }

    /// Ends the session immediately. Always succeeds.
    ///
    /// A refresh still in flight is invalidated: its result is discarded
    /// when it arrives.
    pub fn sign_out(&self) {
        self.core.sign_out();
    }

    // -- Accessors --------------------------------------------------------

    /// Snapshot of the current session.
    pub fn session(&self) -> Session {
        self.core.snapshot()
    }

    pub fn status(&self) -> SessionStatus {
        self.core.status()
    }

    /// Receives every change to the session.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.core.subscribe()
    }

    /// Where the host application reports user input.
    pub fn activity(&self) -> Arc<ActivityMonitor> {
        Arc::clone(&self.activity)
    }

    /// For authenticated calls to the rest of the API.
    pub fn gateway(&self) -> Arc<RequestGateway<T, B>> {
        Arc::clone(&self.gateway)
    }

    pub fn refresher(&self) -> &RefreshCoordinator<B> {
        &self.refresher
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

impl<B: AuthBackend, T: Transport> Drop for SessionLifecycle<B, T> {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Turns timer events into session transitions.
async fn drive<B: AuthBackend>(
    core: Arc<SessionCore>,
    refresher: Arc<RefreshCoordinator<B>>,
    mut events: mpsc::UnboundedReceiver<ExpiryEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            ExpiryEvent::Warning { generation } => core.on_warning(generation),
            ExpiryEvent::Refresh { generation } => {
                if !core.timer_is_current(generation) {
                    debug!(generation, "stale refresh timer ignored");
                    continue;
                }
                if let Err(e) = refresher.trigger() {
                    debug!(error = %e, "timer refresh not started");
                }
            }
        }
    }
}
