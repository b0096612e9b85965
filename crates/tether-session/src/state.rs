//! The shared session cell and every commit that touches it.
//!
//! [`SessionCore`] is the one place the [`Session`] is written. It pairs a
//! `watch` channel (readers get whole values) with a short synchronous
//! *epoch* lock that every commit takes. The epoch counts session cycles:
//! it moves on login and on sign-out or terminal refresh failure, so work
//! that started under an older epoch can tell that its session is gone.
//!
//! Lock order is always epoch, then scheduler. Neither lock is held across
//! an `.await`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tether_protocol::{RefreshResponse, User, decode_expiry};
use tether_schedule::{Clock, ExpiryEvent, ExpiryScheduler, ScheduleConfig};
use tether_store::{StoredTokens, TokenStore};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::{Session, SessionError, SessionStatus};

pub(crate) struct SessionCore {
    cell: watch::Sender<Session>,
    epoch: Mutex<u64>,
    store: Arc<dyn TokenStore>,
    scheduler: ExpiryScheduler,
}

/// What a successful login hands to [`SessionCore::install`].
pub(crate) struct Login {
    pub tokens: StoredTokens,
    pub user: Option<User>,
    pub needs_name: bool,
}

impl SessionCore {
    pub fn new(
        store: Arc<dyn TokenStore>,
        schedule: ScheduleConfig,
        clock: Arc<dyn Clock>,
    ) -> (Self, mpsc::UnboundedReceiver<ExpiryEvent>) {
        let (scheduler, events) = ExpiryScheduler::new(schedule, clock);
        let core = Self {
            cell: watch::Sender::new(Session::default()),
            epoch: Mutex::new(0),
            store,
            scheduler,
        };
        (core, events)
    }

    // -- Readers ----------------------------------------------------------

    pub fn snapshot(&self) -> Session {
        self.cell.borrow().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.cell.borrow().status
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.cell.subscribe()
    }

    pub fn epoch(&self) -> u64 {
        *lock(&self.epoch)
    }

    /// Access token and epoch for an authenticated call.
    pub fn bearer(&self) -> Result<(String, u64), SessionError> {
        let epoch = lock(&self.epoch);
        let session = self.cell.borrow();
        session
            .bearer()
            .map(|token| (token.to_owned(), *epoch))
            .ok_or(SessionError::NotAuthenticated)
    }

    pub fn scheduler(&self) -> &ExpiryScheduler {
        &self.scheduler
    }

    pub fn store(&self) -> &dyn TokenStore {
        self.store.as_ref()
    }

    // -- Login ------------------------------------------------------------

    /// Anonymous / Expired / Authenticating → Authenticating.
    pub fn begin_authentication(&self, phone: String) -> Result<(), SessionError> {
        let _epoch = lock(&self.epoch);
        let status = self.status();
        if !status.can_transition_to(SessionStatus::Authenticating) {
            return Err(SessionError::InvalidState(status));
        }
        self.cell.send_modify(|session| {
            *session = Session {
                status: SessionStatus::Authenticating,
                pending_phone: Some(phone),
                ..Session::default()
            };
        });
        Ok(())
    }

    /// Authenticating → Verifying. Returns the epoch the login belongs to.
    pub fn begin_verification(&self, phone: &str) -> Result<u64, SessionError> {
        let epoch = lock(&self.epoch);
        let session = self.snapshot();
        if session.status != SessionStatus::Authenticating {
            return Err(SessionError::InvalidState(session.status));
        }
        if session.pending_phone.as_deref() != Some(phone) {
            return Err(SessionError::Validation(
                "phone number differs from the one the code was sent to".into(),
            ));
        }
        self.cell
            .send_modify(|session| session.status = SessionStatus::Verifying);
        Ok(*epoch)
    }

    /// Verifying → Authenticating after a failed verification.
    pub fn abort_verification(&self, epoch: u64) {
        let current = lock(&self.epoch);
        if *current != epoch {
            return;
        }
        self.cell.send_if_modified(|session| {
            if session.status != SessionStatus::Verifying {
                return false;
            }
            session.status = SessionStatus::Authenticating;
            true
        });
    }

    /// Commits a verified login: persists it, then publishes it and arms
    /// the timers.
    ///
    /// # Errors
    /// - [`SessionError::NotAuthenticated`] if the user signed out while
    ///   the verification was in flight.
    /// - [`SessionError::Storage`] if the tokens couldn't be persisted; the
    ///   session is left untouched.
    pub fn install(&self, epoch: u64, login: Login) -> Result<Session, SessionError> {
        let mut current = lock(&self.epoch);
        if *current != epoch {
            debug!(epoch, current = *current, "login result discarded after sign-out");
            return Err(SessionError::NotAuthenticated);
        }
        if let Err(e) = self.store.save(&login.tokens) {
            error!(error = %e, "failed to persist login");
            return Err(e.into());
        }

        *current += 1;
        let mut session = Session {
            status: SessionStatus::Active,
            access_token: Some(login.tokens.access_token),
            refresh_token: login.tokens.refresh_token,
            expires_at: None,
            user_id: login.tokens.user_id,
            user: login.user,
            needs_name: login.needs_name,
            pending_phone: None,
        };
        self.schedule(&mut session);
        info!(
            user_id = session.user_id.as_ref().map(tracing::field::display),
            status = %session.status,
            needs_name = session.needs_name,
            "session established"
        );
        self.cell.send_replace(session.clone());
        Ok(session)
    }

    /// Anonymous → Active/Warning from whatever the store holds.
    pub fn restore(&self) -> Result<Option<Session>, SessionError> {
        let mut current = lock(&self.epoch);
        let status = self.status();
        if status != SessionStatus::Anonymous {
            return Err(SessionError::InvalidState(status));
        }
        let Some(tokens) = self.store.load()? else {
            debug!("no persisted session to restore");
            return Ok(None);
        };

        *current += 1;
        let mut session = Session {
            status: SessionStatus::Active,
            access_token: Some(tokens.access_token),
            refresh_token: tokens.refresh_token,
            user_id: tokens.user_id,
            ..Session::default()
        };
        self.schedule(&mut session);
        info!(
            user_id = session.user_id.as_ref().map(tracing::field::display),
            status = %session.status,
            "session restored"
        );
        self.cell.send_replace(session.clone());
        Ok(Some(session))
    }

    /// Records the profile returned by a name update.
    pub fn update_user(&self, epoch: u64, user: User) -> Result<Session, SessionError> {
        let current = lock(&self.epoch);
        if *current != epoch || !self.status().is_live() {
            return Err(SessionError::NotAuthenticated);
        }
        self.cell.send_modify(|session| {
            session.user_id = Some(user.id.clone());
            session.user = Some(user);
            session.needs_name = false;
        });
        let session = self.snapshot();
        self.persist(&session);
        Ok(session)
    }

    // -- Refresh ----------------------------------------------------------

    /// Active / Warning / Refreshing → Refreshing. Returns the epoch and
    /// the refresh token to present (if there is one).
    pub fn begin_refresh(&self) -> Result<(u64, Option<String>), SessionError> {
        let epoch = lock(&self.epoch);
        let session = self.snapshot();
        match session.status {
            SessionStatus::Refreshing => {}
            status if status.can_transition_to(SessionStatus::Refreshing) => {
                self.cell
                    .send_modify(|session| session.status = SessionStatus::Refreshing);
            }
            _ => return Err(SessionError::NotAuthenticated),
        }
        Ok((*epoch, session.refresh_token))
    }

    /// Applies a successful refresh to the session of `epoch`, leaving it
    /// Active. Only a refresh token with no readable expiry stays Warning.
    ///
    /// A rotated refresh token replaces the old one; otherwise the old one
    /// is kept. A store failure is logged and the in-memory session goes on.
    ///
    /// # Errors
    /// [`SessionError::RefreshRaceIgnored`] if the session changed since
    /// the refresh started. Nothing is written.
    pub fn commit_refresh(&self, epoch: u64, response: RefreshResponse) -> Result<(), SessionError> {
        let current = lock(&self.epoch);
        if *current != epoch {
            return Err(SessionError::RefreshRaceIgnored);
        }
        let mut session = self.snapshot();
        if session.status != SessionStatus::Refreshing {
            return Err(SessionError::RefreshRaceIgnored);
        }

        session.access_token = Some(response.token);
        if let Some(rotated) = response.refresh_token {
            session.refresh_token = Some(rotated);
        }
        self.persist(&session);
        self.schedule(&mut session);
        // Same expiry keeps the scheduler's fired flags, so Active here
        // never re-triggers the refresh timer.
        if session.expires_at.is_some() {
            session.status = SessionStatus::Active;
        }
        info!(status = %session.status, "session refreshed");
        self.cell.send_replace(session);
        Ok(())
    }

    /// Ends the session of `epoch` after a failed refresh: store cleared,
    /// timers disarmed, status Expired. Returns `false` if that session was
    /// already gone.
    pub fn fail_refresh(&self, epoch: u64) -> bool {
        let mut current = lock(&self.epoch);
        if *current != epoch {
            return false;
        }
        *current += 1;
        self.scheduler.disarm();
        self.clear_store();
        self.cell.send_replace(Session {
            status: SessionStatus::Expired,
            ..Session::default()
        });
        warn!("refresh failed, session expired");
        true
    }

    // -- Timers and activity ----------------------------------------------

    pub fn timer_is_current(&self, generation: u64) -> bool {
        let _epoch = lock(&self.epoch);
        self.scheduler.is_current(generation)
    }

    /// Active → Warning, when the warning timer of `generation` fires.
    pub fn on_warning(&self, generation: u64) {
        let _epoch = lock(&self.epoch);
        if !self.scheduler.is_current(generation) {
            debug!(generation, "stale warning ignored");
            return;
        }
        let status = self.status();
        if status == SessionStatus::Warning {
            return;
        }
        if !status.can_transition_to(SessionStatus::Warning) {
            debug!(%status, "warning skipped");
            return;
        }
        self.cell
            .send_modify(|session| session.status = SessionStatus::Warning);
        info!("session expiring soon");
    }

    /// Re-arms the timers from the *current* expiry. Never extends it.
    /// Returns `false` when there is nothing to reschedule.
    pub fn rearm_from_activity(&self) -> bool {
        let _epoch = lock(&self.epoch);
        let session = self.cell.borrow();
        let reschedulable = matches!(session.status, SessionStatus::Active | SessionStatus::Warning)
            && session.refresh_token.is_some();
        match session.expires_at {
            Some(expires_at) if reschedulable => {
                self.scheduler.arm(expires_at);
                true
            }
            _ => false,
        }
    }

    // -- Sign-out ---------------------------------------------------------

    /// Unconditional: epoch bumped, store cleared, timers disarmed, status
    /// Anonymous.
    pub fn sign_out(&self) {
        let mut current = lock(&self.epoch);
        *current += 1;
        self.scheduler.disarm();
        self.clear_store();
        let previous = self.cell.send_replace(Session::default());
        info!(previous = %previous.status, "signed out");
    }

    // -- Helpers ----------------------------------------------------------

    /// Derives `expires_at`, arms or disarms the timers, and picks Active
    /// or Warning. Caller holds the epoch lock.
    ///
    /// Fails closed: a refresh token that is missing or has no readable
    /// expiry leaves the session in Warning with no timers.
    fn schedule(&self, session: &mut Session) {
        session.expires_at = match session.refresh_token.as_deref().map(decode_expiry) {
            Some(Ok(expires_at)) => Some(expires_at),
            Some(Err(e)) => {
                warn!(error = %e, "refresh token expiry unreadable");
                None
            }
            None => {
                warn!("session has no refresh token");
                None
            }
        };

        session.status = match session.expires_at {
            Some(expires_at) => {
                self.scheduler.arm(expires_at);
                let deadlines = self
                    .scheduler
                    .config()
                    .deadlines(expires_at, self.scheduler.now());
                if deadlines.warning_due() {
                    SessionStatus::Warning
                } else {
                    SessionStatus::Active
                }
            }
            None => {
                self.scheduler.disarm();
                SessionStatus::Warning
            }
        };
    }

    fn persist(&self, session: &Session) {
        let Some(access_token) = session.access_token.clone() else {
            return;
        };
        let tokens = StoredTokens::new(
            access_token,
            session.refresh_token.clone(),
            session.user_id.clone(),
        );
        if let Err(e) = self.store.save(&tokens) {
            error!(error = %e, "failed to persist session, continuing in memory");
        }
    }

    fn clear_store(&self) {
        if let Err(e) = self.store.clear() {
            error!(error = %e, "failed to clear token store");
        }
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use tether_protocol::UserId;
    use tether_schedule::TokioClock;
    use tether_store::MemoryTokenStore;

    // -- Helpers ----------------------------------------------------------

    fn t0() -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    fn jwt_expiring_in(secs: u64) -> String {
        let exp = t0().duration_since(UNIX_EPOCH).unwrap().as_secs() + secs;
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{exp}}}"#));
        format!("{header}.{payload}.sig")
    }

    fn core() -> (SessionCore, Arc<MemoryTokenStore>) {
        let store = Arc::new(MemoryTokenStore::new());
        let clock = Arc::new(TokioClock::starting_at(t0()));
        let (core, _events) = SessionCore::new(store.clone(), ScheduleConfig::default(), clock);
        (core, store)
    }

    fn login(refresh_token: Option<String>) -> Login {
        Login {
            tokens: StoredTokens::new("access-1", refresh_token, Some(UserId::new("u1"))),
            user: None,
            needs_name: false,
        }
    }

    fn verifying(core: &SessionCore) -> u64 {
        core.begin_authentication("5551234567".into()).unwrap();
        core.begin_verification("5551234567").unwrap()
    }

    // =====================================================================
    // install()
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_install_far_expiry_is_active_and_armed() {
        let (core, store) = core();
        let epoch = verifying(&core);

        let session = core.install(epoch, login(Some(jwt_expiring_in(3_600)))).unwrap();

        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.expires_at, Some(t0() + Duration::from_secs(3_600)));
        assert_eq!(core.scheduler().armed_expiry(), session.expires_at);
        assert_eq!(store.load().unwrap().unwrap().access_token, "access-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_install_inside_warning_window_is_warning() {
        let (core, _store) = core();
        let epoch = verifying(&core);

        let session = core.install(epoch, login(Some(jwt_expiring_in(90)))).unwrap();

        assert_eq!(session.status, SessionStatus::Warning);
    }

    #[tokio::test(start_paused = true)]
    async fn test_install_unreadable_expiry_fails_closed() {
        let (core, _store) = core();
        let epoch = verifying(&core);

        let session = core.install(epoch, login(Some("opaque".into()))).unwrap();

        assert_eq!(session.status, SessionStatus::Warning);
        assert_eq!(session.expires_at, None);
        assert_eq!(core.scheduler().armed_expiry(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_install_without_refresh_token_fails_closed() {
        let (core, _store) = core();
        let epoch = verifying(&core);

        let session = core.install(epoch, login(None)).unwrap();

        assert_eq!(session.status, SessionStatus::Warning);
    }

    #[tokio::test(start_paused = true)]
    async fn test_install_after_sign_out_is_discarded() {
        let (core, store) = core();
        let epoch = verifying(&core);
        core.sign_out();

        let result = core.install(epoch, login(Some(jwt_expiring_in(3_600))));

        assert_eq!(result, Err(SessionError::NotAuthenticated));
        assert_eq!(core.status(), SessionStatus::Anonymous);
        assert!(store.load().unwrap().is_none());
    }

    // =====================================================================
    // commit_refresh() / fail_refresh()
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_commit_refresh_keeps_refresh_token_when_not_rotated() {
        let (core, store) = core();
        let epoch = verifying(&core);
        let refresh = jwt_expiring_in(3_600);
        core.install(epoch, login(Some(refresh.clone()))).unwrap();

        let (epoch, _) = core.begin_refresh().unwrap();
        core.commit_refresh(
            epoch,
            RefreshResponse {
                token: "access-2".into(),
                refresh_token: None,
            },
        )
        .unwrap();

        let session = core.snapshot();
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.access_token.as_deref(), Some("access-2"));
        assert_eq!(session.refresh_token.as_deref(), Some(refresh.as_str()));
        assert_eq!(store.load().unwrap().unwrap().access_token, "access-2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_refresh_rotated_token_recomputes_expiry() {
        let (core, _store) = core();
        let epoch = verifying(&core);
        core.install(epoch, login(Some(jwt_expiring_in(90)))).unwrap();

        let (epoch, _) = core.begin_refresh().unwrap();
        core.commit_refresh(
            epoch,
            RefreshResponse {
                token: "access-2".into(),
                refresh_token: Some(jwt_expiring_in(7_200)),
            },
        )
        .unwrap();

        let session = core.snapshot();
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.expires_at, Some(t0() + Duration::from_secs(7_200)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_refresh_inside_warning_window_without_rotation_is_active() {
        let (core, _store) = core();
        let epoch = verifying(&core);
        core.install(epoch, login(Some(jwt_expiring_in(90)))).unwrap();
        assert_eq!(core.status(), SessionStatus::Warning);

        let (epoch, _) = core.begin_refresh().unwrap();
        core.commit_refresh(
            epoch,
            RefreshResponse {
                token: "access-2".into(),
                refresh_token: None,
            },
        )
        .unwrap();

        let session = core.snapshot();
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.expires_at, Some(t0() + Duration::from_secs(90)));
        assert_eq!(core.scheduler().armed_expiry(), session.expires_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_refresh_unreadable_expiry_stays_warning() {
        let (core, _store) = core();
        let epoch = verifying(&core);
        core.install(epoch, login(Some("opaque".into()))).unwrap();

        let (epoch, _) = core.begin_refresh().unwrap();
        core.commit_refresh(
            epoch,
            RefreshResponse {
                token: "access-2".into(),
                refresh_token: None,
            },
        )
        .unwrap();

        assert_eq!(core.status(), SessionStatus::Warning);
        assert_eq!(core.scheduler().armed_expiry(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_refresh_after_sign_out_is_ignored() {
        let (core, store) = core();
        let epoch = verifying(&core);
        core.install(epoch, login(Some(jwt_expiring_in(3_600)))).unwrap();
        let (epoch, _) = core.begin_refresh().unwrap();
        core.sign_out();

        let result = core.commit_refresh(
            epoch,
            RefreshResponse {
                token: "late".into(),
                refresh_token: None,
            },
        );

        assert_eq!(result, Err(SessionError::RefreshRaceIgnored));
        assert_eq!(core.snapshot(), Session::default());
        assert!(store.load().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_refresh_expires_and_clears() {
        let (core, store) = core();
        let epoch = verifying(&core);
        core.install(epoch, login(Some(jwt_expiring_in(3_600)))).unwrap();
        let (epoch, _) = core.begin_refresh().unwrap();

        assert!(core.fail_refresh(epoch));

        assert_eq!(core.status(), SessionStatus::Expired);
        assert!(core.snapshot().access_token.is_none());
        assert!(store.load().unwrap().is_none());
        assert_eq!(core.scheduler().armed_expiry(), None);
        assert!(!core.fail_refresh(epoch), "second failure is a no-op");
    }

    #[tokio::test(start_paused = true)]
    async fn test_begin_refresh_without_session_is_not_authenticated() {
        let (core, _store) = core();
        assert_eq!(core.begin_refresh(), Err(SessionError::NotAuthenticated));
    }

    // =====================================================================
    // login steps, activity, warning
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_begin_verification_requires_matching_phone() {
        let (core, _store) = core();
        core.begin_authentication("5551234567".into()).unwrap();

        let result = core.begin_verification("5559999999");

        assert!(matches!(result, Err(SessionError::Validation(_))));
        assert_eq!(core.status(), SessionStatus::Authenticating);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_verification_returns_to_authenticating() {
        let (core, _store) = core();
        let epoch = verifying(&core);

        core.abort_verification(epoch);

        assert_eq!(core.status(), SessionStatus::Authenticating);
    }

    #[tokio::test(start_paused = true)]
    async fn test_begin_authentication_rejected_while_live() {
        let (core, _store) = core();
        let epoch = verifying(&core);
        core.install(epoch, login(Some(jwt_expiring_in(3_600)))).unwrap();

        let result = core.begin_authentication("5551234567".into());

        assert_eq!(result, Err(SessionError::InvalidState(SessionStatus::Active)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_from_activity_keeps_expiry() {
        let (core, _store) = core();
        let epoch = verifying(&core);
        core.install(epoch, login(Some(jwt_expiring_in(3_600)))).unwrap();
        let before = core.scheduler().generation();

        assert!(core.rearm_from_activity());

        assert!(core.scheduler().generation() > before);
        assert_eq!(
            core.scheduler().armed_expiry(),
            Some(t0() + Duration::from_secs(3_600))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_from_activity_without_expiry_does_nothing() {
        let (core, _store) = core();
        let epoch = verifying(&core);
        core.install(epoch, login(Some("opaque".into()))).unwrap();

        assert!(!core.rearm_from_activity());
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_warning_stale_generation_ignored() {
        let (core, _store) = core();
        let epoch = verifying(&core);
        core.install(epoch, login(Some(jwt_expiring_in(3_600)))).unwrap();
        let stale = core.scheduler().generation();
        core.rearm_from_activity();

        core.on_warning(stale);
        assert_eq!(core.status(), SessionStatus::Active);

        core.on_warning(core.scheduler().generation());
        assert_eq!(core.status(), SessionStatus::Warning);
    }
}
