//! Session orchestration: login, logout, renewal and startup restore.
//!
//! `SessionManager` is the only writer of the [`CredentialStore`]. Every
//! renewal trigger (the scheduled timer, the activity monitor, the request
//! interceptor) goes through [`SessionManager::renew`], which is
//! single-flight: while one refresh call is outstanding, later callers attach
//! to its result instead of issuing their own.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::api::ApiError;
use crate::config::SessionSettings;
use crate::models::{AuthResponse, Credentials, User};

use super::{CredentialStore, SessionError};

/// Server side of the authentication endpoints.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ApiError>;

    /// Mint a new access credential from the server-held renewal cookie.
    async fn refresh(&self) -> Result<AuthResponse, ApiError>;

    /// Invalidate the renewal cookie server-side.
    async fn logout(&self) -> Result<(), ApiError>;
}

/// Called when a live session ends and the user has to sign in again.
pub trait Navigator: Send + Sync {
    fn navigate_to_login(&self);
}

/// Navigator for headless consumers that have no login view.
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn navigate_to_login(&self) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticated(User),
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            SessionState::Authenticated(user) => Some(user),
            SessionState::Anonymous => None,
        }
    }
}

type RenewalResult = Result<User, SessionError>;
type SharedRenewal = Shared<BoxFuture<'static, RenewalResult>>;

struct PendingRenewal {
    id: u64,
    result: SharedRenewal,
}

/// What was true when a renewal was requested.
#[derive(Clone, Copy)]
struct RenewalContext {
    id: u64,
    epoch: u64,
    was_authenticated: bool,
}

struct Inner {
    backend: Arc<dyn AuthBackend>,
    navigator: Arc<dyn Navigator>,
    store: Arc<CredentialStore>,
    settings: SessionSettings,
    demo_mode: bool,
    state: watch::Sender<SessionState>,
    pending: Mutex<Option<PendingRenewal>>,
    next_renewal_id: AtomicU64,
    schedule: Mutex<Option<JoinHandle<()>>>,
    /// Bumped whenever the session is torn down. Store writes happen under
    /// this lock so a renewal that settles after a logout can be discarded.
    epoch: Mutex<u64>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.schedule.get_mut().take() {
            handle.abort();
        }
    }
}

/// Owned session service. Clone is cheap and every clone drives the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn AuthBackend>,
        navigator: Arc<dyn Navigator>,
        settings: SessionSettings,
        demo_mode: bool,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Anonymous);
        Self {
            inner: Arc::new(Inner {
                backend,
                navigator,
                store: Arc::new(CredentialStore::new()),
                settings,
                demo_mode,
                state,
                pending: Mutex::new(None),
                next_renewal_id: AtomicU64::new(0),
                schedule: Mutex::new(None),
                epoch: Mutex::new(0),
            }),
        }
    }

    // ===== Read side =====

    /// Read-only view of the credential store.
    pub fn credentials(&self) -> &CredentialStore {
        &self.inner.store
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.inner.settings
    }

    pub fn is_demo(&self) -> bool {
        self.inner.demo_mode
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    pub fn current_user(&self) -> Option<User> {
        self.inner.state.borrow().user().cloned()
    }

    pub fn access_value(&self) -> Option<String> {
        self.inner.store.access_value()
    }

    pub fn time_until_expiration(&self) -> Duration {
        self.inner.store.time_until_expiration()
    }

    /// True while a renewal is in flight (the REFRESHING overlay).
    pub fn is_refreshing(&self) -> bool {
        self.inner.pending.lock().is_some()
    }

    pub fn has_scheduled_renewal(&self) -> bool {
        self.inner
            .schedule
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    // ===== Transitions =====

    /// Establish the session at startup.
    ///
    /// With no credential in memory this makes exactly one silent renewal
    /// attempt; its failure leaves the session anonymous without any
    /// navigation or surfaced error.
    pub async fn init(&self) -> SessionState {
        if self.inner.store.has_valid_credential() {
            let restored = {
                let _epoch = self.inner.epoch.lock();
                let user = self.inner.store.current_user();
                if let Some(user) = &user {
                    self.set_state(SessionState::Authenticated(user.clone()));
                }
                user
            };
            if let Some(user) = restored {
                debug!(subject = %user.subject, "Valid credential already in memory");
                self.schedule_renewal();
            }
        } else if self.inner.store.access_value().is_none() {
            debug!("No credential in memory, attempting silent restore");
            match self.renew().await {
                Ok(user) => info!(subject = %user.subject, "Session restored"),
                Err(err) => debug!(error = %err, "No session to restore"),
            }
        } else {
            debug!("Expired credential in memory, not attempting restore");
        }
        self.state()
    }

    #[instrument(skip(self, credentials), fields(username = %credentials.username))]
    pub async fn login(&self, credentials: &Credentials) -> Result<User, SessionError> {
        let response = self.inner.backend.login(credentials).await.map_err(|err| {
            warn!(error = %err, "Login failed");
            SessionError::from_login(err)
        })?;

        let user = User::new(response.username.clone(), response.role);
        {
            let _epoch = self.inner.epoch.lock();
            self.inner.store.save(&response);
            self.set_state(SessionState::Authenticated(user.clone()));
        }
        info!(
            subject = %user.subject,
            role = ?user.role,
            expires_in_ms = response.expires_in,
            "Logged in"
        );
        self.schedule_renewal();
        Ok(user)
    }

    /// End the session. The server-side logout is best effort; local cleanup
    /// always happens.
    pub async fn logout(&self) {
        if let Err(err) = self.inner.backend.logout().await {
            debug!(error = %err, "Server-side logout failed, clearing local session anyway");
        }
        self.end_session("logout");
    }

    /// Renew the access credential, joining the in-flight renewal if there is one.
    pub async fn renew(&self) -> Result<User, SessionError> {
        self.join_or_start_renewal().await
    }

    fn join_or_start_renewal(&self) -> SharedRenewal {
        let mut slot = self.inner.pending.lock();
        if let Some(pending) = slot.as_ref() {
            debug!(renewal_id = pending.id, "Joining in-flight renewal");
            return pending.result.clone();
        }

        let context = RenewalContext {
            id: self.inner.next_renewal_id.fetch_add(1, Ordering::Relaxed) + 1,
            epoch: *self.inner.epoch.lock(),
            was_authenticated: self.is_authenticated(),
        };

        // The network call runs in its own task so it settles even if every
        // waiter goes away.
        let manager = self.clone();
        let task = tokio::spawn(async move {
            let result = manager.perform_renewal(context).await;
            manager.finish_renewal(context.id);
            result
        });
        let result = async move {
            task.await
                .unwrap_or_else(|err| Err(SessionError::Interrupted(err.to_string())))
        }
        .boxed()
        .shared();

        *slot = Some(PendingRenewal {
            id: context.id,
            result: result.clone(),
        });
        result
    }

    fn finish_renewal(&self, id: u64) {
        let mut slot = self.inner.pending.lock();
        if slot.as_ref().map(|p| p.id) == Some(id) {
            *slot = None;
        }
    }

    async fn perform_renewal(&self, context: RenewalContext) -> RenewalResult {
        debug!(
            renewal_id = context.id,
            was_authenticated = context.was_authenticated,
            "Requesting credential renewal"
        );
        let outcome = self.inner.backend.refresh().await;

        let mut epoch = self.inner.epoch.lock();
        if *epoch != context.epoch {
            info!(renewal_id = context.id, "Session ended during renewal, discarding result");
            return Err(SessionError::Superseded);
        }

        match outcome {
            Ok(response) => {
                let user = User::new(response.username.clone(), response.role);
                self.inner.store.save(&response);
                self.set_state(SessionState::Authenticated(user.clone()));
                drop(epoch);

                info!(
                    subject = %user.subject,
                    expires_in_ms = response.expires_in,
                    "Access credential renewed"
                );
                self.schedule_renewal();
                Ok(user)
            }
            Err(err) => {
                let err = SessionError::from_refresh(err);
                if err.is_transient() {
                    drop(epoch);
                    warn!(error = %err, "Renewal failed, keeping current credential");
                } else if context.was_authenticated {
                    let was_authenticated = self.clear_locked(&mut epoch);
                    drop(epoch);
                    warn!(error = %err, "Renewal rejected, ending session");
                    self.after_session_end("renewal rejected", was_authenticated);
                } else {
                    drop(epoch);
                    debug!(error = %err, "Silent restore failed, staying anonymous");
                }
                Err(err)
            }
        }
    }

    /// Arm the timer that renews the credential `renewal_buffer` before it
    /// expires, replacing any timer already armed.
    pub fn schedule_renewal(&self) {
        let settings = &self.inner.settings;
        let mut slot = self.inner.schedule.lock();
        if let Some(previous) = slot.take() {
            previous.abort();
        }

        let remaining = self.inner.store.time_until_expiration();
        let delay = remaining.saturating_sub(settings.renewal_buffer());
        if delay < settings.min_schedule_delay() {
            warn!(
                remaining_secs = remaining.as_secs(),
                delay_secs = delay.as_secs(),
                "Credential lifetime too short for scheduled renewal, not arming timer"
            );
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                SessionManager { inner }.run_scheduled_renewal().await;
            }
        }));
        debug!(delay_secs = delay.as_secs(), "Scheduled credential renewal");
    }

    async fn run_scheduled_renewal(&self) {
        let attempts = 1 + self.inner.settings.schedule_retry_attempts;
        for attempt in 1..=attempts {
            if attempt > 1 {
                let delay = self.inner.settings.schedule_retry_delay();
                warn!(attempt, delay_secs = delay.as_secs(), "Retrying scheduled renewal");
                tokio::time::sleep(delay).await;
            }

            match self.renew().await {
                Ok(_) => {
                    debug!(attempt, "Scheduled renewal succeeded");
                    return;
                }
                Err(err) if err.is_transient() && attempt < attempts => {
                    warn!(error = %err, attempt, "Scheduled renewal failed");
                }
                Err(err) => {
                    // The interceptor picks this up on the next real 401.
                    warn!(error = %err, attempt, "Giving up on scheduled renewal");
                    return;
                }
            }
        }
    }

    /// Cancel the armed renewal timer, if any.
    pub fn cancel_schedule(&self) {
        if let Some(handle) = self.inner.schedule.lock().take() {
            handle.abort();
            debug!("Cancelled scheduled renewal");
        }
    }

    /// Teardown: stop background timers. The session itself is left as is.
    pub fn shutdown(&self) {
        self.cancel_schedule();
    }

    /// Cancel timers, wipe the credential and go anonymous. Navigates to the
    /// login view only when an authenticated session actually ended, and
    /// never in demo mode.
    fn end_session(&self, reason: &'static str) {
        self.cancel_schedule();
        let was_authenticated = {
            let mut epoch = self.inner.epoch.lock();
            self.clear_locked(&mut epoch)
        };
        self.after_session_end(reason, was_authenticated);
    }

    /// Bump the epoch, wipe the store and publish `Anonymous` in one step
    /// under the epoch guard. Returns whether the session was authenticated.
    fn clear_locked(&self, epoch: &mut u64) -> bool {
        *epoch += 1;
        self.inner.store.clear();
        self.set_state(SessionState::Anonymous)
    }

    fn after_session_end(&self, reason: &'static str, was_authenticated: bool) {
        self.cancel_schedule();
        info!(reason, "Session ended");

        if !was_authenticated {
            return;
        }
        if self.inner.demo_mode {
            debug!("Demo mode, not navigating to login");
        } else {
            self.inner.navigator.navigate_to_login();
        }
    }

    /// Publish a new state. Returns whether the previous one was authenticated.
    fn set_state(&self, next: SessionState) -> bool {
        let mut was_authenticated = false;
        self.inner.state.send_if_modified(|current| {
            was_authenticated = current.is_authenticated();
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        was_authenticated
    }
}
