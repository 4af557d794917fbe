//! In-memory auth backend and navigator for session tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;

use crate::api::ApiError;
use crate::models::{AuthResponse, Credentials, Role};

use super::{AuthBackend, Navigator};

/// Simulated time a refresh call spends on the wire.
pub(crate) const REFRESH_LATENCY: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug)]
pub(crate) enum Outcome {
    /// Issue a fresh credential with this lifetime in milliseconds.
    Grant(u64),
    /// Answer with this HTTP status.
    Reject(u16),
    /// Server unreachable.
    Offline,
}

pub(crate) struct FakeBackend {
    login: Mutex<Outcome>,
    logout: Mutex<Outcome>,
    refresh_queue: Mutex<VecDeque<Outcome>>,
    refresh_default: Mutex<Outcome>,
    refresh_latency: Mutex<Duration>,
    issued: AtomicUsize,
    login_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    logout_calls: AtomicUsize,
}

impl FakeBackend {
    /// Backend that grants every login and refresh with the given lifetime.
    pub(crate) fn granting(lifetime_ms: u64) -> Self {
        Self {
            login: Mutex::new(Outcome::Grant(lifetime_ms)),
            logout: Mutex::new(Outcome::Grant(0)),
            refresh_queue: Mutex::new(VecDeque::new()),
            refresh_default: Mutex::new(Outcome::Grant(lifetime_ms)),
            refresh_latency: Mutex::new(REFRESH_LATENCY),
            issued: AtomicUsize::new(0),
            login_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn set_login(&self, outcome: Outcome) {
        *self.login.lock() = outcome;
    }

    pub(crate) fn set_logout(&self, outcome: Outcome) {
        *self.logout.lock() = outcome;
    }

    /// Queue a one-shot refresh outcome ahead of the default.
    pub(crate) fn push_refresh(&self, outcome: Outcome) {
        self.refresh_queue.lock().push_back(outcome);
    }

    pub(crate) fn set_default_refresh(&self, outcome: Outcome) {
        *self.refresh_default.lock() = outcome;
    }

    pub(crate) fn set_refresh_latency(&self, latency: Duration) {
        *self.refresh_latency.lock() = latency;
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    fn respond(&self, outcome: Outcome) -> Result<AuthResponse, ApiError> {
        match outcome {
            Outcome::Grant(expires_in) => {
                let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(AuthResponse {
                    access_token: format!("token-{n}"),
                    token_type: "Bearer".to_string(),
                    expires_in,
                    username: "alice".to_string(),
                    role: Role::User,
                })
            }
            Outcome::Reject(status) => Err(ApiError::from_status(
                StatusCode::from_u16(status).expect("valid status"),
                "rejected",
            )),
            Outcome::Offline => Err(ApiError::ServerError("connection refused".to_string())),
        }
    }
}

#[async_trait]
impl AuthBackend for FakeBackend {
    async fn login(&self, _credentials: &Credentials) -> Result<AuthResponse, ApiError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = *self.login.lock();
        self.respond(outcome)
    }

    async fn refresh(&self) -> Result<AuthResponse, ApiError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let latency = *self.refresh_latency.lock();
        tokio::time::sleep(latency).await;
        let queued = self.refresh_queue.lock().pop_front();
        let outcome = queued.unwrap_or_else(|| *self.refresh_default.lock());
        self.respond(outcome)
    }

    async fn logout(&self) -> Result<(), ApiError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        match *self.logout.lock() {
            Outcome::Grant(_) => Ok(()),
            failure => self.respond(failure).map(|_| ()),
        }
    }
}

#[derive(Default)]
pub(crate) struct CountingNavigator {
    calls: AtomicUsize,
}

impl CountingNavigator {
    pub(crate) fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Navigator for CountingNavigator {
    fn navigate_to_login(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Let spawned tasks run to completion on the paused clock.
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(500)).await;
}
