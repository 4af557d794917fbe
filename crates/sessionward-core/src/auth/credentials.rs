//! In-memory access credential.
//!
//! Holds the bearer value, its expiry and the identity decoded from the auth
//! response. Only the session manager writes here.

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::time::Instant;

use crate::models::{AuthResponse, Role, User};

/// The access credential currently held in memory.
struct Credential {
    access_value: String,
    expires_at: Instant,
    issued_at: DateTime<Utc>,
    lifetime: Duration,
    subject: String,
    role: Role,
}

/// In-memory holder of the access credential.
///
/// Nothing here is ever written to disk: a process restart loses the
/// credential, and the session comes back only through a silent renewal
/// against the server-held renewal cookie. Writes are crate-private so the
/// session manager stays the only writer.
#[derive(Default)]
pub struct CredentialStore {
    current: RwLock<Option<Credential>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the credential from a login or refresh response.
    pub(crate) fn save(&self, response: &AuthResponse) {
        let lifetime = Duration::from_millis(response.expires_in);
        let credential = Credential {
            access_value: response.access_token.clone(),
            expires_at: Instant::now() + lifetime,
            issued_at: Utc::now(),
            lifetime,
            subject: response.username.clone(),
            role: response.role,
        };
        *self.current.write() = Some(credential);
    }

    /// Wipe every field.
    pub(crate) fn clear(&self) {
        *self.current.write() = None;
    }

    /// Get the access value if a credential exists, expired or not
    pub fn access_value(&self) -> Option<String> {
        self.current.read().as_ref().map(|c| c.access_value.clone())
    }

    /// True once `now >= expires_at - buffer`, and always true with no credential.
    pub fn is_expired(&self, buffer: Duration) -> bool {
        match self.current.read().as_ref() {
            Some(credential) => match credential.expires_at.checked_sub(buffer) {
                Some(deadline) => Instant::now() >= deadline,
                None => true,
            },
            None => true,
        }
    }

    /// Remaining lifetime, zero when absent or already expired.
    pub fn time_until_expiration(&self) -> Duration {
        self.current
            .read()
            .as_ref()
            .map(|c| c.expires_at.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }

    /// Check if a credential exists and has not expired
    pub fn has_valid_credential(&self) -> bool {
        !self.is_expired(Duration::ZERO)
    }

    pub fn current_user(&self) -> Option<User> {
        self.current
            .read()
            .as_ref()
            .map(|c| User::new(c.subject.clone(), c.role))
    }

    /// Wall-clock expiry, for display only.
    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        self.current.read().as_ref().and_then(|c| {
            chrono::Duration::from_std(c.lifetime)
                .ok()
                .map(|lifetime| c.issued_at + lifetime)
        })
    }
}
