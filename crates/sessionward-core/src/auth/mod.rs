//! Session lifecycle: credential storage, renewal and expiry.
//!
//! This module provides:
//! - `CredentialStore`: the in-memory access credential and its expiry
//! - `SessionManager`: login, logout, single-flight renewal and the renewal timer
//! - `ActivityMonitor`: renews on user activity when the credential is close to expiring
//! - `ExpiryNotifier`: countdown and warning status for front ends
//!
//! The access credential never leaves memory. The long-lived renewal
//! credential is an HTTP-only cookie owned by the server and the HTTP client.

pub mod activity;
pub mod credentials;
pub mod error;
pub mod expiry;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use activity::{activity_channel, merge_sources, ActivityKind, ActivityMonitor, ActivitySender};
pub use credentials::CredentialStore;
pub use error::SessionError;
pub use expiry::{ExpiryNotifier, ExpiryStatus};
pub use session::{AuthBackend, Navigator, NoopNavigator, SessionManager, SessionState};
