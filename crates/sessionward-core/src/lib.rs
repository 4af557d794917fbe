//! Core library for sessionward.
//!
//! Keeps an authenticated session alive against a REST API: the access
//! credential lives in memory, renewals are single-flight, a timer renews
//! ahead of expiry, user activity renews opportunistically, and outbound
//! requests recover from expired credentials.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod utils;

pub use api::{ApiClient, ApiError, AuthorizedClient};
pub use auth::{
    ActivityKind, ActivityMonitor, AuthBackend, CredentialStore, ExpiryNotifier, ExpiryStatus,
    Navigator, SessionError, SessionManager, SessionState,
};
pub use config::{Config, SessionSettings};
pub use models::{Credentials, Role, User};
