//! HTTP side of the session.
//!
//! - `ApiClient`: shared `reqwest::Client` plus the login, refresh and logout calls
//! - `AuthorizedClient`: attaches the credential and recovers from 401/403
//! - `ApiError`: HTTP failures mapped from status codes

pub mod client;
pub mod error;
pub mod interceptor;

pub use client::{is_auth_endpoint, ApiClient};
pub use error::ApiError;
pub use interceptor::AuthorizedClient;
