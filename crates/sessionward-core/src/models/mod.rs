//! Wire and identity types shared by the session and API layers.
//!
//! - `AuthResponse`: body of the login and refresh endpoints
//! - `Credentials`: interactive login input (password kept secret)
//! - `User`, `Role`: identity derived from the access credential

pub mod auth;

pub use auth::{AuthResponse, Credentials, Role, User};
