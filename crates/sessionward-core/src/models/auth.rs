use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Token type assumed when the server omits `tokenType`.
const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Body returned by both `/auth/login` and `/auth/refresh`.
///
/// The renewal cookie set alongside it never shows up here; it lives in the
/// HTTP client's cookie store.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    #[serde(alias = "accessValue")]
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Access token lifetime in milliseconds.
    pub expires_in: u64,
    pub username: String,
    pub role: Role,
}

fn default_token_type() -> String {
    DEFAULT_TOKEN_TYPE.to_string()
}

impl fmt::Debug for AuthResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthResponse")
            .field("access_token", &"[redacted]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("username", &self.username)
            .field("role", &self.role)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    #[serde(alias = "ROLE_ADMIN", alias = "admin")]
    Admin,
    #[serde(alias = "ROLE_USER", alias = "user")]
    User,
    /// Any role this client does not know about. Treated as unprivileged.
    #[serde(other)]
    Other,
}

impl Role {
    pub fn display_name(&self) -> &'static str {
        match self {
            Role::Admin => "Administrator",
            Role::User => "User",
            Role::Other => "Other",
        }
    }
}

/// Identity derived from the current access credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub subject: String,
    pub role: Role,
    pub is_admin: bool,
}

impl User {
    pub fn new(subject: impl Into<String>, role: Role) -> Self {
        Self {
            subject: subject.into(),
            role,
            is_admin: role == Role::Admin,
        }
    }
}

/// Username and password for an interactive login.
#[derive(Debug)]
pub struct Credentials {
    pub username: String,
    password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_login_response() {
        let json = r#"{"accessToken":"abc.def","tokenType":"Bearer","expiresIn":900000,"username":"alice","role":"ADMIN"}"#;
        let resp: AuthResponse = serde_json::from_str(json).expect("valid auth response");
        assert_eq!(resp.access_token, "abc.def");
        assert_eq!(resp.expires_in, 900_000);
        assert_eq!(resp.role, Role::Admin);
    }

    #[test]
    fn test_parse_response_with_access_value_alias_and_defaults() {
        let json = r#"{"accessValue":"tok","expiresIn":1000,"username":"bob","role":"ROLE_USER"}"#;
        let resp: AuthResponse = serde_json::from_str(json).expect("valid auth response");
        assert_eq!(resp.access_token, "tok");
        assert_eq!(resp.token_type, "Bearer");
        assert_eq!(resp.role, Role::User);
    }

    #[test]
    fn test_unknown_role_is_other() {
        let role: Role = serde_json::from_str(r#""AUDITOR""#).expect("any string is a role");
        assert_eq!(role, Role::Other);
        assert!(!User::new("carol", role).is_admin);
    }

    #[test]
    fn test_debug_output_hides_secrets() {
        let resp = AuthResponse {
            access_token: "super-secret".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: 1,
            username: "alice".to_string(),
            role: Role::User,
        };
        assert!(!format!("{:?}", resp).contains("super-secret"));

        let creds = Credentials::new("alice", "hunter2");
        assert!(!format!("{:?}", creds).contains("hunter2"));
        assert_eq!(creds.password(), "hunter2");
    }
}
