use thiserror::Error;

use crate::api::ApiError;

/// Session-level failures.
///
/// Clone so one renewal outcome can be handed to every waiter; underlying
/// transport errors are kept as their messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Session renewal rejected: {0}")]
    RenewalRejected(String),

    #[error("Authentication service unavailable: {0}")]
    TransportUnavailable(String),

    #[error("Invalid authentication response: {0}")]
    InvalidResponse(String),

    #[error("Renewal discarded - the session ended while it was in flight")]
    Superseded,

    #[error("Renewal interrupted: {0}")]
    Interrupted(String),
}

impl SessionError {
    /// Map a failed `/auth/login` call.
    pub fn from_login(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized => SessionError::InvalidCredentials,
            ApiError::InvalidResponse(message) => SessionError::InvalidResponse(message),
            err if err.is_transient() => SessionError::TransportUnavailable(err.to_string()),
            ApiError::NetworkError(e) if e.is_decode() => SessionError::InvalidResponse(e.to_string()),
            err => SessionError::TransportUnavailable(err.to_string()),
        }
    }

    /// Map a failed `/auth/refresh` call.
    pub fn from_refresh(err: ApiError) -> Self {
        if err.is_transient() {
            SessionError::TransportUnavailable(err.to_string())
        } else {
            SessionError::RenewalRejected(err.to_string())
        }
    }

    /// Worth another attempt later; says nothing about the credential itself.
    pub fn is_transient(&self) -> bool {
        matches!(self, SessionError::TransportUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_unauthorized_is_invalid_credentials() {
        assert_eq!(
            SessionError::from_login(ApiError::Unauthorized),
            SessionError::InvalidCredentials
        );
    }

    #[test]
    fn test_refresh_mapping() {
        assert!(matches!(
            SessionError::from_refresh(ApiError::Unauthorized),
            SessionError::RenewalRejected(_)
        ));
        assert!(matches!(
            SessionError::from_refresh(ApiError::AccessDenied("revoked".to_string())),
            SessionError::RenewalRejected(_)
        ));
        let outage = SessionError::from_refresh(ApiError::ServerError("bad gateway".to_string()));
        assert!(outage.is_transient());
    }
}
