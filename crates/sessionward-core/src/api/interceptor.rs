//! Authorized requests.
//!
//! `AuthorizedClient` attaches the access credential to every outbound call
//! except the auth endpoints, and recovers from an expired credential by
//! renewing once and replaying the request.

use std::time::Duration;

use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Method, Request, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::auth::{SessionError, SessionManager};

use super::client::is_auth_endpoint;
use super::{ApiClient, ApiError};

#[derive(Clone)]
pub struct AuthorizedClient {
    api: ApiClient,
    session: SessionManager,
}

impl AuthorizedClient {
    pub fn new(api: ApiClient, session: SessionManager) -> Self {
        Self { api, session }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Start a request against an API path. Send it with [`execute`](Self::execute).
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.api.http().request(method, self.api.url(path))
    }

    /// Send a request with the current credential attached.
    ///
    /// A 401, or a 403 while the credential has expired, triggers one renewal
    /// and one replay. If renewal fails the original error is returned and a
    /// session that was live before the renewal is logged out. Requests with
    /// streaming bodies cannot be replayed and get the original error after
    /// the renewal.
    #[instrument(skip(self, request), fields(method = %request.method(), path = %request.url().path()))]
    pub async fn execute(&self, request: Request) -> Result<Response, ApiError> {
        if is_auth_endpoint(request.url().path()) {
            let response = self.api.http().execute(request).await?;
            return ApiClient::check_response(response).await;
        }

        let replay = request.try_clone();
        let response = self.send_authorized(request).await?;
        if !self.needs_renewal(response.status()) {
            return ApiClient::check_response(response).await;
        }

        let original = match ApiClient::check_response(response).await {
            Ok(response) => return Ok(response),
            Err(err) => err,
        };
        debug!(error = %original, "Credential refused, renewing");

        let was_authenticated = self.session.is_authenticated();
        match self.session.renew().await {
            Ok(_) => match replay {
                Some(replay) => {
                    debug!("Replaying request with renewed credential");
                    let response = self.send_authorized(replay).await?;
                    ApiClient::check_response(response).await
                }
                None => {
                    warn!("Credential renewed but request body cannot be replayed");
                    Err(original)
                }
            },
            Err(SessionError::Superseded) => {
                debug!("Session ended while renewing, nothing to log out");
                Err(original)
            }
            Err(err) if !was_authenticated => {
                // A failed silent renewal leaves the session anonymous and the store empty.
                debug!(error = %err, "Renewal failed without a session, skipping logout");
                Err(original)
            }
            Err(err) => {
                warn!(error = %err, "Renewal after refused credential failed, logging out");
                self.session.logout().await;
                Err(original)
            }
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let request = self.request(Method::GET, path).build()?;
        Self::parse_json(self.execute(request).await?).await
    }

    pub async fn post_json<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let request = self.request(Method::POST, path).json(body).build()?;
        Self::parse_json(self.execute(request).await?).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let request = self.request(Method::DELETE, path).build()?;
        self.execute(request).await?;
        Ok(())
    }

    fn needs_renewal(&self, status: StatusCode) -> bool {
        match status {
            StatusCode::UNAUTHORIZED => true,
            StatusCode::FORBIDDEN => self.session.credentials().is_expired(Duration::ZERO),
            _ => false,
        }
    }

    async fn send_authorized(&self, mut request: Request) -> Result<Response, ApiError> {
        if let Some(value) = self.session.access_value() {
            let bearer = HeaderValue::from_str(&format!("Bearer {}", value))
                .map_err(|e| ApiError::InvalidRequest(format!("Unusable access credential: {}", e)))?;
            request.headers_mut().insert(AUTHORIZATION, bearer);
        }
        Ok(self.api.http().execute(request).await?)
    }

    async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON response: {}", e)))
    }
}
