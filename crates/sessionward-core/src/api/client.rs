//! HTTP client for the authentication service.
//!
//! `ApiClient` owns the shared `reqwest::Client` (connection pool and cookie
//! jar) and speaks the three auth endpoints. The renewal cookie set by the
//! server on login lives only in the client's cookie store and is sent back
//! automatically on refresh.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client, Response};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::auth::AuthBackend;
use crate::config::Config;
use crate::models::{AuthResponse, Credentials};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

pub const LOGIN_PATH: &str = "/auth/login";
pub const REFRESH_PATH: &str = "/auth/refresh";
pub const LOGOUT_PATH: &str = "/auth/logout";

const USER_AGENT: &str = concat!("sessionward/", env!("CARGO_PKG_VERSION"));

/// True for the login, refresh and logout endpoints, which are never
/// intercepted or given a bearer credential.
pub fn is_auth_endpoint(path: &str) -> bool {
    let path = path.trim_end_matches('/');
    [LOGIN_PATH, REFRESH_PATH, LOGOUT_PATH]
        .iter()
        .any(|endpoint| path.ends_with(endpoint))
}

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.api_base_url, config.request_timeout())
    }

    /// The shared client, cookie jar included.
    pub fn http(&self) -> &Client {
        &self.client
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an API path.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Check if response is successful, returning an error with body if not.
    pub(crate) async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn post_auth<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response, ApiError> {
        let response = self
            .client
            .post(self.url(path))
            .header(header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await?;
        Self::check_response(response).await
    }

    async fn parse_auth(response: Response) -> Result<AuthResponse, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse auth response: {}", e)))
    }
}

#[async_trait]
impl AuthBackend for ApiClient {
    #[instrument(skip(self, credentials), fields(username = %credentials.username))]
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ApiError> {
        let body = json!({
            "username": credentials.username,
            "password": credentials.password(),
        });
        let response = self.post_auth(LOGIN_PATH, &body).await?;
        let auth = Self::parse_auth(response).await?;
        debug!(expires_in_ms = auth.expires_in, "Login accepted");
        Ok(auth)
    }

    #[instrument(skip(self))]
    async fn refresh(&self) -> Result<AuthResponse, ApiError> {
        let response = self.post_auth(REFRESH_PATH, &json!({})).await?;
        let auth = Self::parse_auth(response).await?;
        debug!(expires_in_ms = auth.expires_in, "Refresh accepted");
        Ok(auth)
    }

    #[instrument(skip(self))]
    async fn logout(&self) -> Result<(), ApiError> {
        self.post_auth(LOGOUT_PATH, &json!({})).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ApiClient {
        ApiClient::new(&server.uri(), Duration::from_secs(5)).expect("client builds")
    }

    fn grant(token: &str) -> serde_json::Value {
        json!({
            "accessToken": token,
            "tokenType": "Bearer",
            "expiresIn": 900000,
            "username": "alice",
            "role": "ROLE_ADMIN"
        })
    }

    #[test]
    fn test_auth_endpoint_detection() {
        assert!(is_auth_endpoint("/auth/login"));
        assert!(is_auth_endpoint("/api/v1/auth/refresh/"));
        assert!(is_auth_endpoint("/auth/logout"));
        assert!(!is_auth_endpoint("/auth/profile"));
        assert!(!is_auth_endpoint("/reports"));
    }

    #[test]
    fn test_url_joining() {
        let client = ApiClient::new("https://api.example.test/v1/", Duration::from_secs(5))
            .expect("client builds");
        assert_eq!(client.base_url(), "https://api.example.test/v1");
        assert_eq!(client.url("/reports"), "https://api.example.test/v1/reports");
        assert_eq!(client.url("reports"), "https://api.example.test/v1/reports");
    }

    #[tokio::test]
    async fn test_login_posts_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(body_json(json!({"username": "alice", "password": "s3cret"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(grant("token-1")))
            .expect(1)
            .mount(&server)
            .await;

        let auth = client_for(&server)
            .login(&Credentials::new("alice", "s3cret"))
            .await
            .expect("login succeeds");

        assert_eq!(auth.access_token, "token-1");
        assert_eq!(auth.expires_in, 900_000);
        assert_eq!(auth.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .login(&Credentials::new("alice", "wrong"))
            .await;

        assert!(matches!(result, Err(ApiError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_refresh_sends_renewal_cookie() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "renewal=abc123; HttpOnly; Path=/")
                    .set_body_json(grant("token-1")),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .and(header("cookie", "renewal=abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(grant("token-2")))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        client
            .login(&Credentials::new("alice", "s3cret"))
            .await
            .expect("login succeeds");
        let renewed = client.refresh().await.expect("refresh succeeds");

        assert_eq!(renewed.access_token, "token-2");
    }

    #[tokio::test]
    async fn test_refresh_with_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let result = client_for(&server).refresh().await;

        assert!(matches!(result, Err(ApiError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_logout_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/logout"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let result = client_for(&server).logout().await;

        match result {
            Err(ApiError::ServerError(body)) => assert_eq!(body, "maintenance"),
            other => panic!("expected server error, got {other:?}"),
        }
    }
}
