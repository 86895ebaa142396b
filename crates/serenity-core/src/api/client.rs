//! API client for the Serenity REST API.
//!
//! `ApiClient` is the authenticated transport: every request passes through
//! [`ApiClient::authorize`] on the way out and [`ApiClient::inspect`] on the
//! way back.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Method, Request, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::auth::SessionStore;
use crate::config::Config;
use crate::models::{AuthResponse, LoginRequest, MeResponse, RegisterRequest};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Endpoints that must never carry a credential.
const PUBLIC_ENDPOINTS: [&str; 2] = ["/auth/login", "/auth/register"];

/// What to do when an authenticated call comes back `401 Unauthorized`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnauthorizedPolicy {
    /// Report the error and leave the session alone; the caller decides.
    #[default]
    Defer,
    /// Clear the session before reporting the error.
    ClearSession,
}

/// Authenticated HTTP client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: Arc<SessionStore>,
    unauthorized_policy: UnauthorizedPolicy,
}

impl ApiClient {
    /// Create a client reading its credential from `session`.
    pub fn new(config: &Config, session: Arc<SessionStore>) -> Result<Self, ApiError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        default_headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(default_headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            session,
            unauthorized_policy: config.unauthorized_policy,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn unauthorized_policy(&self) -> UnauthorizedPolicy {
        self.unauthorized_policy
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Login and registration go out without a credential.
    ///
    /// Matched on the end of the path, so `/api/auth/login` is public but
    /// `/api/auth/login-history` is not.
    pub fn is_public_endpoint(path: &str) -> bool {
        let path = path.trim_end_matches('/');
        PUBLIC_ENDPOINTS.iter().any(|p| path.ends_with(p))
    }

    /// Start a request against `path`, relative to the base URL.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    // ===== Interceptors =====

    /// Request interceptor.
    ///
    /// Public endpoints pass through untouched. Everything else gets the
    /// session's current token as a bearer credential, or loses any
    /// `Authorization` header it carried if there is no usable token.
    pub fn authorize(&self, request: &mut Request) {
        let path = request.url().path().to_string();
        if Self::is_public_endpoint(&path) {
            trace!(path = %path, "Public endpoint, leaving request unauthenticated");
            return;
        }

        let headers = request.headers_mut();
        match self.session.current_token() {
            Some(token) => match HeaderValue::from_str(&token.bearer()) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(header::AUTHORIZATION, value);
                }
                Err(_) => {
                    warn!(path = %path, "Token is not a valid header value, sending request without it");
                    headers.remove(header::AUTHORIZATION);
                }
            },
            None => {
                if headers.remove(header::AUTHORIZATION).is_some() {
                    debug!(path = %path, "Stripped stale Authorization header");
                } else {
                    debug!(path = %path, "No session, sending request without credential");
                }
            }
        }
    }

    /// Response interceptor.
    ///
    /// Success passes through. A `401` is handed to the configured
    /// [`UnauthorizedPolicy`] and then reported like any other failure.
    pub async fn inspect(&self, response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let path = response.url().path().to_string();
        let body = response.text().await.unwrap_or_default();
        let err = ApiError::from_status(status, &body);

        if err.is_unauthorized() && !Self::is_public_endpoint(&path) {
            self.on_unauthorized(&path);
        }
        Err(err)
    }

    fn on_unauthorized(&self, path: &str) {
        match self.unauthorized_policy {
            UnauthorizedPolicy::Defer => {
                warn!(path = %path, "Server rejected credential; leaving session to caller");
            }
            UnauthorizedPolicy::ClearSession => {
                warn!(path = %path, "Server rejected credential; clearing session");
                self.session.clear_session();
            }
        }
    }

    /// Run a request through both interceptors.
    ///
    /// Network and timeout failures come back as `ApiError::NetworkError`;
    /// nothing is retried.
    pub async fn execute(&self, mut request: Request) -> Result<Response, ApiError> {
        self.authorize(&mut request);
        debug!(method = %request.method(), path = %request.url().path(), "Sending request");
        let response = self.client.execute(request).await?;
        self.inspect(response).await
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = self.execute(builder.build()?).await?;
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return serde_json::from_value(Value::Null)
                .map_err(|e| ApiError::InvalidResponse(format!("Empty body: {}", e)));
        }
        serde_json::from_slice(&bytes)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON: {}", e)))
    }

    // ===== Generic verbs =====

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(self.request(Method::GET, path)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send_json(self.request(Method::POST, path).json(body)).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send_json(self.request(Method::PUT, path).json(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(self.request(Method::DELETE, path)).await
    }

    // ===== Auth endpoints =====

    pub async fn login(&self, credentials: &LoginRequest) -> Result<AuthResponse, ApiError> {
        self.post("/auth/login", credentials).await
    }

    pub async fn register(&self, user_data: &RegisterRequest) -> Result<AuthResponse, ApiError> {
        self.post("/auth/register", user_data).await
    }

    /// Fetch the account behind the current credential.
    pub async fn me(&self) -> Result<MeResponse, ApiError> {
        self.get("/auth/me").await
    }

    /// Tell the server the session is over. Tokens are stateless server-side,
    /// so this is informational.
    pub async fn logout(&self) -> Result<Value, ApiError> {
        self.post("/auth/logout", &serde_json::json!({})).await
    }
}
