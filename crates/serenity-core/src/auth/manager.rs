use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::api::{ApiClient, ApiError};
use crate::cache::CredentialCache;
use crate::config::Config;
use crate::models::{AuthResponse, LoginRequest, RegisterRequest, User};

use super::{AccessToken, AuthError, Commit, SessionStore};

/// Pause before checking that a fresh login actually reached storage.
const LOGIN_VERIFY_DELAY: Duration = Duration::from_millis(10);

const LOGIN_FAILED: &str = "Login failed";
const REGISTRATION_FAILED: &str = "Registration failed";

/// Login, registration and logout on top of a shared session store.
///
/// The manager is the only place that turns a server response into a
/// session; the `ApiClient` it owns reads the same store for every request.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<SessionStore>,
    api: ApiClient,
}

impl SessionManager {
    pub fn new(store: Arc<SessionStore>, api: ApiClient) -> Self {
        Self { store, api }
    }

    /// Hydrate a store from `cache` and wire a client to it.
    pub fn from_config(config: &Config, cache: Arc<dyn CredentialCache>) -> Result<Self, ApiError> {
        let store = Arc::new(SessionStore::hydrate(cache));
        let api = ApiClient::new(config, store.clone())?;
        Ok(Self::new(store, api))
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Authenticate and make the result the current session.
    ///
    /// On failure `last_error` holds the server's message (or a generic one)
    /// and the error is returned.
    pub async fn login(&self, credentials: &LoginRequest) -> Result<AuthResponse, AuthError> {
        self.store.begin_request();
        let result = self.login_inner(credentials).await;
        self.finish(&result, LOGIN_FAILED);
        result
    }

    async fn login_inner(&self, credentials: &LoginRequest) -> Result<AuthResponse, AuthError> {
        let response = self.api.login(credentials).await?;
        let (user, token) = Self::session_parts(&response)?;

        self.commit(user.clone(), &token)?;

        // A verified commit can still be undone by storage outside our
        // control; put it back if so, unless the session was cleared or
        // replaced while we waited.
        tokio::time::sleep(LOGIN_VERIFY_DELAY).await;
        self.store.repair_if_current(&user, &token)?;

        info!(user = %user.display_name(), "Logged in");
        Ok(response)
    }

    /// Create an account and log into it.
    pub async fn register(&self, user_data: &RegisterRequest) -> Result<AuthResponse, AuthError> {
        self.store.begin_request();
        let result = self.register_inner(user_data).await;
        self.finish(&result, REGISTRATION_FAILED);
        result
    }

    async fn register_inner(&self, user_data: &RegisterRequest) -> Result<AuthResponse, AuthError> {
        let response = self.api.register(user_data).await?;
        let (user, token) = Self::session_parts(&response)?;
        self.commit(user.clone(), &token)?;
        info!(user = %user.display_name(), "Registered");
        Ok(response)
    }

    /// Tell the server (best effort) and drop the local session.
    pub async fn logout(&self) {
        if self.store.is_authenticated() {
            if let Err(e) = self.api.logout().await {
                debug!(error = %e, "Server logout failed, clearing local session anyway");
            }
        }
        self.store.clear_session();
    }

    /// Re-fetch the user record for the current credential and store it.
    ///
    /// Fails with `NotAuthenticated` if the session is cleared or replaced
    /// before the response arrives.
    pub async fn refresh_user(&self) -> Result<User, AuthError> {
        let token = self.store.current_token().ok_or(AuthError::NotAuthenticated)?;
        let me = self.api.me().await?;
        let user = User::from_value(me.user).ok_or(AuthError::MissingUser)?;
        if !self.store.update_user(user.clone(), &token)? {
            return Err(AuthError::NotAuthenticated);
        }
        Ok(user)
    }

    fn session_parts(response: &AuthResponse) -> Result<(User, AccessToken), AuthError> {
        let token = AccessToken::parse_opt(response.access_token.as_deref())
            .ok_or(AuthError::MissingToken)?;
        let user = User::from_value(response.user.clone()).ok_or(AuthError::MissingUser)?;
        Ok((user, token))
    }

    fn commit(&self, user: User, token: &AccessToken) -> Result<(), AuthError> {
        match self.store.set_session(user, token.expose())? {
            Commit::Applied => Ok(()),
            Commit::Rejected => Err(AuthError::MissingToken),
        }
    }

    fn finish<T>(&self, result: &Result<T, AuthError>, fallback: &str) {
        let message = match result {
            Ok(_) => None,
            Err(e) => {
                error!(error = %e, "Authentication request failed");
                Some(e.user_message(fallback))
            }
        };
        self.store.finish_request(message);
    }
}
