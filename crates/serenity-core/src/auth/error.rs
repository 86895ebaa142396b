use thiserror::Error;

use crate::api::ApiError;
use crate::cache::CacheError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to persist session: {0}")]
    Persistence(#[from] CacheError),

    #[error("Persisted {0} did not match what was written")]
    VerificationFailed(&'static str),

    #[error("Failed to serialize user record: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("No access token received from server")]
    MissingToken,

    #[error("No user record received from server")]
    MissingUser,

    #[error("Not logged in")]
    NotAuthenticated,
}

impl AuthError {
    /// Message to show a person: the server's own explanation when it sent
    /// one, otherwise `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            AuthError::Api(e) => e
                .server_message()
                .map(str::to_string)
                .unwrap_or_else(|| fallback.to_string()),
            _ => fallback.to_string(),
        }
    }
}
