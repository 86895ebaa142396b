use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized: {}", describe(.0, "credential missing or expired"))]
    Unauthorized(Option<String>),

    #[error("Access denied: {}", describe(.0, "forbidden"))]
    AccessDenied(Option<String>),

    #[error("Resource not found: {}", describe(.0, "no such endpoint"))]
    NotFound(Option<String>),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Request rejected (status {status}): {}", describe(.message, "no details"))]
    Rejected {
        status: u16,
        message: Option<String>,
    },

    #[error("Server error (status {status}): {}", describe(.message, "no details"))]
    ServerError {
        status: u16,
        message: Option<String>,
    },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

fn describe<'a>(message: &'a Option<String>, fallback: &'a str) -> &'a str {
    message.as_deref().unwrap_or(fallback)
}

/// Maximum length for error response bodies in log output
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error bodies from the API look like `{"error": "..."}`.
#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    fn extract_message(body: &str) -> Option<String> {
        serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.error)
            .filter(|m| !m.trim().is_empty())
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        debug!(status = status.as_u16(), body = %Self::truncate_body(body), "Request failed");
        let message = Self::extract_message(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized(message),
            403 => ApiError::AccessDenied(message),
            404 => ApiError::NotFound(message),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError {
                status: status.as_u16(),
                message,
            },
            code => ApiError::Rejected {
                status: code,
                message,
            },
        }
    }

    /// The human-readable reason the server gave, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Unauthorized(m) | ApiError::AccessDenied(m) | ApiError::NotFound(m) => {
                m.as_deref()
            }
            ApiError::Rejected { message, .. } | ApiError::ServerError { message, .. } => {
                message.as_deref()
            }
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }
}
