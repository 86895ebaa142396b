use std::fmt;

/// Every access token the server issues is a JWT, so its base64url-encoded
/// JSON header always starts with `eyJ`. This is a shape check only.
pub const ACCESS_TOKEN_PREFIX: &str = "eyJ";

/// A bearer credential that passed the shape check.
///
/// The raw value is only reachable through [`AccessToken::expose`]; `Debug`
/// never prints it.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Accept a raw token string, or return `None` if it is empty or does not
    /// look like an access token. Surrounding whitespace is ignored.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.starts_with(ACCESS_TOKEN_PREFIX) {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    /// Same as [`AccessToken::parse`] for an optional input.
    pub fn parse_opt(raw: Option<&str>) -> Option<Self> {
        raw.and_then(Self::parse)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Value for an `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken(<redacted, {} bytes>)", self.0.len())
    }
}
