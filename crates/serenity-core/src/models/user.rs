//! The authenticated user record.
//!
//! The server owns the shape of this record. The client stores and returns
//! it verbatim; the accessors below exist for display only.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct User(Value);

impl User {
    /// Wrap a server record. JSON `null` is not a user.
    pub fn from_value(value: Value) -> Option<Self> {
        if value.is_null() {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Parse a user from its persisted form.
    pub fn from_json(raw: &str) -> Option<Self> {
        serde_json::from_str::<Value>(raw)
            .ok()
            .and_then(Self::from_value)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.0)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn id(&self) -> Option<i64> {
        self.0.get("id").and_then(Value::as_i64)
    }

    pub fn username(&self) -> Option<&str> {
        self.0.get("username").and_then(Value::as_str)
    }

    pub fn role(&self) -> Option<&str> {
        self.0.get("role").and_then(Value::as_str)
    }

    /// Best display name available: username, then name, then id.
    pub fn display_name(&self) -> String {
        if let Some(username) = self.username() {
            return username.to_string();
        }
        if let Some(name) = self.0.get("name").and_then(Value::as_str) {
            return name.to_string();
        }
        match self.id() {
            Some(id) => format!("user #{}", id),
            None => "unknown user".to_string(),
        }
    }
}
