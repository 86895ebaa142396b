//! Authentication module for managing the user session.
//!
//! This module provides:
//! - `SessionStore`: the in-memory session, mirrored to a credential cache
//!   with a write-then-verify discipline
//! - `SessionManager`: login, registration and logout against the API
//! - `AccessToken`: a bearer token that passed the shape check
//!
//! Sessions survive restarts through the credential cache and are never
//! expired locally; only the server decides whether a token is still good.

pub mod error;
pub mod manager;
pub mod session;
pub mod token;

pub use error::{AuthError, SessionError};
pub use manager::SessionManager;
pub use session::{ActiveSession, Commit, Session, SessionState, SessionStore};
pub use token::{AccessToken, ACCESS_TOKEN_PREFIX};
