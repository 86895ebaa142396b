//! REST API client module for the Serenity API.
//!
//! This module provides the `ApiClient`, the authenticated transport that
//! every call to the server goes through. Requests carry the session's
//! bearer token unless they target the public login and registration
//! endpoints; responses are checked for rejected credentials.

pub mod client;
pub mod error;

pub use client::{ApiClient, UnauthorizedPolicy};
pub use error::ApiError;
