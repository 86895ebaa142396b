//! Data models exchanged with the Serenity API.
//!
//! - `User`: the opaque server-defined account record
//! - `LoginRequest`, `RegisterRequest`: bodies for the public auth endpoints
//! - `AuthResponse`, `MeResponse`: what the auth endpoints return

pub mod auth;
pub mod user;

pub use auth::{AuthResponse, LoginRequest, MeResponse, RegisterRequest};
pub use user::User;
