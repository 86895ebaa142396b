//! Core library for serenity.
//!
//! Keeps a user logged in to the Serenity API across restarts and makes
//! sure every outgoing request carries the current credential, and only a
//! valid one.
//!
//! ```no_run
//! use std::sync::Arc;
//! use serenity_core::{Config, LoginRequest, MemoryCache, SessionManager};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::default();
//! let manager = SessionManager::from_config(&config, Arc::new(MemoryCache::new()))?;
//! manager.login(&LoginRequest::new("jdoe", "secret1")).await?;
//! let me: serde_json::Value = manager.api().get("/auth/me").await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, UnauthorizedPolicy};
pub use auth::{
    AccessToken, AuthError, Commit, Session, SessionError, SessionManager, SessionState,
    SessionStore,
};
pub use cache::{CacheError, CredentialCache, FileCache, KeyringCache, MemoryCache, Slot};
pub use config::{Config, StorageBackend};
pub use models::{AuthResponse, LoginRequest, RegisterRequest, User};
