//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: which
//! API to talk to, where the session is persisted, how a rejected
//! credential is handled, and the last used username.
//!
//! Configuration is stored at `~/.config/serenity/config.json`. The API base
//! URL can be overridden with `SERENITY_API_BASE_URL`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::UnauthorizedPolicy;
use crate::cache::{CredentialCache, FileCache, KeyringCache, MemoryCache};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "serenity";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding `api_base_url`
pub const BASE_URL_ENV: &str = "SERENITY_API_BASE_URL";

const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";

/// Request timeout. Long enough for a slow server, short enough that a dead
/// one is noticed.
const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Where the session credential is persisted between runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Plain files in the user cache directory
    #[default]
    File,
    /// The OS keychain
    Keyring,
    /// Nothing is persisted; every run starts logged out
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub timeout_secs: u64,
    pub storage: StorageBackend,
    pub unauthorized_policy: UnauthorizedPolicy,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            storage: StorageBackend::default(),
            unauthorized_policy: UnauthorizedPolicy::default(),
            last_username: None,
        }
    }
}

impl Config {
    /// Load from disk (defaults if absent), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        Ok(config.with_env_overrides(|key| std::env::var(key).ok()))
    }

    /// Apply overrides from `lookup`, normally the process environment.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(BASE_URL_ENV).filter(|u| !u.trim().is_empty()) {
            debug!(url = %url, "API base URL overridden from environment");
            self.api_base_url = url;
        }
        self
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Open the credential cache selected by `storage`.
    pub fn open_credential_cache(&self) -> Result<Arc<dyn CredentialCache>> {
        let cache: Arc<dyn CredentialCache> = match self.storage {
            StorageBackend::File => {
                let dir = self.cache_dir()?;
                Arc::new(FileCache::new(dir).context("Failed to open credential cache directory")?)
            }
            StorageBackend::Keyring => Arc::new(KeyringCache::new()),
            StorageBackend::Memory => Arc::new(MemoryCache::new()),
        };
        Ok(cache)
    }
}
