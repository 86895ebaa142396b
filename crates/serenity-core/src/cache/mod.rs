//! Durable client-side storage for the session credential.
//!
//! The cache holds exactly two slots: the raw access token and the user
//! record serialized as JSON. Backends are thin and synchronous; ordering
//! and pairing of the two slots is the session store's job.
//!
//! - `FileCache`: one file per slot under the cache directory
//! - `KeyringCache`: OS credential store via `keyring`
//! - `MemoryCache`: process-local, for tests and throwaway sessions

pub mod file;
pub mod keyring;
pub mod memory;

pub use self::file::FileCache;
pub use self::keyring::KeyringCache;
pub use self::memory::MemoryCache;

use thiserror::Error;

macro_rules! key_prefix {
    () => {
        "serenity_"
    };
}

/// Prefix shared by every storage key so the slots cannot collide with
/// unrelated data in the same storage area.
pub const KEY_PREFIX: &str = key_prefix!();

/// The two logical keys of the credential cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Token,
    User,
}

impl Slot {
    pub const ALL: [Slot; 2] = [Slot::Token, Slot::User];

    pub fn key(self) -> &'static str {
        match self {
            Slot::Token => concat!(key_prefix!(), "token"),
            Slot::User => concat!(key_prefix!(), "user"),
        }
    }
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to write {key}: {source}")]
    Io {
        key: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Keyring error: {0}")]
    Keyring(#[from] ::keyring::Error),
}

/// Key-value storage with the three operations the session store relies on.
pub trait CredentialCache: Send + Sync {
    /// Never fails. Anything unreadable is reported as absent.
    fn read(&self, slot: Slot) -> Option<String>;

    /// Best-effort durable write. Failures must reach the caller.
    fn write(&self, slot: Slot, value: &str) -> Result<(), CacheError>;

    /// Idempotent and infallible.
    fn remove(&self, slot: Slot);
}
