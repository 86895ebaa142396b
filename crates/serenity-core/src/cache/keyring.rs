use keyring::Entry;
use tracing::{debug, warn};

use super::{CacheError, CredentialCache, Slot};

const SERVICE_NAME: &str = "serenity-client";

/// Keeps both slots in the OS keychain, one entry per slot key.
pub struct KeyringCache {
    service: String,
}

impl KeyringCache {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    /// Use a separate keychain service, e.g. per deployment.
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn entry(&self, slot: Slot) -> keyring::Result<Entry> {
        Entry::new(&self.service, slot.key())
    }
}

impl Default for KeyringCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialCache for KeyringCache {
    fn read(&self, slot: Slot) -> Option<String> {
        match self.entry(slot).and_then(|entry| entry.get_password()) {
            Ok(value) => Some(value),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                debug!(key = slot.key(), error = %e, "Keychain read failed");
                None
            }
        }
    }

    fn write(&self, slot: Slot, value: &str) -> Result<(), CacheError> {
        let entry = self.entry(slot)?;
        entry.set_password(value)?;
        Ok(())
    }

    fn remove(&self, slot: Slot) {
        match self.entry(slot).and_then(|entry| entry.delete_credential()) {
            Ok(()) | Err(keyring::Error::NoEntry) => {}
            Err(e) => warn!(key = slot.key(), error = %e, "Failed to delete keychain entry"),
        }
    }
}
