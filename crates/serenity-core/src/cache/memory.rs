use std::collections::HashMap;
use std::sync::Mutex;

use super::{CacheError, CredentialCache, Slot};

/// Process-local slots. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryCache {
    slots: Mutex<HashMap<Slot, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Slot, String>>, CacheError> {
        self.slots
            .lock()
            .map_err(|_| CacheError::Unavailable("memory cache lock poisoned".to_string()))
    }
}

impl CredentialCache for MemoryCache {
    fn read(&self, slot: Slot) -> Option<String> {
        self.lock().ok().and_then(|slots| slots.get(&slot).cloned())
    }

    fn write(&self, slot: Slot, value: &str) -> Result<(), CacheError> {
        self.lock()?.insert(slot, value.to_string());
        Ok(())
    }

    fn remove(&self, slot: Slot) {
        if let Ok(mut slots) = self.lock() {
            slots.remove(&slot);
        }
    }
}
