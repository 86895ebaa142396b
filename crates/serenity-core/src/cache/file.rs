use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{CacheError, CredentialCache, Slot};

/// Stores each slot as its own file inside `cache_dir`.
///
/// Writes land in a temporary sibling file that is renamed over the slot, so
/// a reader sees either the previous value or the new one, never a torn write.
pub struct FileCache {
    cache_dir: PathBuf,
}

impl FileCache {
    pub fn new(cache_dir: PathBuf) -> Result<Self, CacheError> {
        fs::create_dir_all(&cache_dir).map_err(|source| CacheError::Io {
            key: "cache directory",
            source,
        })?;
        Ok(Self { cache_dir })
    }

    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    fn slot_path(&self, slot: Slot) -> PathBuf {
        self.cache_dir.join(slot.key())
    }

    fn temp_path(&self, slot: Slot) -> PathBuf {
        self.cache_dir.join(format!(".{}.tmp", slot.key()))
    }

    fn write_temp(path: &Path, value: &str) -> io::Result<()> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path)?;
        file.write_all(value.as_bytes())?;
        file.sync_all()
    }
}

impl CredentialCache for FileCache {
    fn read(&self, slot: Slot) -> Option<String> {
        match fs::read_to_string(self.slot_path(slot)) {
            Ok(contents) => Some(contents),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                debug!(key = slot.key(), error = %e, "Unreadable credential slot");
                None
            }
        }
    }

    fn write(&self, slot: Slot, value: &str) -> Result<(), CacheError> {
        let temp = self.temp_path(slot);
        let io_err = |source: io::Error| CacheError::Io {
            key: slot.key(),
            source,
        };

        Self::write_temp(&temp, value).map_err(io_err)?;
        if let Err(e) = fs::rename(&temp, self.slot_path(slot)) {
            let _ = fs::remove_file(&temp);
            return Err(io_err(e));
        }
        Ok(())
    }

    fn remove(&self, slot: Slot) {
        match fs::remove_file(self.slot_path(slot)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(key = slot.key(), error = %e, "Failed to remove credential slot"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> (tempfile::TempDir, FileCache) {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = FileCache::new(dir.path().join("serenity")).expect("file cache");
        (dir, cache)
    }

    #[test]
    fn test_read_missing_slot_is_absent() {
        let (_dir, cache) = cache();
        assert_eq!(cache.read(Slot::Token), None);
        assert_eq!(cache.read(Slot::User), None);
    }

    #[test]
    fn test_write_then_read() {
        let (_dir, cache) = cache();
        cache.write(Slot::Token, "eyJabc").unwrap();
        cache.write(Slot::User, r#"{"id":1}"#).unwrap();
        assert_eq!(cache.read(Slot::Token).as_deref(), Some("eyJabc"));
        assert_eq!(cache.read(Slot::User).as_deref(), Some(r#"{"id":1}"#));
    }

    #[test]
    fn test_write_overwrites_and_leaves_no_temp_file() {
        let (_dir, cache) = cache();
        cache.write(Slot::Token, "eyJfirst").unwrap();
        cache.write(Slot::Token, "eyJsecond").unwrap();
        assert_eq!(cache.read(Slot::Token).as_deref(), Some("eyJsecond"));
        assert!(!cache.temp_path(Slot::Token).exists());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (_dir, cache) = cache();
        cache.write(Slot::User, "{}").unwrap();
        cache.remove(Slot::User);
        cache.remove(Slot::User);
        assert_eq!(cache.read(Slot::User), None);
    }

    #[test]
    fn test_write_fails_when_directory_is_gone() {
        let (_dir, cache) = cache();
        fs::remove_dir_all(cache.dir()).unwrap();
        let err = cache.write(Slot::Token, "eyJabc").unwrap_err();
        assert!(matches!(err, CacheError::Io { key: "serenity_token", .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_slot_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, cache) = cache();
        cache.write(Slot::Token, "eyJabc").unwrap();
        let mode = fs::metadata(cache.slot_path(Slot::Token)).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
