use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::{CredentialCache, Slot};
use crate::models::User;

use super::{AccessToken, SessionError};

/// A user together with the credential that authenticates them.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSession {
    pub user: User,
    pub token: AccessToken,
}

/// The in-memory session. Either both user and token are present or
/// neither is; there is no way to hold one without the other.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session(Option<ActiveSession>);

impl Session {
    pub fn empty() -> Self {
        Self(None)
    }

    pub fn active(user: User, token: AccessToken) -> Self {
        Self(Some(ActiveSession { user, token }))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn user(&self) -> Option<&User> {
        self.0.as_ref().map(|s| &s.user)
    }

    pub fn token(&self) -> Option<&AccessToken> {
        self.0.as_ref().map(|s| &s.token)
    }

    pub fn as_active(&self) -> Option<&ActiveSession> {
        self.0.as_ref()
    }
}

/// What observers see: the session plus the status of the last auth call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub session: Session,
    pub loading: bool,
    pub last_error: Option<String>,
}

/// Result of [`SessionStore::set_session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    /// Persisted, verified and now current.
    Applied,
    /// The token was empty or malformed; nothing changed.
    Rejected,
}

/// Single source of truth for the current session.
///
/// Every change goes through `set_session` or `clear_session`, which keep
/// the credential cache and memory in step: storage is written and read
/// back before memory changes, so no observer can see a session that is not
/// yet durable.
pub struct SessionStore {
    cache: Arc<dyn CredentialCache>,
    state: watch::Sender<SessionState>,
    // Serializes write -> verify -> commit against other mutations.
    write_lock: Mutex<()>,
}

impl SessionStore {
    /// Build the store from whatever the cache holds.
    ///
    /// Anything short of a well-formed token plus a parseable user record
    /// yields an empty session. Nothing here is an error.
    pub fn hydrate(cache: Arc<dyn CredentialCache>) -> Self {
        let session = Self::load_persisted(cache.as_ref());
        match session.user() {
            Some(user) => info!(user = %user.display_name(), "Restored persisted session"),
            None => debug!("No persisted session"),
        }

        let (state, _) = watch::channel(SessionState {
            session,
            ..Default::default()
        });

        Self {
            cache,
            state,
            write_lock: Mutex::new(()),
        }
    }

    fn load_persisted(cache: &dyn CredentialCache) -> Session {
        let raw_token = cache.read(Slot::Token);
        let raw_user = cache.read(Slot::User);

        let token = match AccessToken::parse_opt(raw_token.as_deref()) {
            Some(token) => token,
            None => {
                if raw_token.is_some() {
                    warn!("Ignoring persisted token with unexpected format");
                }
                return Session::empty();
            }
        };

        match raw_user.as_deref().and_then(User::from_json) {
            Some(user) => Session::active(user, token),
            None => {
                warn!(
                    user_slot_present = raw_user.is_some(),
                    "Persisted token has no usable user record"
                );
                Session::empty()
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // The guarded section holds no data, so a poisoned lock is still usable.
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make `(user, token)` the current session.
    ///
    /// Both slots are written, then read back and compared byte for byte.
    /// Memory only changes once the read-back matches. A storage failure or
    /// a mismatch is returned and leaves the in-memory session as it was.
    pub fn set_session(&self, user: User, token: &str) -> Result<Commit, SessionError> {
        let Some(token) = AccessToken::parse(token) else {
            warn!("Refusing to set session without a usable access token");
            return Ok(Commit::Rejected);
        };
        let user_json = user.to_json()?;

        let _guard = self.lock();
        self.persist_and_commit(user, token, &user_json)?;
        Ok(Commit::Applied)
    }

    /// Replace the user record, but only while `token` is still the current
    /// credential. Returns `false` without touching anything if the session
    /// was cleared or replaced in the meantime.
    pub(crate) fn update_user(&self, user: User, token: &AccessToken) -> Result<bool, SessionError> {
        let user_json = user.to_json()?;

        let _guard = self.lock();
        if !self.holds(token) {
            debug!("Session changed underneath user refresh, dropping result");
            return Ok(false);
        }
        self.persist_and_commit(user, token.clone(), &user_json)?;
        Ok(true)
    }

    /// Rewrite storage for a session whose slots vanished after a verified
    /// commit. Does nothing unless `token` is still the current credential
    /// and its slot is actually missing, so a deliberate clear stays cleared.
    ///
    /// Returns whether a rewrite happened.
    pub(crate) fn repair_if_current(&self, user: &User, token: &AccessToken) -> Result<bool, SessionError> {
        let user_json = user.to_json()?;

        let _guard = self.lock();
        if !self.holds(token) {
            debug!("Session no longer current, skipping storage repair");
            return Ok(false);
        }
        if self.cache.read(Slot::Token).as_deref() == Some(token.expose()) {
            return Ok(false);
        }

        warn!("Persisted token missing after commit, rewriting session");
        self.write_pair(token, &user_json)?;
        Ok(true)
    }

    /// Caller must hold the write lock.
    fn holds(&self, token: &AccessToken) -> bool {
        self.state.borrow().session.token() == Some(token)
    }

    /// Caller must hold the write lock.
    fn persist_and_commit(&self, user: User, token: AccessToken, user_json: &str) -> Result<(), SessionError> {
        self.remove_pair();

        if let Err(e) = self.write_and_verify(&token, user_json) {
            // Never leave half a pair, or an unverified pair, behind.
            self.remove_pair();
            return Err(e);
        }

        info!(user = %user.display_name(), "Session established");
        self.state.send_modify(|state| {
            state.session = Session::active(user, token);
        });
        Ok(())
    }

    fn remove_pair(&self) {
        for slot in Slot::ALL {
            self.cache.remove(slot);
        }
    }

    fn write_pair(&self, token: &AccessToken, user_json: &str) -> Result<(), SessionError> {
        self.cache.write(Slot::Token, token.expose())?;
        self.cache.write(Slot::User, user_json)?;
        Ok(())
    }

    fn write_and_verify(&self, token: &AccessToken, user_json: &str) -> Result<(), SessionError> {
        self.write_pair(token, user_json)?;

        if self.cache.read(Slot::Token).as_deref() != Some(token.expose()) {
            warn!("Token slot verification failed");
            return Err(SessionError::VerificationFailed(Slot::Token.key()));
        }
        if self.cache.read(Slot::User).as_deref() != Some(user_json) {
            warn!("User slot verification failed");
            return Err(SessionError::VerificationFailed(Slot::User.key()));
        }
        Ok(())
    }

    /// Drop the session from memory and storage. Safe to call repeatedly.
    pub fn clear_session(&self) {
        let _guard = self.lock();
        let was_active = !self.state.borrow().session.is_empty();

        self.state.send_modify(|state| {
            state.session = Session::empty();
        });
        self.remove_pair();

        if was_active {
            info!("Session cleared");
        }
    }

    pub(crate) fn begin_request(&self) {
        self.state.send_modify(|state| {
            state.loading = true;
            state.last_error = None;
        });
    }

    pub(crate) fn finish_request(&self, error: Option<String>) {
        self.state.send_modify(|state| {
            state.loading = false;
            state.last_error = error;
        });
    }

    /// Watch for session and status changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn session(&self) -> Session {
        self.state.borrow().session.clone()
    }

    pub fn current_token(&self) -> Option<AccessToken> {
        self.state.borrow().session.token().cloned()
    }

    pub fn current_user(&self) -> Option<User> {
        self.state.borrow().session.user().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        !self.state.borrow().session.is_empty()
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.borrow().last_error.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheError, MemoryCache};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn user(id: i64, name: &str) -> User {
        User::from_value(json!({"id": id, "name": name})).unwrap()
    }

    fn store_with(cache: Arc<dyn CredentialCache>) -> SessionStore {
        SessionStore::hydrate(cache)
    }

    fn assert_paired(store: &SessionStore) {
        let session = store.session();
        assert_eq!(session.user().is_none(), session.token().is_none());
    }

    /// Fails every write while `fail` is set.
    #[derive(Default)]
    struct FlakyCache {
        inner: MemoryCache,
        fail: AtomicBool,
    }

    impl CredentialCache for FlakyCache {
        fn read(&self, slot: Slot) -> Option<String> {
            self.inner.read(slot)
        }

        fn write(&self, slot: Slot, value: &str) -> Result<(), CacheError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(CacheError::Unavailable("quota exceeded".to_string()));
            }
            self.inner.write(slot, value)
        }

        fn remove(&self, slot: Slot) {
            self.inner.remove(slot)
        }
    }

    /// Accepts writes but stores something else for the user slot.
    #[derive(Default)]
    struct CorruptingCache {
        inner: MemoryCache,
    }

    impl CredentialCache for CorruptingCache {
        fn read(&self, slot: Slot) -> Option<String> {
            self.inner.read(slot)
        }

        fn write(&self, slot: Slot, value: &str) -> Result<(), CacheError> {
            match slot {
                Slot::User => self.inner.write(slot, "{}"),
                Slot::Token => self.inner.write(slot, value),
            }
        }

        fn remove(&self, slot: Slot) {
            self.inner.remove(slot)
        }
    }

    #[test]
    fn test_set_session_commits_and_persists() {
        let cache = Arc::new(MemoryCache::new());
        let store = store_with(cache.clone());

        let commit = store.set_session(user(1, "A"), "eyJabc").unwrap();

        assert_eq!(commit, Commit::Applied);
        assert_eq!(store.current_user(), Some(user(1, "A")));
        assert_eq!(store.current_token().unwrap().expose(), "eyJabc");
        assert_eq!(cache.read(Slot::Token).as_deref(), Some("eyJabc"));
        let persisted_user = User::from_json(&cache.read(Slot::User).unwrap()).unwrap();
        assert_eq!(persisted_user, user(1, "A"));
    }

    #[test]
    fn test_set_session_with_empty_token_is_noop() {
        let cache = Arc::new(MemoryCache::new());
        let store = store_with(cache.clone());
        store.set_session(user(1, "A"), "eyJabc").unwrap();

        let commit = store.set_session(user(2, "B"), "").unwrap();

        assert_eq!(commit, Commit::Rejected);
        assert_eq!(store.current_user(), Some(user(1, "A")));
        assert_eq!(cache.read(Slot::Token).as_deref(), Some("eyJabc"));
    }

    #[test]
    fn test_set_session_with_malformed_token_is_noop() {
        let store = store_with(Arc::new(MemoryCache::new()));

        assert_eq!(store.set_session(user(1, "A"), "garbage").unwrap(), Commit::Rejected);
        assert!(!store.is_authenticated());
        assert_paired(&store);
    }

    #[test]
    fn test_write_failure_leaves_memory_untouched() {
        let cache = Arc::new(FlakyCache::default());
        let store = store_with(cache.clone());
        store.set_session(user(1, "A"), "eyJfirst").unwrap();

        cache.fail.store(true, Ordering::SeqCst);
        let err = store.set_session(user(2, "B"), "eyJsecond").unwrap_err();

        assert!(matches!(err, SessionError::Persistence(CacheError::Unavailable(_))));
        assert_eq!(store.current_user(), Some(user(1, "A")));
        assert_eq!(store.current_token().unwrap().expose(), "eyJfirst");
        assert_eq!(cache.read(Slot::Token), None);
        assert_eq!(cache.read(Slot::User), None);
    }

    #[test]
    fn test_verification_mismatch_is_an_error() {
        let cache = Arc::new(CorruptingCache::default());
        let store = store_with(cache.clone());

        let err = store.set_session(user(1, "A"), "eyJabc").unwrap_err();

        assert!(matches!(err, SessionError::VerificationFailed("serenity_user")));
        assert!(!store.is_authenticated());
        assert_eq!(cache.read(Slot::Token), None);
        assert_eq!(cache.read(Slot::User), None);
    }

    #[test]
    fn test_hydrate_round_trip() {
        let cache: Arc<dyn CredentialCache> = Arc::new(MemoryCache::new());
        store_with(cache.clone())
            .set_session(user(1, "A"), "eyJabc")
            .unwrap();

        let restored = store_with(cache);

        assert_eq!(restored.current_user(), Some(user(1, "A")));
        assert_eq!(restored.current_token().unwrap().expose(), "eyJabc");
    }

    #[test]
    fn test_hydrate_rejects_garbage_token() {
        let cache = Arc::new(MemoryCache::new());
        cache.write(Slot::Token, "garbage").unwrap();
        cache.write(Slot::User, r#"{"id":1,"name":"A"}"#).unwrap();

        let store = store_with(cache);

        assert!(!store.is_authenticated());
        assert_paired(&store);
    }

    #[test]
    fn test_hydrate_rejects_half_pairs() {
        let token_only = Arc::new(MemoryCache::new());
        token_only.write(Slot::Token, "eyJabc").unwrap();
        assert!(!store_with(token_only).is_authenticated());

        let user_only = Arc::new(MemoryCache::new());
        user_only.write(Slot::User, r#"{"id":1}"#).unwrap();
        assert!(!store_with(user_only).is_authenticated());

        let null_user = Arc::new(MemoryCache::new());
        null_user.write(Slot::Token, "eyJabc").unwrap();
        null_user.write(Slot::User, "null").unwrap();
        assert!(!store_with(null_user).is_authenticated());

        let broken_user = Arc::new(MemoryCache::new());
        broken_user.write(Slot::Token, "eyJabc").unwrap();
        broken_user.write(Slot::User, "{\"id\":").unwrap();
        assert!(!store_with(broken_user).is_authenticated());
    }

    #[test]
    fn test_clear_session_twice() {
        let cache = Arc::new(MemoryCache::new());
        let store = store_with(cache.clone());
        store.set_session(user(1, "A"), "eyJabc").unwrap();

        for _ in 0..2 {
            store.clear_session();
            assert!(!store.is_authenticated());
            assert_paired(&store);
            assert_eq!(cache.read(Slot::Token), None);
            assert_eq!(cache.read(Slot::User), None);
        }
    }

    #[test]
    fn test_observers_only_see_paired_states() {
        let store = store_with(Arc::new(MemoryCache::new()));
        let mut rx = store.subscribe();
        assert!(!rx.has_changed().unwrap());

        store.set_session(user(1, "A"), "eyJabc").unwrap();
        assert!(rx.has_changed().unwrap());
        {
            let state = rx.borrow_and_update();
            assert_eq!(state.session.user(), Some(&user(1, "A")));
            assert!(state.session.token().is_some());
        }

        store.clear_session();
        let state = rx.borrow_and_update();
        assert!(state.session.user().is_none());
        assert!(state.session.token().is_none());
    }

    #[test]
    fn test_rejected_set_session_does_not_notify() {
        let store = store_with(Arc::new(MemoryCache::new()));
        let rx = store.subscribe();

        store.set_session(user(1, "A"), "").unwrap();

        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_repair_rewrites_missing_slots() {
        let cache = Arc::new(MemoryCache::new());
        let store = store_with(cache.clone());
        store.set_session(user(1, "A"), "eyJabc").unwrap();
        let token = store.current_token().unwrap();

        cache.remove(Slot::Token);
        assert!(store.repair_if_current(&user(1, "A"), &token).unwrap());

        assert_eq!(cache.read(Slot::Token).as_deref(), Some("eyJabc"));
        assert!(cache.read(Slot::User).is_some());
        assert_eq!(store.current_user(), Some(user(1, "A")));

        // Intact storage needs no rewrite.
        assert!(!store.repair_if_current(&user(1, "A"), &token).unwrap());
    }

    #[test]
    fn test_repair_after_clear_keeps_session_cleared() {
        let cache = Arc::new(MemoryCache::new());
        let store = store_with(cache.clone());
        store.set_session(user(1, "A"), "eyJabc").unwrap();
        let token = store.current_token().unwrap();

        store.clear_session();
        assert!(!store.repair_if_current(&user(1, "A"), &token).unwrap());

        assert!(!store.is_authenticated());
        assert_eq!(cache.read(Slot::Token), None);
        assert_eq!(cache.read(Slot::User), None);
    }

    #[test]
    fn test_repair_ignores_superseded_token() {
        let cache = Arc::new(MemoryCache::new());
        let store = store_with(cache.clone());
        store.set_session(user(1, "A"), "eyJold").unwrap();
        let old = store.current_token().unwrap();
        store.set_session(user(2, "B"), "eyJnew").unwrap();

        assert!(!store.repair_if_current(&user(1, "A"), &old).unwrap());

        assert_eq!(store.current_user(), Some(user(2, "B")));
        assert_eq!(cache.read(Slot::Token).as_deref(), Some("eyJnew"));
    }

    #[test]
    fn test_update_user_requires_same_token() {
        let cache = Arc::new(MemoryCache::new());
        let store = store_with(cache.clone());
        store.set_session(user(1, "A"), "eyJabc").unwrap();
        let token = store.current_token().unwrap();

        assert!(store.update_user(user(1, "Renamed"), &token).unwrap());
        assert_eq!(store.current_user(), Some(user(1, "Renamed")));

        store.clear_session();
        assert!(!store.update_user(user(1, "Late"), &token).unwrap());
        assert!(!store.is_authenticated());
        assert_eq!(cache.read(Slot::Token), None);
        assert_eq!(cache.read(Slot::User), None);
    }

    #[test]
    fn test_request_status_fields() {
        let store = store_with(Arc::new(MemoryCache::new()));
        store.begin_request();
        assert!(store.snapshot().loading);

        store.finish_request(Some("Login failed".to_string()));
        let state = store.snapshot();
        assert!(!state.loading);
        assert_eq!(state.last_error.as_deref(), Some("Login failed"));

        store.begin_request();
        assert_eq!(store.last_error(), None);
    }
}
