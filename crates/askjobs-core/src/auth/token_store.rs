//! Holder of the current access token for the lifetime of the session.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use super::session::SessionChange;
use super::SessionState;

/// Opaque bearer credential issued by the server.
///
/// Cheap to clone. A new credential replaces the old one; it is never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(Arc<str>);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Arc::from(token.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Credential {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Credential {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(<{} bytes>)", self.0.len())
    }
}

/// Backing slot for the credential.
///
/// Implementations must be session-scoped: nothing stored here may outlive
/// the process.
pub trait CredentialStorage: Send + Sync {
    fn load(&self) -> Option<Credential>;
    fn store(&self, credential: Credential);
    fn remove(&self);
}

#[derive(Default)]
pub struct MemoryStorage {
    slot: Mutex<Option<Credential>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStorage for MemoryStorage {
    fn load(&self) -> Option<Credential> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn store(&self, credential: Credential) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(credential);
    }

    fn remove(&self) {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

pub struct TokenStore {
    storage: Box<dyn CredentialStorage>,
    session: SessionState,
    /// Serializes writes so storage and session never disagree. Holds the
    /// write generation, bumped by every `set` and `clear`.
    write_lock: Mutex<u64>,
}

impl TokenStore {
    pub fn new(session: SessionState) -> Self {
        Self::with_storage(session, Box::new(MemoryStorage::new()))
    }

    pub fn with_storage(session: SessionState, storage: Box<dyn CredentialStorage>) -> Self {
        let store = Self {
            storage,
            session,
            write_lock: Mutex::new(0),
        };
        // Storage may already hold a credential.
        if let Some(change) = store.session.recompute(store.storage.load().as_ref()) {
            change.deliver();
        }
        store
    }

    /// Current credential, if any.
    pub fn get(&self) -> Option<Credential> {
        self.storage.load().filter(|c| !c.as_str().is_empty())
    }

    /// Replace the credential. The session is recomputed before this returns.
    pub fn set(&self, credential: Credential) {
        let change = {
            let mut generation = self.lock_writes();
            *generation += 1;
            self.commit(Some(credential))
        };
        if let Some(change) = change {
            change.deliver();
        }
    }

    /// Drop the credential. Safe to call repeatedly.
    pub fn clear(&self) {
        let change = {
            let mut generation = self.lock_writes();
            *generation += 1;
            self.commit(None)
        };
        if let Some(change) = change {
            change.deliver();
        }
    }

    /// Write generation; changes whenever the credential is set or cleared.
    pub(crate) fn generation(&self) -> u64 {
        *self.lock_writes()
    }

    /// Store `credential` only if nothing was written since `expected` was
    /// read. Returns whether it was stored.
    pub(crate) fn set_if_generation(&self, credential: Credential, expected: u64) -> bool {
        let change = {
            let mut generation = self.lock_writes();
            if *generation != expected {
                debug!(expected, current = *generation, "Credential changed meanwhile, discarding");
                return false;
            }
            *generation += 1;
            self.commit(Some(credential))
        };
        if let Some(change) = change {
            change.deliver();
        }
        true
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Caller holds the write lock. Listeners run after it is released.
    fn commit(&self, credential: Option<Credential>) -> Option<SessionChange> {
        match credential {
            Some(credential) => {
                debug!(?credential, "Storing credential");
                self.storage.store(credential.clone());
                self.session.recompute(Some(&credential))
            }
            None => {
                debug!("Clearing credential");
                self.storage.remove();
                self.session.recompute(None)
            }
        }
    }

    fn lock_writes(&self) -> std::sync::MutexGuard<'_, u64> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// Tests
// ============================================================================
