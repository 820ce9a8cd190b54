//! Observable session state derived from the stored credential.
//!
//! `SessionState` is the only place that decides whether the user is logged
//! in. It is recomputed by `TokenStore` on every `set`/`clear`, and every
//! observer (greeting, menu, guards) reads the same snapshot.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::debug;

use super::{ClaimsDecoder, Credential};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub member_index: i64,
    /// From the token's `exp` claim. Display only; the server decides expiry.
    pub expires_at: DateTime<Utc>,
}

impl Identity {
    pub fn minutes_until_expiry(&self) -> i64 {
        (self.expires_at - Utc::now()).num_minutes().max(0)
    }
}

/// Point-in-time view of the session.
///
/// Identity is present iff the session is authenticated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    identity: Option<Identity>,
}

impl SessionSnapshot {
    pub fn unauthenticated() -> Self {
        Self { identity: None }
    }

    pub fn authenticated(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    pub fn member_index(&self) -> Option<i64> {
        self.identity.as_ref().map(|i| i.member_index)
    }

    pub fn username(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.username.as_str())
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    fn derive(credential: Option<&Credential>) -> Self {
        let Some(credential) = credential else {
            return Self::unauthenticated();
        };
        match ClaimsDecoder::decode(credential.as_str()) {
            Ok(claims) => Self::authenticated(Identity {
                username: claims.username,
                member_index: claims.member_index,
                expires_at: claims.expires_at,
            }),
            Err(e) => {
                debug!(error = %e, "Credential did not decode, treating session as unauthenticated");
                Self::unauthenticated()
            }
        }
    }
}

/// Handle returned by [`SessionState::on_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&SessionSnapshot) + Send + Sync>;

struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, Listener)>,
}

struct Inner {
    tx: watch::Sender<SessionSnapshot>,
    listeners: Mutex<Listeners>,
}

/// Shared, clonable session handle.
#[derive(Clone)]
pub struct SessionState {
    inner: Arc<Inner>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot::unauthenticated());
        Self {
            inner: Arc::new(Inner {
                tx,
                listeners: Mutex::new(Listeners {
                    next_id: 0,
                    entries: Vec::new(),
                }),
            }),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.tx.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.tx.borrow().is_authenticated()
    }

    pub fn member_index(&self) -> Option<i64> {
        self.inner.tx.borrow().member_index()
    }

    pub fn username(&self) -> Option<String> {
        self.inner.tx.borrow().username().map(str::to_string)
    }

    /// Async observers: the receiver yields every committed snapshot.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.tx.subscribe()
    }

    /// Register a callback invoked synchronously after each change.
    ///
    /// Callbacks run with no lock held, so they may write to the token store
    /// or register further listeners.
    pub fn on_change<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&SessionSnapshot) + Send + Sync + 'static,
    {
        let mut listeners = self.lock_listeners();
        let id = ListenerId(listeners.next_id);
        listeners.next_id += 1;
        listeners.entries.push((id, Arc::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock_listeners();
        let before = listeners.entries.len();
        listeners.entries.retain(|(entry_id, _)| *entry_id != id);
        listeners.entries.len() != before
    }

    /// Re-derive the snapshot from `credential`. Called only by `TokenStore`,
    /// which delivers the returned change once its write lock is released.
    #[must_use]
    pub(crate) fn recompute(&self, credential: Option<&Credential>) -> Option<SessionChange> {
        let next = SessionSnapshot::derive(credential);
        let changed = self.inner.tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next.clone();
                true
            }
        });

        if !changed {
            return None;
        }

        debug!(
            authenticated = next.is_authenticated(),
            member_index = ?next.member_index(),
            "Session state changed"
        );
        let listeners = self
            .lock_listeners()
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        Some(SessionChange {
            snapshot: next,
            listeners,
        })
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, Listeners> {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// A committed snapshot not yet shown to the `on_change` listeners.
pub(crate) struct SessionChange {
    snapshot: SessionSnapshot,
    listeners: Vec<Listener>,
}

impl SessionChange {
    pub(crate) fn deliver(self) {
        for listener in &self.listeners {
            listener(&self.snapshot);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
