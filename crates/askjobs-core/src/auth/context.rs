use std::sync::Arc;

use super::{AccessGuard, CredentialStorage, MemoryStorage, ReissueCoordinator, SessionState, TokenStore};
use crate::api::{AuthorizedRequestExecutor, Transport};

/// One session's worth of auth collaborators, sharing a single token store.
/// Clone is cheap; all parts are reference counted.
#[derive(Clone)]
pub struct AuthContext {
    session: SessionState,
    store: Arc<TokenStore>,
    reissuer: Arc<ReissueCoordinator>,
    executor: Arc<AuthorizedRequestExecutor>,
    guard: AccessGuard,
}

impl AuthContext {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_storage(transport, Box::new(MemoryStorage::new()))
    }

    pub fn with_storage(transport: Arc<dyn Transport>, storage: Box<dyn CredentialStorage>) -> Self {
        let session = SessionState::new();
        let store = Arc::new(TokenStore::with_storage(session.clone(), storage));
        let reissuer = Arc::new(ReissueCoordinator::new(Arc::clone(&transport), Arc::clone(&store)));
        let executor = Arc::new(AuthorizedRequestExecutor::new(
            transport,
            Arc::clone(&store),
            Arc::clone(&reissuer),
        ));
        let guard = AccessGuard::new(session.clone());

        Self {
            session,
            store,
            reissuer,
            executor,
            guard,
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Writes go through `ApiClient` login/logout and the executor only.
    pub(crate) fn store(&self) -> &TokenStore {
        &self.store
    }

    pub fn reissuer(&self) -> &ReissueCoordinator {
        &self.reissuer
    }

    pub fn executor(&self) -> &AuthorizedRequestExecutor {
        &self.executor
    }

    pub fn guard(&self) -> &AccessGuard {
        &self.guard
    }
}
