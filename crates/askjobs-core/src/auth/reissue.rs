//! Single-flight access token reissue.
//!
//! However many requests discover an expired token at once, one `POST
//! /reissue` goes out and every caller receives its outcome. The new
//! credential is committed to the `TokenStore` before any caller resumes.
//!
//! A failed reissue ends the session, and an ended session stays ended: an
//! expiry that arrives after the store was cleared fails without a call, and
//! a reissue that completes after a logout is discarded.

use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use super::{Credential, ReissueError, TokenStore};
use crate::api::{ApiRequest, Transport};

/// Reissue endpoint. Relies on the refresh cookie held by the transport.
pub const REISSUE_PATH: &str = "/reissue";

type PendingReissue = Shared<BoxFuture<'static, Result<Credential, ReissueError>>>;

pub struct ReissueCoordinator {
    transport: Arc<dyn Transport>,
    store: Arc<TokenStore>,
    in_flight: Mutex<Option<PendingReissue>>,
}

impl ReissueCoordinator {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<TokenStore>) -> Self {
        Self {
            transport,
            store,
            in_flight: Mutex::new(None),
        }
    }

    /// Obtain a fresh credential, joining an in-flight reissue if one exists.
    ///
    /// Does not clear the store on failure and never retries.
    pub async fn reissue(&self) -> Result<Credential, ReissueError> {
        let pending = {
            let mut slot = self.lock_slot();
            self.join_or_start(&mut slot)
        };
        self.await_pending(pending).await
    }

    /// Like [`reissue`](Self::reissue), for a request that was rejected with
    /// `stale`. When no reissue is in flight:
    ///
    /// - `stale` already replaced (another caller reissued): the current
    ///   credential is returned without a network call;
    /// - store empty (session ended meanwhile): `SessionEnded`, no call.
    pub async fn reissue_replacing(&self, stale: &Credential) -> Result<Credential, ReissueError> {
        let pending = {
            let mut slot = self.lock_slot();
            if slot.is_none() {
                match self.store.get() {
                    None => {
                        debug!("Session already ended, not reissuing");
                        return Err(ReissueError::SessionEnded);
                    }
                    Some(current) if current != *stale => {
                        debug!("Credential already replaced, skipping reissue");
                        return Ok(current);
                    }
                    Some(_) => {}
                }
            }
            self.join_or_start(&mut slot)
        };
        self.await_pending(pending).await
    }

    pub fn is_in_flight(&self) -> bool {
        self.lock_slot().is_some()
    }

    fn join_or_start(&self, slot: &mut Option<PendingReissue>) -> PendingReissue {
        if let Some(pending) = slot.as_ref() {
            debug!("Joining in-flight reissue");
            return pending.clone();
        }

        let generation = self.store.generation();
        let pending = Self::perform(Arc::clone(&self.transport), Arc::clone(&self.store), generation)
            .boxed()
            .shared();
        *slot = Some(pending.clone());
        pending
    }

    async fn await_pending(&self, pending: PendingReissue) -> Result<Credential, ReissueError> {
        let outcome = pending.clone().await;

        let mut slot = self.lock_slot();
        if slot.as_ref().is_some_and(|p| p.ptr_eq(&pending)) {
            *slot = None;
        }
        outcome
    }

    async fn perform(
        transport: Arc<dyn Transport>,
        store: Arc<TokenStore>,
        generation: u64,
    ) -> Result<Credential, ReissueError> {
        info!("Reissuing access token");

        let response = transport
            .send(&ApiRequest::post(REISSUE_PATH), None)
            .await
            .map_err(|e| {
                warn!(error = %e, "Reissue request failed");
                ReissueError::Network(e.to_string())
            })?;

        if !response.is_success() {
            let status = response.status().as_u16();
            warn!(status, "Server denied reissue");
            return Err(ReissueError::Denied { status });
        }

        let credential = response.issued_credential().ok_or_else(|| {
            warn!("Reissue response carried no credential");
            ReissueError::MissingCredential
        })?;

        if !store.set_if_generation(credential.clone(), generation) {
            warn!("Session changed while reissuing, discarding new token");
            return Err(ReissueError::SessionEnded);
        }
        info!("Access token reissued");
        Ok(credential)
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, Option<PendingReissue>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// Tests
// ============================================================================
