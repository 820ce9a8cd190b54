//! Authorized request execution.
//!
//! Every protected call goes through [`AuthorizedRequestExecutor::execute`]:
//!
//! 1. no credential: fail with `Unauthenticated`, nothing is sent
//! 2. attach the credential and send
//! 3. anything but an expiry signal is returned unchanged
//! 4. on expiry, reissue (single-flight) and replay the request once
//! 5. if the reissue fails or the replay is also expired, clear the store and
//!    fail with `SessionExpired`
//! 6. if the session already ended while the request was in flight, fail
//!    with `SessionExpired` without reissuing
//!
//! At most one reissue and one replay happen per call.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{ApiRequest, ApiResponse, ExecutorError, Transport};
use crate::auth::{ReissueCoordinator, ReissueError, TokenStore};

pub struct AuthorizedRequestExecutor {
    transport: Arc<dyn Transport>,
    store: Arc<TokenStore>,
    reissuer: Arc<ReissueCoordinator>,
}

impl AuthorizedRequestExecutor {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<TokenStore>,
        reissuer: Arc<ReissueCoordinator>,
    ) -> Self {
        Self {
            transport,
            store,
            reissuer,
        }
    }

    pub async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, ExecutorError> {
        let Some(credential) = self.store.get() else {
            debug!(path = request.path(), "No credential, refusing protected call");
            return Err(ExecutorError::Unauthenticated);
        };

        let response = self.transport.send(request, Some(&credential)).await?;
        if !response.is_expired_credential() {
            return Ok(response);
        }

        info!(path = request.path(), "Access token expired, reissuing");
        let fresh = match self.reissuer.reissue_replacing(&credential).await {
            Ok(fresh) => fresh,
            Err(ReissueError::SessionEnded) => {
                // Whoever ended it already cleared the store; a newer login
                // must survive.
                info!(path = request.path(), "Session ended while this request was in flight");
                return Err(ExecutorError::SessionExpired);
            }
            Err(e) => {
                warn!(error = %e, path = request.path(), "Reissue failed, ending session");
                return Err(self.expire_session());
            }
        };

        let replay = self.transport.send(request, Some(&fresh)).await?;
        if replay.is_expired_credential() {
            warn!(path = request.path(), "Replay reported an expired token, ending session");
            return Err(self.expire_session());
        }

        debug!(path = request.path(), status = replay.status().as_u16(), "Replay completed");
        Ok(replay)
    }

    fn expire_session(&self) -> ExecutorError {
        self.store.clear();
        ExecutorError::SessionExpired
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::auth::claims::test_token;
    use crate::auth::reissue::REISSUE_PATH;
    use crate::auth::{Credential, SessionState};
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    const EXPIRED_BODY: &str = r#"{"error":"Access token expired"}"#;

    #[derive(Clone, Copy)]
    enum ReissueBehavior {
        Issue(i64),
        Deny,
        Unreachable,
    }

    /// Scripted server. Protected calls succeed only with an accepted token;
    /// `always_expired` makes every protected call report expiry.
    struct FakeServer {
        accepted: Mutex<Option<Credential>>,
        always_expired: bool,
        reissue: ReissueBehavior,
        reissue_calls: AtomicUsize,
        protected_calls: AtomicUsize,
        sent_credentials: Mutex<Vec<Option<Credential>>>,
    }

    impl FakeServer {
        fn new(reissue: ReissueBehavior) -> Self {
            Self {
                accepted: Mutex::new(None),
                always_expired: false,
                reissue,
                reissue_calls: AtomicUsize::new(0),
                protected_calls: AtomicUsize::new(0),
                sent_credentials: Mutex::new(Vec::new()),
            }
        }

        fn accept(&self, credential: &Credential) {
            *self.accepted.lock().unwrap() = Some(credential.clone());
        }
    }

    #[async_trait]
    impl Transport for FakeServer {
        async fn send(
            &self,
            request: &ApiRequest,
            credential: Option<&Credential>,
        ) -> Result<ApiResponse, ApiError> {
            if request.path() == REISSUE_PATH {
                self.reissue_calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                return match self.reissue {
                    ReissueBehavior::Issue(member) => {
                        let fresh = Credential::new(test_token("alice", member));
                        self.accept(&fresh);
                        let body = serde_json::json!({ "access_token": fresh.as_str() });
                        Ok(ApiResponse::new(StatusCode::OK, body.to_string()))
                    }
                    ReissueBehavior::Deny => Ok(ApiResponse::new(StatusCode::UNAUTHORIZED, "")),
                    ReissueBehavior::Unreachable => {
                        Err(ApiError::Transport("connection refused".to_string()))
                    }
                };
            }

            self.protected_calls.fetch_add(1, Ordering::SeqCst);
            self.sent_credentials.lock().unwrap().push(credential.cloned());
            tokio::task::yield_now().await;

            if request.path() == "/jobs/make_jobapplications" {
                return Ok(ApiResponse::new(StatusCode::BAD_REQUEST, r#"{"error":"already applied"}"#));
            }

            let accepted = self.accepted.lock().unwrap().clone();
            if self.always_expired || credential != accepted.as_ref() {
                return Ok(ApiResponse::new(StatusCode::UNAUTHORIZED, EXPIRED_BODY));
            }
            Ok(ApiResponse::new(StatusCode::OK, r#"{"ok":true}"#))
        }
    }

    struct Harness {
        server: Arc<FakeServer>,
        store: Arc<TokenStore>,
        session: SessionState,
        executor: AuthorizedRequestExecutor,
    }

    fn harness(server: FakeServer) -> Harness {
        let server = Arc::new(server);
        let session = SessionState::new();
        let store = Arc::new(TokenStore::new(session.clone()));
        let transport: Arc<dyn Transport> = server.clone();
        let reissuer = Arc::new(ReissueCoordinator::new(Arc::clone(&transport), Arc::clone(&store)));
        let executor = AuthorizedRequestExecutor::new(transport, Arc::clone(&store), reissuer);
        Harness {
            server,
            store,
            session,
            executor,
        }
    }

    fn login(h: &Harness, member: i64) -> Credential {
        let credential = Credential::new(test_token("alice", member));
        h.store.set(credential.clone());
        credential
    }

    #[tokio::test]
    async fn test_no_credential_fails_without_network_call() {
        let h = harness(FakeServer::new(ReissueBehavior::Issue(7)));

        let result = h.executor.execute(&ApiRequest::get("/jobs/list")).await;

        assert!(matches!(result, Err(ExecutorError::Unauthenticated)));
        assert_eq!(h.server.protected_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.server.reissue_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_valid_credential_passes_through() {
        let h = harness(FakeServer::new(ReissueBehavior::Issue(7)));
        let credential = login(&h, 42);
        h.server.accept(&credential);

        let response = h.executor.execute(&ApiRequest::get("/jobs/list")).await.expect("succeeds");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(*h.server.sent_credentials.lock().unwrap(), vec![Some(credential)]);
        assert_eq!(h.server.reissue_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_business_errors_are_returned_unchanged() {
        let h = harness(FakeServer::new(ReissueBehavior::Issue(7)));
        login(&h, 42);

        let response = h
            .executor
            .execute(&ApiRequest::post("/jobs/make_jobapplications"))
            .await
            .expect("business errors are not executor errors");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(h.server.reissue_calls.load(Ordering::SeqCst), 0);
        assert!(h.session.is_authenticated());
    }

    #[tokio::test]
    async fn test_expiry_reissues_and_replays_once() {
        let h = harness(FakeServer::new(ReissueBehavior::Issue(42)));
        let original = login(&h, 42);

        let response = h.executor.execute(&ApiRequest::get("/jobs/list")).await.expect("replay succeeds");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(h.server.reissue_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.server.protected_calls.load(Ordering::SeqCst), 2);

        let sent = h.server.sent_credentials.lock().unwrap().clone();
        assert_eq!(sent[0].as_ref(), Some(&original));
        assert_eq!(sent[1], h.store.get());
        assert_ne!(sent[1].as_ref(), Some(&original));
        assert_eq!(h.session.member_index(), Some(42));
    }

    #[tokio::test]
    async fn test_reissue_failure_clears_session() {
        let h = harness(FakeServer::new(ReissueBehavior::Deny));
        login(&h, 42);

        let result = h.executor.execute(&ApiRequest::get("/jobs/list")).await;

        assert!(matches!(result, Err(ExecutorError::SessionExpired)));
        assert!(h.store.get().is_none());
        assert!(!h.session.is_authenticated());
        assert_eq!(h.server.protected_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unreachable_reissue_ends_session() {
        let h = harness(FakeServer::new(ReissueBehavior::Unreachable));
        login(&h, 42);

        let result = h.executor.execute(&ApiRequest::get("/jobs/list")).await;

        assert!(matches!(result, Err(ExecutorError::SessionExpired)));
        assert!(!h.session.is_authenticated());
    }

    #[tokio::test]
    async fn test_expired_replay_is_not_retried() {
        let mut server = FakeServer::new(ReissueBehavior::Issue(42));
        server.always_expired = true;
        let h = harness(server);
        login(&h, 42);

        let result = h.executor.execute(&ApiRequest::get("/jobs/list")).await;

        assert!(matches!(result, Err(ExecutorError::SessionExpired)));
        assert_eq!(h.server.reissue_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.server.protected_calls.load(Ordering::SeqCst), 2);
        assert!(h.store.get().is_none());
        assert!(!h.session.is_authenticated());
    }

    #[tokio::test]
    async fn test_concurrent_expiries_share_one_reissue() {
        let h = harness(FakeServer::new(ReissueBehavior::Issue(42)));
        login(&h, 42);

        let first = ApiRequest::get("/jobs/list");
        let second = ApiRequest::get("/community/questions/list");
        let (a, b) = tokio::join!(h.executor.execute(&first), h.executor.execute(&second));

        assert_eq!(a.expect("first completes").status(), StatusCode::OK);
        assert_eq!(b.expect("second completes").status(), StatusCode::OK);
        assert_eq!(h.server.reissue_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.server.protected_calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_replay_network_error_is_surfaced_untouched() {
        struct FlakyReplay {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl Transport for FlakyReplay {
            async fn send(
                &self,
                request: &ApiRequest,
                _credential: Option<&Credential>,
            ) -> Result<ApiResponse, ApiError> {
                if request.path() == REISSUE_PATH {
                    let body = serde_json::json!({ "access_token": test_token("alice", 1) });
                    return Ok(ApiResponse::new(StatusCode::OK, body.to_string()));
                }
                match self.calls.fetch_add(1, Ordering::SeqCst) {
                    0 => Ok(ApiResponse::new(StatusCode::UNAUTHORIZED, EXPIRED_BODY)),
                    _ => Err(ApiError::Transport("timed out".to_string())),
                }
            }
        }

        let session = SessionState::new();
        let store = Arc::new(TokenStore::new(session.clone()));
        let transport: Arc<dyn Transport> = Arc::new(FlakyReplay {
            calls: AtomicUsize::new(0),
        });
        let reissuer = Arc::new(ReissueCoordinator::new(Arc::clone(&transport), Arc::clone(&store)));
        let executor = AuthorizedRequestExecutor::new(transport, Arc::clone(&store), reissuer);
        store.set(Credential::new(test_token("alice", 1)));

        let result = executor.execute(&ApiRequest::get("/chatbot/chat")).await;

        assert!(matches!(result, Err(ExecutorError::Transport(ApiError::Transport(_)))));
        // Network failures are not session failures.
        assert!(session.is_authenticated());
    }

    /// `/fast` answers at once, `/slow` after 100ms; both succeed only with
    /// the accepted token. With `fail_first_reissue`, the first reissue
    /// fails and later ones succeed.
    struct StaggeredServer {
        accepted: Mutex<Option<Credential>>,
        fail_first_reissue: bool,
        reissue_calls: AtomicUsize,
    }

    impl StaggeredServer {
        fn new(fail_first_reissue: bool) -> Self {
            Self {
                accepted: Mutex::new(None),
                fail_first_reissue,
                reissue_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Transport for StaggeredServer {
        async fn send(
            &self,
            request: &ApiRequest,
            credential: Option<&Credential>,
        ) -> Result<ApiResponse, ApiError> {
            if request.path() == REISSUE_PATH {
                let call = self.reissue_calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                if call == 0 && self.fail_first_reissue {
                    return Err(ApiError::Transport("connection reset".to_string()));
                }
                let fresh = Credential::new(test_token("alice", 42));
                *self.accepted.lock().unwrap() = Some(fresh.clone());
                let body = serde_json::json!({ "access_token": fresh.as_str() });
                return Ok(ApiResponse::new(StatusCode::OK, body.to_string()));
            }

            if request.path() == "/slow" {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            let accepted = self.accepted.lock().unwrap().clone();
            if credential.is_some() && credential == accepted.as_ref() {
                Ok(ApiResponse::new(StatusCode::OK, r#"{"ok":true}"#))
            } else {
                Ok(ApiResponse::new(StatusCode::UNAUTHORIZED, EXPIRED_BODY))
            }
        }
    }

    fn staggered(server: StaggeredServer) -> (Arc<StaggeredServer>, Arc<TokenStore>, AuthorizedRequestExecutor) {
        let server = Arc::new(server);
        let store = Arc::new(TokenStore::new(SessionState::new()));
        let transport: Arc<dyn Transport> = server.clone();
        let reissuer = Arc::new(ReissueCoordinator::new(Arc::clone(&transport), Arc::clone(&store)));
        let executor = AuthorizedRequestExecutor::new(transport, Arc::clone(&store), reissuer);
        (server, store, executor)
    }

    #[tokio::test]
    async fn test_late_expiry_after_failed_reissue_stays_expired() {
        let (server, store, executor) = staggered(StaggeredServer::new(true));
        store.set(Credential::new(test_token("alice", 42)));

        let fast = ApiRequest::get("/fast");
        let slow = ApiRequest::get("/slow");
        let (fast, slow) = tokio::join!(executor.execute(&fast), executor.execute(&slow));

        assert!(matches!(fast, Err(ExecutorError::SessionExpired)));
        assert!(matches!(slow, Err(ExecutorError::SessionExpired)));
        assert_eq!(server.reissue_calls.load(Ordering::SeqCst), 1);
        assert!(store.get().is_none());
        assert!(!store.session().is_authenticated());
    }

    #[tokio::test]
    async fn test_logout_while_request_in_flight_is_not_revived() {
        let (server, store, executor) = staggered(StaggeredServer::new(false));
        store.set(Credential::new(test_token("alice", 42)));

        let request = ApiRequest::get("/slow");
        let logout = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            store.clear();
        };
        let (result, ()) = tokio::join!(executor.execute(&request), logout);

        assert!(matches!(result, Err(ExecutorError::SessionExpired)));
        assert_eq!(server.reissue_calls.load(Ordering::SeqCst), 0);
        assert!(store.get().is_none());
        assert!(!store.session().is_authenticated());
    }

    #[tokio::test]
    async fn test_relogin_while_request_in_flight_is_kept() {
        let (server, store, executor) = staggered(StaggeredServer::new(false));
        store.set(Credential::new(test_token("alice", 42)));

        let fresh_login = Credential::new(test_token("alice", 42));
        *server.accepted.lock().unwrap() = Some(fresh_login.clone());

        let request = ApiRequest::get("/slow");
        let relogin = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            store.clear();
            store.set(fresh_login.clone());
        };
        let (result, ()) = tokio::join!(executor.execute(&request), relogin);

        assert_eq!(result.expect("replayed with the new login").status(), StatusCode::OK);
        assert_eq!(server.reissue_calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.get(), Some(fresh_login));
    }
}
