//! API client for the ASK 2.0 jobs and community server.
//!
//! Public community reads go straight through the transport. Everything that
//! needs a logged-in member goes through the `AuthorizedRequestExecutor`, so
//! an expired access token is reissued and the call replayed transparently.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{ApiError, ApiRequest, ApiResponse, ExecutorError, HttpTransport, Transport};
use crate::auth::{AccessGuard, Action, AuthContext, DenyReason, Permit, SessionState};
use crate::config::Config;
use crate::models::{Answer, ChatReply, Job, JobFilter, Question, SignUpRequest};

// ============================================================================
// Endpoints
// ============================================================================

const LOGIN_PATH: &str = "/login";
const LOGOUT_PATH: &str = "/logout";
const SIGN_UP_PATH: &str = "/members/sign_up";

const JOBS_LIST_PATH: &str = "/jobs/list";
const JOB_APPLY_PATH: &str = "/jobs/make_jobapplications";

const QUESTIONS_LIST_PATH: &str = "/community/questions/list";
const QUESTION_DETAIL_PATH: &str = "/community/questions/detail";
const MAKE_QUESTION_PATH: &str = "/community/questions/make_question";
const DELETE_QUESTION_PATH: &str = "/community/questions/delete_question";
const ANSWERS_LIST_PATH: &str = "/community/answer/list";
const MAKE_ANSWER_PATH: &str = "/community/answer/make_answer";
const DELETE_ANSWER_PATH: &str = "/community/answer/delete_answer";

const CHAT_PATH: &str = "/chatbot/chat";

/// Body the server answers a successful sign-up with.
const SIGN_UP_OK: &str = "Successful signUp";

/// API client for the ASK 2.0 server.
/// Clone is cheap - the transport and auth context are shared.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    auth: AuthContext,
}

impl ApiClient {
    /// Create a client talking HTTP to `config.base_url`.
    pub fn new(config: &Config) -> Result<Self> {
        let transport = HttpTransport::new(config).context("Failed to build HTTP client")?;
        Ok(Self::with_transport(Arc::new(transport)))
    }

    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        let auth = AuthContext::new(Arc::clone(&transport));
        Self { transport, auth }
    }

    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    pub fn session(&self) -> &SessionState {
        self.auth.session()
    }

    pub fn guard(&self) -> &AccessGuard {
        self.auth.guard()
    }

    // ------------------------------------------------------------------------
    // Account
    // ------------------------------------------------------------------------

    /// Log in and commit the issued access token. The refresh cookie set by
    /// the server stays in the transport's cookie jar.
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let request =
            ApiRequest::post(LOGIN_PATH).form(&[("username", username), ("password", password)]);

        let response = self
            .transport
            .send(&request, None)
            .await
            .context("Failed to send login request")?
            .error_for_status()?;

        let credential = response
            .issued_credential()
            .ok_or_else(|| ApiError::InvalidResponse("Login response carried no access token".to_string()))?;

        self.auth.store().set(credential);
        if !self.session().is_authenticated() {
            warn!(username, "Server issued a token without readable claims");
        }
        info!(username, "Logged in");
        Ok(())
    }

    /// Tell the server to drop the refresh token, then clear the local
    /// credential whatever the server said.
    pub async fn logout(&self) -> Result<()> {
        let credential = self.auth.store().get();
        let outcome = self
            .transport
            .send(&ApiRequest::post(LOGOUT_PATH), credential.as_ref())
            .await
            .and_then(ApiResponse::error_for_status);

        self.auth.store().clear();

        match outcome {
            Ok(_) => info!("Logged out"),
            Err(e) => warn!(error = %e, "Logout request failed, local session cleared anyway"),
        }
        Ok(())
    }

    pub async fn sign_up(&self, request: &SignUpRequest) -> Result<()> {
        let body = serde_json::to_value(request).context("Failed to encode sign-up request")?;
        let response = self
            .transport
            .send(&ApiRequest::post(SIGN_UP_PATH).json(body), None)
            .await
            .context("Failed to send sign-up request")?
            .error_for_status()?;

        if response.text().trim() != SIGN_UP_OK {
            bail!("Sign-up was not accepted: {}", response.text().trim());
        }
        info!(username = %request.username, "Signed up");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Jobs
    // ------------------------------------------------------------------------

    pub async fn fetch_jobs(&self, filter: JobFilter) -> Result<Vec<Job>> {
        let jobs: Vec<Job> = self.authorized_json(&ApiRequest::get(JOBS_LIST_PATH)).await?;
        debug!(count = jobs.len(), %filter, "Fetched jobs");
        Ok(filter.apply(jobs, Utc::now()))
    }

    /// The server has no single-job endpoint; look it up in the list.
    pub async fn fetch_job(&self, jobs_index: i64) -> Result<Job> {
        self.fetch_jobs(JobFilter::All)
            .await?
            .into_iter()
            .find(|j| j.jobs_index == jobs_index)
            .ok_or_else(|| ApiError::NotFound(format!("job {}", jobs_index)).into())
    }

    pub async fn apply_to_job(&self, jobs_index: i64, self_introduction: &str) -> Result<()> {
        let member_index = self.require_member()?;
        let request = ApiRequest::post(JOB_APPLY_PATH).json(json!({
            "jobs_index": jobs_index,
            "members_index": member_index,
            "self_introduction": self_introduction,
        }));
        self.authorized(&request).await?;
        info!(jobs_index, "Applied to job");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Community
    // ------------------------------------------------------------------------

    pub async fn fetch_questions(&self) -> Result<Vec<Question>> {
        self.public_json(&ApiRequest::get(QUESTIONS_LIST_PATH)).await
    }

    pub async fn fetch_question(&self, question_index: i64) -> Result<Question> {
        let request = ApiRequest::get(QUESTION_DETAIL_PATH).query("question_index", question_index);
        self.public_json(&request).await
    }

    pub async fn fetch_answers(&self, question_index: i64) -> Result<Vec<Answer>> {
        let request = ApiRequest::get(ANSWERS_LIST_PATH).query("question_index", question_index);
        self.public_json(&request).await
    }

    pub async fn make_question(&self, title: &str, content: &str) -> Result<()> {
        let member_index = self.require_member()?;
        let request = ApiRequest::post(MAKE_QUESTION_PATH).json(json!({
            "member_index": member_index,
            "title": title,
            "content": content,
        }));
        self.authorized(&request).await?;
        info!("Question posted");
        Ok(())
    }

    pub async fn delete_question(&self, question: &Question) -> Result<()> {
        self.require_permit(&Action::DeleteQuestion {
            author: question.member_index,
        })?;
        let request =
            ApiRequest::delete(DELETE_QUESTION_PATH).query("question_index", question.question_index);
        self.authorized(&request).await?;
        info!(question_index = question.question_index, "Question deleted");
        Ok(())
    }

    pub async fn make_answer(&self, question_index: i64, comment: &str) -> Result<()> {
        let member_index = self.require_member()?;
        let request = ApiRequest::post(MAKE_ANSWER_PATH).json(json!({
            "member_index": member_index,
            "question_index": question_index,
            "comment": comment,
        }));
        self.authorized(&request).await?;
        info!(question_index, "Answer posted");
        Ok(())
    }

    pub async fn delete_answer(&self, answer: &Answer) -> Result<()> {
        self.require_permit(&Action::DeleteAnswer {
            author: answer.member_index,
        })?;
        let request = ApiRequest::delete(DELETE_ANSWER_PATH).query("answer_index", answer.answer_index);
        self.authorized(&request).await?;
        info!(answer_index = answer.answer_index, "Answer deleted");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Chatbot
    // ------------------------------------------------------------------------

    pub async fn chat(&self, message: &str) -> Result<String> {
        let member_index = self.require_member()?;
        let request = ApiRequest::post(CHAT_PATH).json(json!({
            "member_index": member_index,
            "message": message,
        }));
        let reply: ChatReply = self.authorized_json(&request).await?;
        Ok(reply.response)
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn require_member(&self) -> Result<i64> {
        self.session()
            .member_index()
            .ok_or_else(|| ExecutorError::Unauthenticated.into())
    }

    fn require_permit(&self, action: &Action) -> Result<()> {
        match self.guard().permit(action) {
            Permit::Allowed => Ok(()),
            Permit::Denied(DenyReason::NotAuthenticated) => Err(ExecutorError::Unauthenticated.into()),
            Permit::Denied(DenyReason::NotOwner) => {
                Err(ApiError::AccessDenied("only the author can do that".to_string()).into())
            }
        }
    }

    async fn authorized(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let response = self.auth.executor().execute(request).await?;
        Ok(response.error_for_status()?)
    }

    async fn authorized_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T> {
        Ok(self.authorized(request).await?.json()?)
    }

    async fn public_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T> {
        let response = self
            .transport
            .send(request, None)
            .await
            .with_context(|| format!("Failed to fetch {}", request.path()))?
            .error_for_status()?;
        Ok(response.json()?)
    }
}

// ============================================================================
// Tests
// ============================================================================
