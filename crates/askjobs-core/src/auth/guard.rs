//! Route and action gating.
//!
//! Guards are pure decisions over the current `SessionState`: they never
//! navigate and never touch the network. Redirecting on `Denied` is the
//! caller's job.

use super::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Public,
    Authenticated,
    /// Authenticated as the member that authored the content.
    Owner(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NotAuthenticated,
    NotOwner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permit {
    Allowed,
    Denied(DenyReason),
}

impl Permit {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Permit::Allowed)
    }
}

/// Anything a guard can decide on.
pub trait Gated {
    fn requirement(&self) -> Requirement;
}

impl Gated for Requirement {
    fn requirement(&self) -> Requirement {
        *self
    }
}

/// Navigable views of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Home,
    Login,
    SignUp,
    About,
    Jobs,
    JobDetail(i64),
    JobApply(i64),
    Community,
    MakeQuestion,
    QuestionDetail(i64),
    ChatBot,
}

impl Route {
    /// Parse a view path such as `/jobs/apply/3`. Unknown paths yield `None`.
    pub fn from_path(path: &str) -> Option<Route> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let route = match segments.as_slice() {
            [] => Route::Home,
            ["login"] => Route::Login,
            ["signup"] => Route::SignUp,
            ["about"] => Route::About,
            ["jobs"] => Route::Jobs,
            ["jobs", "jobsdetail", id] => Route::JobDetail(id.parse().ok()?),
            ["jobs", "apply", id] => Route::JobApply(id.parse().ok()?),
            ["community"] => Route::Community,
            ["community", "make_question"] => Route::MakeQuestion,
            ["community", "communitydetail", id] => Route::QuestionDetail(id.parse().ok()?),
            ["chatbot"] => Route::ChatBot,
            _ => return None,
        };
        Some(route)
    }

    pub fn path(&self) -> String {
        match self {
            Route::Home => "/".to_string(),
            Route::Login => "/login".to_string(),
            Route::SignUp => "/signup".to_string(),
            Route::About => "/about".to_string(),
            Route::Jobs => "/jobs".to_string(),
            Route::JobDetail(id) => format!("/jobs/jobsdetail/{}", id),
            Route::JobApply(id) => format!("/jobs/apply/{}", id),
            Route::Community => "/community".to_string(),
            Route::MakeQuestion => "/community/make_question".to_string(),
            Route::QuestionDetail(id) => format!("/community/communitydetail/{}", id),
            Route::ChatBot => "/chatbot".to_string(),
        }
    }
}

impl Gated for Route {
    fn requirement(&self) -> Requirement {
        match self {
            Route::Home
            | Route::Login
            | Route::SignUp
            | Route::About
            | Route::Community
            | Route::QuestionDetail(_) => Requirement::Public,
            Route::Jobs
            | Route::JobDetail(_)
            | Route::JobApply(_)
            | Route::MakeQuestion
            | Route::ChatBot => Requirement::Authenticated,
        }
    }
}

/// User-triggered operations. Author fields are member indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ApplyToJob,
    PostQuestion,
    DeleteQuestion { author: i64 },
    PostAnswer,
    DeleteAnswer { author: i64 },
    Chat,
    Logout,
}

impl Gated for Action {
    fn requirement(&self) -> Requirement {
        match self {
            Action::ApplyToJob
            | Action::PostQuestion
            | Action::PostAnswer
            | Action::Chat
            | Action::Logout => Requirement::Authenticated,
            Action::DeleteQuestion { author }
            | Action::DeleteAnswer { author } => Requirement::Owner(*author),
        }
    }
}

/// Route guard and action guard in one: both consult the same session.
#[derive(Clone)]
pub struct AccessGuard {
    session: SessionState,
}

impl AccessGuard {
    pub fn new(session: SessionState) -> Self {
        Self { session }
    }

    pub fn permit<G: Gated + ?Sized>(&self, target: &G) -> Permit {
        let snapshot = self.session.snapshot();
        match target.requirement() {
            Requirement::Public => Permit::Allowed,
            Requirement::Authenticated if snapshot.is_authenticated() => Permit::Allowed,
            Requirement::Authenticated => Permit::Denied(DenyReason::NotAuthenticated),
            Requirement::Owner(author) => match snapshot.member_index() {
                None => Permit::Denied(DenyReason::NotAuthenticated),
                Some(me) if me == author => Permit::Allowed,
                Some(_) => Permit::Denied(DenyReason::NotOwner),
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
