//! Core library for the ASK 2.0 jobs and community client.
//!
//! The interesting part is the session lifecycle in [`auth`]: one access
//! token, identity derived from it, gating on top, and a single coordinated
//! reissue-and-replay when the server reports the token expired. [`api`]
//! routes every protected call through that protocol.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, ExecutorError};
pub use auth::{AuthContext, SessionSnapshot, SessionState};
pub use config::Config;
