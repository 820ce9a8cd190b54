//! Session and authorization lifecycle.
//!
//! This module provides:
//! - `TokenStore`: the session-scoped holder of the access token
//! - `ClaimsDecoder`: local, unverified decoding of identity claims
//! - `SessionState`: the observable authenticated/identity state
//! - `ReissueCoordinator`: single-flight token reissue
//! - `AccessGuard`: route and action gating
//!
//! `AuthContext` wires them together around a `Transport`.

pub mod claims;
pub mod context;
pub mod error;
pub mod guard;
pub mod reissue;
pub mod session;
pub mod token_store;

pub use claims::{Claims, ClaimsDecoder};
pub use context::AuthContext;
pub use error::{DecodeError, ReissueError};
pub use guard::{AccessGuard, Action, DenyReason, Gated, Permit, Requirement, Route};
pub use reissue::ReissueCoordinator;
pub use session::{Identity, ListenerId, SessionSnapshot, SessionState};
pub use token_store::{Credential, CredentialStorage, MemoryStorage, TokenStore};
