use thiserror::Error;

/// Failure to read identity claims out of a credential.
///
/// Never fatal: the session degrades to unauthenticated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Token malformed: {0}")]
    TokenMalformed(String),
}

impl DecodeError {
    pub(crate) fn malformed(detail: impl Into<String>) -> Self {
        DecodeError::TokenMalformed(detail.into())
    }
}

/// Failure of a reissue attempt. Shared between every caller that joined the
/// same in-flight reissue, hence `Clone`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReissueError {
    #[error("Reissue request failed: {0}")]
    Network(String),

    #[error("Server denied reissue (status {status})")]
    Denied { status: u16 },

    #[error("Reissue response carried no credential")]
    MissingCredential,

    /// The credential was cleared (failed reissue, logout) before or while
    /// reissuing. An ended session is never revived by a reissue.
    #[error("Session ended before the token could be reissued")]
    SessionEnded,
}
