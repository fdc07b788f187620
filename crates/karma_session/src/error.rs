//! Error types for the session store.

use karma_ids::SessionId;
use thiserror::Error;

/// Session store result type.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Contract errors raised by the session store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The id is live, or belonged to a session that has since terminated.
    #[error("Session with id={0} already exists")]
    DuplicateSession(SessionId),

    /// No live session has this id (never created, resolved, or expired).
    #[error("Session with id={0} does not exist")]
    SessionNotFound(SessionId),
}

impl SessionError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::SessionNotFound(_))
    }
}
