//! Error taxonomy of the approval workflow and its collaborators.

use karma_ids::{SessionId, UserId};
use karma_session::{SessionError, SessionKind};
use thiserror::Error;

/// Workflow result type.
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Errors from a karma ledger backend.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("User {0} is not registered in the ledger")]
    UnknownUser(UserId),

    #[error("Ledger backend error: {0}")]
    Backend(String),
}

impl LedgerError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

/// Errors from the user directory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("User with id={0} does not exist")]
    UnknownUser(UserId),
}

/// Why a workflow step did not go through.
///
/// Every variant is recoverable: by the time one is returned the user has
/// already been told, and the store is in a consistent state.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Requester already has a live recipient-selection session
    #[error("User {0} already has an active recipient selection")]
    DuplicateSelectionSession(UserId),

    /// Session was never created, or has been resolved or expired
    #[error("Session {0} does not exist")]
    SessionNotFound(SessionId),

    /// Session exists but its TTL has elapsed; it has now been cleaned up
    #[error("Session {0} has expired")]
    SessionExpired(SessionId),

    /// The event does not apply to this kind of session
    #[error("Session {id} is a {found} session, expected {expected}")]
    WrongSessionKind {
        id: SessionId,
        expected: SessionKind,
        found: SessionKind,
    },

    /// Confirmation session without a recipient in its payload
    #[error("Session {0} has no recipient")]
    MissingRecipient(SessionId),

    /// Only the session owner may pick a recipient
    #[error("User {actor} may not act on session {id}")]
    UnauthorizedActor { id: SessionId, actor: UserId },

    /// The requester tried to confirm their own request
    #[error("User {0} cannot confirm their own request")]
    SelfApproval(UserId),

    /// The recipient tried to confirm a request in their own favour
    #[error("User {0} cannot confirm a request they are the recipient of")]
    CandidateApproval(UserId),

    /// The recipient tried to decline their own nomination
    #[error("User {0} cannot decline a request they are the recipient of")]
    CandidateDecline(UserId),

    #[error("User {0} is not known")]
    UnknownUser(UserId),

    /// Ledger write failed after the session was resolved; not retried
    #[error("Failed to record karma: {0}")]
    LedgerWriteFailure(#[source] LedgerError),

    /// Ledger read failed
    #[error("Failed to read karma: {0}")]
    LedgerReadFailure(#[source] LedgerError),

    #[error("Chat transport error: {0:#}")]
    Transport(#[source] anyhow::Error),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl WorkflowError {
    /// Policy violations: the session is untouched and a notice was sent.
    pub fn is_policy_violation(&self) -> bool {
        matches!(
            self,
            Self::UnauthorizedActor { .. }
                | Self::SelfApproval(_)
                | Self::CandidateApproval(_)
                | Self::CandidateDecline(_)
        )
    }

    /// The input referred to a session that is no longer valid.
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::SessionNotFound(_) | Self::SessionExpired(_))
    }
}
