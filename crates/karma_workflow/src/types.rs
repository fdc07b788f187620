//! Data types shared by the workflow, its adapters and the engine.

use crate::error::WorkflowError;
use karma_ids::{MessageId, SessionId, UserId};
use karma_session::SessionKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which way a karma request moves the recipient's total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// Signed unit adjustment applied to the ledger
    pub fn delta(&self) -> i64 {
        match self {
            Self::Up => 1,
            Self::Down => -1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+}", self.delta())
    }
}

/// Answer to a confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Choice {
    Confirm,
    Decline,
}

/// Role the session owner plays, which differs per session kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerRole {
    /// Requester; the only user allowed to pick the recipient
    Selector,
    /// User who nominated the recipient; confirmation must come from someone else
    Nominator,
}

/// State carried by both session kinds of a karma transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPayload {
    pub requester: UserId,
    /// Command message that started the request; replies go here
    pub request_message: MessageId,
    pub direction: Direction,
    pub reason: Option<String>,
    /// Prompt message the session is anchored to
    pub prompt: MessageId,
    /// Set once the requester has picked someone
    pub recipient: Option<UserId>,
}

impl TransferPayload {
    pub fn owner_role(kind: SessionKind) -> OwnerRole {
        match kind {
            SessionKind::SelectRecipient => OwnerRole::Selector,
            SessionKind::ConfirmRequest => OwnerRole::Nominator,
        }
    }
}

/// Known chat user as listed by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub id: UserId,
    pub name: String,
}

/// What a confirmation prompt asks the chat to approve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferSummary {
    pub requester: UserId,
    pub requester_name: String,
    pub recipient: UserId,
    pub recipient_name: String,
    pub direction: Direction,
    pub reason: Option<String>,
}

/// One row of the karma standings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Standing {
    pub user: UserId,
    pub name: String,
    pub total: i64,
}

/// Inbound interaction events, however the transport produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    RequestIssued {
        actor: UserId,
        request_message: MessageId,
        direction: Direction,
        reason: Option<String>,
    },
    RecipientSelected {
        actor: UserId,
        session_id: SessionId,
        candidate: UserId,
    },
    ConfirmationResolved {
        actor: UserId,
        session_id: SessionId,
        choice: Choice,
    },
}

/// Successful result of one workflow step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A recipient-selection session was opened
    SelectionPrompted { session_id: SessionId },
    /// A confirmation session was opened
    ConfirmationPrompted { session_id: SessionId },
    /// The delta was written to the ledger
    Committed { recipient: UserId, delta: i64 },
    /// The request was declined; nothing was written
    Declined,
}

/// Result of dispatching an event: errors have already been reported to the chat.
#[derive(Debug)]
pub enum HandledEvent {
    Completed(Outcome),
    Rejected(WorkflowError),
}

impl HandledEvent {
    pub fn outcome(&self) -> Option<&Outcome> {
        match self {
            Self::Completed(outcome) => Some(outcome),
            Self::Rejected(_) => None,
        }
    }

    pub fn error(&self) -> Option<&WorkflowError> {
        match self {
            Self::Completed(_) => None,
            Self::Rejected(err) => Some(err),
        }
    }
}

impl From<Result<Outcome, WorkflowError>> for HandledEvent {
    fn from(result: Result<Outcome, WorkflowError>) -> Self {
        match result {
            Ok(outcome) => Self::Completed(outcome),
            Err(err) => Self::Rejected(err),
        }
    }
}
