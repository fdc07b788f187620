//! Session Subsystem
//!
//! Short-lived, TTL-bound interaction sessions. Each session records one
//! pending human decision and carries a workflow-specific payload.
//!
//! # Design
//!
//! The [`SessionStore`] owns every session record together with its expiry
//! task. All mutations go through a [`SessionGuard`], obtained from
//! [`SessionStore::lock`]; the guard is the single mutual-exclusion domain for
//! create, delete and expiry:
//!
//! ```text
//!  workflow transition ──lock()──┐
//!                                ├──▶ StoreState { sessions, by_owner }
//!  expiry task (per session) ────┘
//! ```
//!
//! An expiry task sleeps until the session deadline, then acquires the same
//! lock and re-checks that its session is still present before running the
//! caller's [`ExpiryHandler`]. Exactly one of {resolved, expired} happens per
//! session.

mod error;
mod expiry;
mod store;

pub use error::{Result, SessionError};
pub use expiry::{ExpiryHandle, ExpiryHandler};
pub use store::{SessionGuard, SessionStore};

use chrono::{DateTime, Utc};
use karma_ids::{SessionId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Kind of pending decision a session tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// Waiting for the requester to pick a recipient.
    SelectRecipient,
    /// Waiting for a third party to confirm or decline.
    ConfirmRequest,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SelectRecipient => "select_recipient",
            Self::ConfirmRequest => "confirm_request",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time-to-live per session kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTtls {
    pub select_recipient: Duration,
    pub confirm_request: Duration,
}

impl SessionTtls {
    pub fn uniform(ttl: Duration) -> Self {
        Self {
            select_recipient: ttl,
            confirm_request: ttl,
        }
    }

    pub fn for_kind(&self, kind: SessionKind) -> Duration {
        match kind {
            SessionKind::SelectRecipient => self.select_recipient,
            SessionKind::ConfirmRequest => self.confirm_request,
        }
    }
}

/// A live session record.
#[derive(Debug, Clone)]
pub struct Session<P> {
    /// Unique within the store for the session's whole lifetime
    pub id: SessionId,

    pub kind: SessionKind,

    /// User the session is scoped to; the workflow decides what that allows
    pub owner: UserId,

    /// Wall-clock creation time
    pub created_at: DateTime<Utc>,

    /// Wall-clock expiry time (`created_at + ttl`)
    pub expires_at: DateTime<Utc>,

    /// Monotonic deadline the expiry task sleeps until
    pub deadline: Instant,

    /// Workflow-specific state needed to resume
    pub payload: P,

    generation: u64,
}

impl<P> Session<P> {
    /// True once the deadline has passed. Pure; does not touch the store.
    pub fn is_expired(&self) -> bool {
        Instant::now() > self.deadline
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }
}

pub(crate) fn wall_clock_expiry(created_at: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| created_at.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub(crate) fn monotonic_deadline(ttl: Duration) -> Instant {
    let now = Instant::now();
    // Roughly 30 years, the same horizon tokio uses for "never".
    now.checked_add(ttl)
        .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365 * 30))
}
