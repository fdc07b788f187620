//! Command types for engine message passing
//!
//! Commands are sent from the chat front end to the engine task. Each
//! command carries a one-shot responder for its result.

use crate::error::WorkflowError;
use crate::metrics::MetricsSnapshot;
use crate::notice::Notice;
use crate::types::{HandledEvent, InboundEvent};
use karma_ids::{MessageId, UserId};
use tokio::sync::oneshot;

/// One-shot channel for returning results from the engine
pub type Responder<T> = oneshot::Sender<T>;

/// Commands sent to the engine task
#[derive(Debug)]
pub enum Command {
    /// Run one workflow transition
    Dispatch {
        event: InboundEvent,
        respond: Responder<HandledEvent>,
    },

    /// Report one user's total, or the standings when `user` is `None`
    Show {
        reply_to: MessageId,
        user: Option<UserId>,
        respond: Responder<Result<Notice, WorkflowError>>,
    },

    /// Number of live sessions
    SessionCount { respond: Responder<usize> },

    /// Current counters
    Metrics { respond: Responder<MetricsSnapshot> },

    /// Cancel all timers and stop; responds with the number of dropped sessions
    Shutdown { respond: Responder<usize> },
}
