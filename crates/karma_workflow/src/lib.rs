//! Karma transfer workflow
//!
//! A chat member requests a karma adjustment, picks who receives it, and a
//! third member has to confirm before anything is written to the ledger.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  Chat front end (transport)                   │
//! └──────────────────────────────────────────────────────────────┘
//!                               │ InboundEvent / /show
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Engine          │ single task, bounded command channel       │
//! │  ApprovalWorkflow│ request → select recipient → confirm        │
//! │  SessionStore    │ TTL sessions + expiry timers (karma_session)│
//! └──────────────────────────────────────────────────────────────┘
//!        │                     │                      │
//!        ▼                     ▼                      ▼
//!   KarmaLedger          UserDirectory          ChatTransport
//! ```
//!
//! # Design Principles
//!
//! 1. **One serialization domain:** every transition and every expiry runs
//!    with the session store locked, so a session resolves exactly once.
//!
//! 2. **Separation of duties:** neither the requester nor the recipient can
//!    confirm a transfer.
//!
//! 3. **At-most-once writes:** a failed ledger write is reported, never
//!    retried; the session is gone either way.

pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod notice;
pub mod transport;
pub mod types;
pub mod workflow;

pub use config::{ConfigError, WorkflowConfig};
pub use directory::{StaticDirectory, UserDirectory};
pub use engine::{spawn_engine, Engine, EngineHandle};
pub use error::{DirectoryError, LedgerError, Result, WorkflowError};
pub use ledger::{InMemoryLedger, KarmaLedger, LedgerEntry};
pub use metrics::{MetricsSnapshot, WorkflowMetrics};
pub use notice::Notice;
pub use transport::ChatTransport;
pub use types::{
    Choice, DirectoryEntry, Direction, HandledEvent, InboundEvent, OwnerRole, Outcome, Standing,
    TransferPayload, TransferSummary,
};
pub use workflow::{authorize_resolution, ApprovalWorkflow};

pub use karma_ids::{MessageId, SessionId, UserId};
pub use karma_session::{SessionKind, SessionTtls};
