//! Karma Test Utilities
//!
//! In-process adapters that record what the workflow did, plus a small fixed
//! cast of users.
//!
//! # Usage
//!
//! ```rust,ignore
//! use karma_test_utils::{Harness, ALICE};
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_request() {
//!     let harness = Harness::new();
//!     harness.workflow.request(ALICE, MessageId::new(1), Direction::Up, None).await.unwrap();
//!     assert_eq!(harness.transport.selections().len(), 1);
//! }
//! ```

use anyhow::{bail, Result};
use async_trait::async_trait;
use karma_ids::{MessageId, UserId};
use karma_workflow::{
    ApprovalWorkflow, ChatTransport, DirectoryEntry, InMemoryLedger, KarmaLedger, LedgerError,
    Notice, StaticDirectory, TransferSummary, WorkflowConfig,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

pub const ALICE: UserId = UserId::new(1);
pub const BOB: UserId = UserId::new(2);
pub const CAROL: UserId = UserId::new(3);
pub const DAVE: UserId = UserId::new(4);

/// Not in the directory
pub const MALLORY: UserId = UserId::new(99);

/// First message id handed out by [`RecordingTransport`].
pub const FIRST_PROMPT_ID: i64 = 1000;

/// Alice, Bob, Carol and Dave.
pub fn directory() -> StaticDirectory {
    StaticDirectory::new([
        (ALICE, "Alice".to_string()),
        (BOB, "Bob".to_string()),
        (CAROL, "Carol".to_string()),
        (DAVE, "Dave".to_string()),
    ])
}

/// Let spawned expiry tasks run after the paused clock was advanced.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// One outbound call made through [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Selection {
        reply_to: MessageId,
        prompt: MessageId,
        candidates: Vec<DirectoryEntry>,
    },
    Confirmation {
        reply_to: MessageId,
        prompt: MessageId,
        summary: TransferSummary,
    },
    Notice {
        reply_to: Option<MessageId>,
        notice: Notice,
    },
    Retracted(MessageId),
}

/// Chat transport that keeps a log of everything sent through it.
#[derive(Debug)]
pub struct RecordingTransport {
    log: Mutex<Vec<Sent>>,
    next_id: AtomicI64,
    fail_prompts: AtomicBool,
    fail_notices: AtomicBool,
    fail_retractions: AtomicBool,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self {
            log: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(FIRST_PROMPT_ID),
            fail_prompts: AtomicBool::new(false),
            fail_notices: AtomicBool::new(false),
            fail_retractions: AtomicBool::new(false),
        }
    }
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_prompts(&self, fail: bool) {
        self.fail_prompts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_notices(&self, fail: bool) {
        self.fail_notices.store(fail, Ordering::SeqCst);
    }

    pub fn fail_retractions(&self, fail: bool) {
        self.fail_retractions.store(fail, Ordering::SeqCst);
    }

    /// Everything sent so far, in order.
    pub fn sent(&self) -> Vec<Sent> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap().clear();
    }

    pub fn notices(&self) -> Vec<(Option<MessageId>, Notice)> {
        self.sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Notice { reply_to, notice } => Some((reply_to, notice)),
                _ => None,
            })
            .collect()
    }

    pub fn last_notice(&self) -> Option<(Option<MessageId>, Notice)> {
        self.notices().pop()
    }

    pub fn retracted(&self) -> Vec<MessageId> {
        self.sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Retracted(prompt) => Some(prompt),
                _ => None,
            })
            .collect()
    }

    /// `(prompt, candidates)` of every selection prompt.
    pub fn selections(&self) -> Vec<(MessageId, Vec<DirectoryEntry>)> {
        self.sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Selection {
                    prompt, candidates, ..
                } => Some((prompt, candidates)),
                _ => None,
            })
            .collect()
    }

    /// `(prompt, summary)` of every confirmation prompt.
    pub fn confirmations(&self) -> Vec<(MessageId, TransferSummary)> {
        self.sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Confirmation {
                    prompt, summary, ..
                } => Some((prompt, summary)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, sent: Sent) {
        debug!(?sent, "Recorded outbound message");
        self.log.lock().unwrap().push(sent);
    }

    fn next_prompt(&self) -> MessageId {
        MessageId::new(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn present_selection(
        &self,
        reply_to: MessageId,
        candidates: &[DirectoryEntry],
    ) -> Result<MessageId> {
        if self.fail_prompts.load(Ordering::SeqCst) {
            bail!("chat unavailable");
        }
        let prompt = self.next_prompt();
        self.record(Sent::Selection {
            reply_to,
            prompt,
            candidates: candidates.to_vec(),
        });
        Ok(prompt)
    }

    async fn present_confirmation(
        &self,
        reply_to: MessageId,
        summary: &TransferSummary,
    ) -> Result<MessageId> {
        if self.fail_prompts.load(Ordering::SeqCst) {
            bail!("chat unavailable");
        }
        let prompt = self.next_prompt();
        self.record(Sent::Confirmation {
            reply_to,
            prompt,
            summary: summary.clone(),
        });
        Ok(prompt)
    }

    async fn notify(&self, reply_to: Option<MessageId>, notice: &Notice) -> Result<()> {
        if self.fail_notices.load(Ordering::SeqCst) {
            bail!("chat unavailable");
        }
        self.record(Sent::Notice {
            reply_to,
            notice: notice.clone(),
        });
        Ok(())
    }

    async fn retract_prompt(&self, prompt: MessageId) -> Result<()> {
        if self.fail_retractions.load(Ordering::SeqCst) {
            bail!("message {} cannot be deleted", prompt);
        }
        self.record(Sent::Retracted(prompt));
        Ok(())
    }
}

/// In-memory ledger whose writes can be made to fail.
#[derive(Debug, Default)]
pub struct FlakyLedger {
    inner: InMemoryLedger,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    write_attempts: AtomicUsize,
}

impl FlakyLedger {
    pub fn new(users: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            inner: InMemoryLedger::new(users),
            ..Self::default()
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Calls to `record_delta`, successful or not.
    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &InMemoryLedger {
        &self.inner
    }
}

#[async_trait]
impl KarmaLedger for FlakyLedger {
    async fn record_delta(
        &self,
        user: UserId,
        amount: i64,
        reason: Option<String>,
    ) -> Result<(), LedgerError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(LedgerError::backend("sheet is read-only"));
        }
        self.inner.record_delta(user, amount, reason).await
    }

    async fn total_for(&self, user: UserId) -> Result<i64, LedgerError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(LedgerError::backend("sheet is unreachable"));
        }
        self.inner.total_for(user).await
    }

    async fn totals_for_all(&self) -> Result<BTreeMap<UserId, i64>, LedgerError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(LedgerError::backend("sheet is unreachable"));
        }
        self.inner.totals_for_all().await
    }
}

/// A workflow wired to recording adapters and the fixed cast.
pub struct Harness {
    pub workflow: ApprovalWorkflow,
    pub transport: Arc<RecordingTransport>,
    pub ledger: Arc<FlakyLedger>,
}

impl Harness {
    /// Both session kinds live for ten seconds.
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(10))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self::with_config(WorkflowConfig::with_ttls(karma_workflow::SessionTtls::uniform(ttl)))
    }

    pub fn with_config(config: WorkflowConfig) -> Self {
        let directory = directory();
        let transport = Arc::new(RecordingTransport::new());
        let ledger = Arc::new(FlakyLedger::new(directory.user_ids()));
        let workflow = ApprovalWorkflow::new(
            config,
            ledger.clone(),
            Arc::new(directory),
            transport.clone(),
        );
        Self {
            workflow,
            transport,
            ledger,
        }
    }

    /// Current total of `user`, panicking if the ledger does not know them.
    pub async fn total(&self, user: UserId) -> i64 {
        self.ledger.inner().total_for(user).await.unwrap()
    }

    pub async fn live_sessions(&self) -> usize {
        self.workflow.sessions().lock().await.len()
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
