//! Approval Workflow - the two-phase karma transfer state machine.
//!
//! ```text
//!  RequestIssued ──▶ [SelectRecipient] ──RecipientSelected──▶ [ConfirmRequest]
//!                           │                                   │ Confirm ─▶ Committed
//!                           │ ttl                               │ Decline ─▶ Declined
//!                           ▼                                   │ ttl     ─▶ Expired
//!                        Expired                                ▼
//! ```
//!
//! Every transition runs with the session store locked, so an expiry timer
//! for the same session can neither interleave with a transition nor fire
//! after it has resolved the session.

use crate::config::WorkflowConfig;
use crate::directory::UserDirectory;
use crate::error::{LedgerError, Result, WorkflowError};
use crate::ledger::KarmaLedger;
use crate::metrics::WorkflowMetrics;
use crate::notice::Notice;
use crate::transport::ChatTransport;
use crate::types::{
    Choice, Direction, HandledEvent, InboundEvent, Outcome, Standing, TransferPayload,
    TransferSummary,
};
use anyhow::Context;
use async_trait::async_trait;
use karma_ids::{MessageId, SessionId, UserId};
use karma_session::{
    ExpiryHandler, Session, SessionError, SessionGuard, SessionKind, SessionStore,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

type Sessions<'a> = SessionGuard<'a, TransferPayload>;

/// Decide whether `actor` may resolve a confirmation with `choice`.
///
/// Karma is never granted by the requester or by its own beneficiary, and the
/// beneficiary cannot veto their own nomination.
pub fn authorize_resolution(
    actor: UserId,
    requester: UserId,
    recipient: UserId,
    choice: Choice,
) -> Result<()> {
    match choice {
        Choice::Confirm if actor == requester => Err(WorkflowError::SelfApproval(actor)),
        Choice::Confirm if actor == recipient => Err(WorkflowError::CandidateApproval(actor)),
        Choice::Decline if actor == recipient => Err(WorkflowError::CandidateDecline(actor)),
        _ => Ok(()),
    }
}

fn policy_notice(err: &WorkflowError) -> Notice {
    match err {
        WorkflowError::SelfApproval(_) => Notice::RequesterCannotApprove,
        WorkflowError::CandidateApproval(_) => Notice::CandidateCannotApprove,
        WorkflowError::CandidateDecline(_) => Notice::CandidateCannotDecline,
        WorkflowError::UnauthorizedActor { .. } => Notice::OnlyRequesterMaySelect,
        _ => Notice::CommandFailed,
    }
}

/// Cleans up after a prompt nobody answered in time.
struct PromptExpiry {
    transport: Arc<dyn ChatTransport>,
    metrics: Arc<WorkflowMetrics>,
}

#[async_trait]
impl ExpiryHandler<TransferPayload> for PromptExpiry {
    async fn on_expire(&self, session: &Session<TransferPayload>) -> anyhow::Result<()> {
        let payload = &session.payload;
        self.metrics.inc_sessions_expired();
        info!(
            session_id = %session.id,
            kind = %session.kind,
            requester = %payload.requester,
            "Request expired without a decision"
        );

        let retracted = self
            .transport
            .retract_prompt(payload.prompt)
            .await
            .with_context(|| format!("Failed to delete prompt message {}", payload.prompt));
        let notified = self
            .transport
            .notify(Some(payload.request_message), &Notice::RequestNoLongerValid)
            .await
            .context("Failed to tell the requester the request expired");

        if retracted.is_err() || notified.is_err() {
            self.metrics.inc_transport_failures();
        }
        retracted.and(notified)
    }
}

/// The karma transfer workflow.
///
/// Owns the session store; the ledger, directory and transport are shared
/// collaborators.
pub struct ApprovalWorkflow {
    sessions: SessionStore<TransferPayload>,
    ledger: Arc<dyn KarmaLedger>,
    directory: Arc<dyn UserDirectory>,
    transport: Arc<dyn ChatTransport>,
    config: WorkflowConfig,
    metrics: Arc<WorkflowMetrics>,
    on_expire: Arc<dyn ExpiryHandler<TransferPayload>>,
}

impl ApprovalWorkflow {
    pub fn new(
        config: WorkflowConfig,
        ledger: Arc<dyn KarmaLedger>,
        directory: Arc<dyn UserDirectory>,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        let metrics = Arc::new(WorkflowMetrics::new());
        let on_expire = Arc::new(PromptExpiry {
            transport: Arc::clone(&transport),
            metrics: Arc::clone(&metrics),
        });
        Self {
            sessions: SessionStore::new(),
            ledger,
            directory,
            transport,
            config,
            metrics,
            on_expire,
        }
    }

    pub fn sessions(&self) -> &SessionStore<TransferPayload> {
        &self.sessions
    }

    pub fn metrics(&self) -> &WorkflowMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Dispatch one inbound event. Errors are already reported to the chat.
    pub async fn handle(&self, event: InboundEvent) -> HandledEvent {
        debug!(?event, "Update received");
        let result = match event {
            InboundEvent::RequestIssued {
                actor,
                request_message,
                direction,
                reason,
            } => self.request(actor, request_message, direction, reason).await,
            InboundEvent::RecipientSelected {
                actor,
                session_id,
                candidate,
            } => self.select_recipient(actor, &session_id, candidate).await,
            InboundEvent::ConfirmationResolved {
                actor,
                session_id,
                choice,
            } => self.resolve_confirmation(actor, &session_id, choice).await,
        };

        if let Err(err) = &result {
            warn!("Event was rejected: {}", err);
        }
        result.into()
    }

    /// Transition 1: open a recipient-selection session for `actor`.
    pub async fn request(
        &self,
        actor: UserId,
        request_message: MessageId,
        direction: Direction,
        reason: Option<String>,
    ) -> Result<Outcome> {
        let mut sessions = self.sessions.lock().await;

        if sessions.has_session(actor, Some(SessionKind::SelectRecipient)) {
            warn!(user = %actor, "User already has an active recipient selection");
            self.metrics.inc_policy_rejections();
            self.tell(Some(request_message), &Notice::SelectionAlreadyActive)
                .await;
            return Err(WorkflowError::DuplicateSelectionSession(actor));
        }

        let candidates = self.directory.list_users(Some(actor));
        let prompt = match self
            .transport
            .present_selection(request_message, &candidates)
            .await
        {
            Ok(prompt) => prompt,
            Err(err) => return Err(self.prompt_failed(request_message, err).await),
        };
        debug!(prompt = %prompt, "Recipient selection prompt was sent");

        let kind = SessionKind::SelectRecipient;
        let payload = TransferPayload {
            requester: actor,
            request_message,
            direction,
            reason,
            prompt,
            recipient: None,
        };
        let session_id = self
            .open(&mut sessions, kind, actor, payload)
            .await?;
        Ok(Outcome::SelectionPrompted { session_id })
    }

    /// Transition 2: the requester picked `candidate`; ask the chat to confirm.
    pub async fn select_recipient(
        &self,
        actor: UserId,
        session_id: &SessionId,
        candidate: UserId,
    ) -> Result<Outcome> {
        let mut sessions = self.sessions.lock().await;
        let session = self
            .resume(&mut sessions, session_id, SessionKind::SelectRecipient)
            .await?;
        let payload = session.payload;

        if actor != session.owner {
            warn!(
                session_id = %session_id,
                owner = %session.owner,
                actor = %actor,
                "Only the requester can pick the recipient"
            );
            self.metrics.inc_policy_rejections();
            self.tell(Some(payload.request_message), &Notice::OnlyRequesterMaySelect)
                .await;
            return Err(WorkflowError::UnauthorizedActor {
                id: session_id.clone(),
                actor,
            });
        }

        if candidate == payload.requester || !self.directory.exists(candidate) {
            warn!(session_id = %session_id, candidate = %candidate, "Candidate cannot receive karma");
            self.tell(Some(payload.request_message), &Notice::UnknownCandidate)
                .await;
            return Err(WorkflowError::UnknownUser(candidate));
        }

        sessions.delete(session_id, true)?;
        self.retract(payload.prompt).await;

        let summary = TransferSummary {
            requester: payload.requester,
            requester_name: self.display_name(payload.requester),
            recipient: candidate,
            recipient_name: self.display_name(candidate),
            direction: payload.direction,
            reason: payload.reason.clone(),
        };
        let prompt = match self
            .transport
            .present_confirmation(payload.request_message, &summary)
            .await
        {
            Ok(prompt) => prompt,
            Err(err) => return Err(self.prompt_failed(payload.request_message, err).await),
        };
        debug!(prompt = %prompt, "Confirmation prompt was sent");

        let next = TransferPayload {
            prompt,
            recipient: Some(candidate),
            ..payload
        };
        let session_id = self
            .open(&mut sessions, SessionKind::ConfirmRequest, actor, next)
            .await?;
        Ok(Outcome::ConfirmationPrompted { session_id })
    }

    /// Transition 3: a chat member confirmed or declined the transfer.
    pub async fn resolve_confirmation(
        &self,
        actor: UserId,
        session_id: &SessionId,
        choice: Choice,
    ) -> Result<Outcome> {
        let mut sessions = self.sessions.lock().await;
        let session = self
            .resume(&mut sessions, session_id, SessionKind::ConfirmRequest)
            .await?;
        let payload = session.payload;
        let Some(recipient) = payload.recipient else {
            error!(session_id = %session_id, "Confirmation session has no recipient");
            return Err(WorkflowError::MissingRecipient(session_id.clone()));
        };

        if let Err(err) = authorize_resolution(actor, payload.requester, recipient, choice) {
            warn!(session_id = %session_id, actor = %actor, ?choice, "{}", err);
            self.metrics.inc_policy_rejections();
            self.tell(Some(payload.prompt), &policy_notice(&err)).await;
            return Err(err);
        }

        match choice {
            Choice::Confirm => {
                let delta = payload.direction.delta();
                let written = self
                    .ledger
                    .record_delta(recipient, delta, payload.reason.clone())
                    .await;

                sessions.delete(session_id, true)?;
                self.retract(payload.prompt).await;

                if let Err(err) = written {
                    error!(
                        recipient = %recipient,
                        reason = ?payload.reason,
                        "Error updating karma: {}", err
                    );
                    self.metrics.inc_ledger_failures();
                    self.tell(Some(payload.request_message), &Notice::CommandFailed)
                        .await;
                    return Err(WorkflowError::LedgerWriteFailure(err));
                }

                info!(
                    requester = %payload.requester,
                    confirmer = %actor,
                    recipient = %recipient,
                    delta,
                    reason = ?payload.reason,
                    "Request was done"
                );
                self.metrics.inc_transfers_committed();
                let notice = Notice::Granted {
                    recipient_name: self.display_name(recipient),
                    delta,
                    reason: payload.reason,
                };
                self.tell(Some(payload.request_message), &notice).await;
                Ok(Outcome::Committed { recipient, delta })
            }
            Choice::Decline => {
                sessions.delete(session_id, true)?;
                self.retract(payload.prompt).await;

                info!(
                    session_id = %session_id,
                    decliner = %actor,
                    recipient = %recipient,
                    "Request was declined"
                );
                self.metrics.inc_transfers_declined();
                self.tell(Some(payload.request_message), &Notice::Declined)
                    .await;
                Ok(Outcome::Declined)
            }
        }
    }

    /// Total karma of one registered user.
    pub async fn total_for(&self, user: UserId) -> Result<i64> {
        self.ledger.total_for(user).await.map_err(|err| match err {
            LedgerError::UnknownUser(user) => WorkflowError::UnknownUser(user),
            other => WorkflowError::LedgerReadFailure(other),
        })
    }

    /// Everyone's totals, highest first.
    pub async fn standings(&self) -> Result<Vec<Standing>> {
        let totals = self
            .ledger
            .totals_for_all()
            .await
            .map_err(WorkflowError::LedgerReadFailure)?;

        let mut standings: Vec<Standing> = totals
            .into_iter()
            .map(|(user, total)| Standing {
                user,
                name: self.display_name(user),
                total,
            })
            .collect();
        standings.sort_by(|a, b| b.total.cmp(&a.total).then(a.user.cmp(&b.user)));
        Ok(standings)
    }

    /// Answer a `/show` command: one user's total, or the standings.
    pub async fn show(&self, reply_to: MessageId, user: Option<UserId>) -> Result<Notice> {
        let result = match user {
            Some(user) => self.total_for(user).await.map(|total| Notice::Total {
                name: self.display_name(user),
                total,
            }),
            None => self.standings().await.map(Notice::Standings),
        };

        let notice = match &result {
            Ok(notice) => notice.clone(),
            Err(WorkflowError::UnknownUser(user)) => {
                warn!(user = %user, "Total requested for unregistered user");
                Notice::UnregisteredUser
            }
            Err(err) => {
                error!("Error reading karma totals: {}", err);
                Notice::CommandFailed
            }
        };
        self.tell(Some(reply_to), &notice).await;
        result
    }

    /// Cancel all pending timers. Returns how many sessions were still open.
    pub async fn shutdown(&self) -> usize {
        self.sessions.shutdown().await
    }

    /// Register a session anchored to `payload.prompt`.
    async fn open(
        &self,
        sessions: &mut Sessions<'_>,
        kind: SessionKind,
        owner: UserId,
        payload: TransferPayload,
    ) -> Result<SessionId> {
        let prompt = payload.prompt;
        let reply_to = payload.request_message;
        let created = sessions.create(
            SessionId::from(prompt),
            kind,
            owner,
            self.config.ttls.for_kind(kind),
            payload,
            Arc::clone(&self.on_expire),
        );

        match created {
            Ok(session_id) => {
                self.metrics.inc_sessions_created();
                Ok(session_id)
            }
            Err(err) => {
                error!(user = %owner, kind = %kind, "Error creating session: {}", err);
                self.retract(prompt).await;
                self.tell(Some(reply_to), &Notice::CommandFailed).await;
                Err(err.into())
            }
        }
    }

    /// Load the session an input refers to.
    ///
    /// A missing or expired session is cleaned up and reported as no longer
    /// valid; the caller must treat that as terminal.
    async fn resume(
        &self,
        sessions: &mut Sessions<'_>,
        id: &SessionId,
        expected: SessionKind,
    ) -> Result<Session<TransferPayload>> {
        let session = match sessions.get(id) {
            Ok(session) => session.clone(),
            Err(err) => {
                warn!(session_id = %id, "Error getting session: {}", err);
                self.metrics.inc_stale_inputs();
                // Whoever terminated the session already retracted its prompt
                self.tell(None, &Notice::RequestNoLongerValid).await;
                return Err(WorkflowError::SessionNotFound(id.clone()));
            }
        };

        if session.is_expired() {
            warn!(session_id = %id, kind = %session.kind, "Session is expired and will be deleted");
            self.metrics.inc_stale_inputs();
            match sessions.delete(id, true) {
                Ok(_) | Err(SessionError::SessionNotFound(_)) => {}
                Err(err) => return Err(err.into()),
            }
            self.retract(session.payload.prompt).await;
            self.tell(
                Some(session.payload.request_message),
                &Notice::RequestNoLongerValid,
            )
            .await;
            return Err(WorkflowError::SessionExpired(id.clone()));
        }

        if session.kind != expected {
            warn!(session_id = %id, kind = %session.kind, expected = %expected, "Event does not apply to session");
            return Err(WorkflowError::WrongSessionKind {
                id: id.clone(),
                expected,
                found: session.kind,
            });
        }

        Ok(session)
    }

    async fn prompt_failed(&self, reply_to: MessageId, err: anyhow::Error) -> WorkflowError {
        error!("Error presenting prompt: {:#}", err);
        self.metrics.inc_transport_failures();
        self.tell(Some(reply_to), &Notice::CommandFailed).await;
        WorkflowError::Transport(err)
    }

    async fn tell(&self, reply_to: Option<MessageId>, notice: &Notice) {
        if let Err(err) = self.transport.notify(reply_to, notice).await {
            self.metrics.inc_transport_failures();
            error!(?notice, "Error sending notice: {:#}", err);
        }
    }

    async fn retract(&self, prompt: MessageId) {
        if let Err(err) = self.transport.retract_prompt(prompt).await {
            self.metrics.inc_transport_failures();
            error!(prompt = %prompt, "Error deleting prompt message: {:#}", err);
        }
    }

    fn display_name(&self, user: UserId) -> String {
        self.directory
            .name_of(user)
            .unwrap_or_else(|_| user.to_string())
    }
}
