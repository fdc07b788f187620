//! Console chat: stdin lines in, rendered messages out.

use crate::command::{parse_line, Input};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use karma_ids::MessageId;
use karma_workflow::{
    ChatTransport, DirectoryEntry, EngineHandle, InboundEvent, Notice, TransferSummary,
};
use std::io::Write;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

/// First id handed out; inbound lines and prompts share the sequence.
const FIRST_MESSAGE_ID: i64 = 1;

/// [`ChatTransport`] that renders to a writer, one message per block.
pub struct ConsoleTransport<W> {
    out: Mutex<W>,
    next_id: AtomicI64,
}

impl<W: Write + Send> ConsoleTransport<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            next_id: AtomicI64::new(FIRST_MESSAGE_ID),
        }
    }

    /// Allocate the id of a new chat message.
    pub fn next_message_id(&self) -> MessageId {
        MessageId::new(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn emit(&self, text: &str) -> Result<()> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| anyhow!("console writer lock poisoned"))?;
        writeln!(out, "{}", text).context("Failed to write to console")?;
        out.flush().context("Failed to flush console")
    }
}

#[async_trait]
impl<W: Write + Send> ChatTransport for ConsoleTransport<W> {
    async fn present_selection(
        &self,
        reply_to: MessageId,
        candidates: &[DirectoryEntry],
    ) -> Result<MessageId> {
        let prompt = self.next_message_id();
        let mut text = format!(
            "[#{} > #{}] Who should receive it? Answer `select {} <user id>`:",
            prompt, reply_to, prompt
        );
        for candidate in candidates {
            text.push_str(&format!("\n  {:>4}  {}", candidate.id, candidate.name));
        }
        self.emit(&text)?;
        Ok(prompt)
    }

    async fn present_confirmation(
        &self,
        reply_to: MessageId,
        summary: &TransferSummary,
    ) -> Result<MessageId> {
        let prompt = self.next_message_id();
        let mut text = format!(
            "[#{} > #{}] {} asks {} karma for {}",
            prompt, reply_to, summary.requester_name, summary.direction, summary.recipient_name
        );
        if let Some(reason) = &summary.reason {
            text.push_str(&format!(" for: \"{}\"", reason));
        }
        text.push_str(&format!(
            "\n  Answer `confirm {}` or `decline {}`",
            prompt, prompt
        ));
        self.emit(&text)?;
        Ok(prompt)
    }

    async fn notify(&self, reply_to: Option<MessageId>, notice: &Notice) -> Result<()> {
        let marker = if notice.is_error() { "!" } else { "*" };
        match reply_to {
            Some(reply_to) => self.emit(&format!("[> #{}] {} {}", reply_to, marker, notice)),
            None => self.emit(&format!("{} {}", marker, notice)),
        }
    }

    async fn retract_prompt(&self, prompt: MessageId) -> Result<()> {
        self.emit(&format!("[#{} deleted]", prompt))
    }
}

/// Feed console lines to the engine until `input` is exhausted.
pub async fn run<R, W>(
    input: R,
    engine: &EngineHandle,
    transport: &ConsoleTransport<W>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write + Send,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        if line.trim().is_empty() {
            continue;
        }
        let message = transport.next_message_id();
        debug!(message = %message, line = %line, "Input received");

        let parsed = match parse_line(&line) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(message = %message, "Unreadable input: {}", err);
                transport
                    .notify(Some(message), &Notice::UnknownCommand)
                    .await?;
                continue;
            }
        };

        let actor = parsed.actor;
        let event = match parsed.input {
            Input::Request { direction, reason } => InboundEvent::RequestIssued {
                actor,
                request_message: message,
                direction,
                reason,
            },
            Input::Select {
                session_id,
                candidate,
            } => InboundEvent::RecipientSelected {
                actor,
                session_id,
                candidate,
            },
            Input::Resolve { session_id, choice } => InboundEvent::ConfirmationResolved {
                actor,
                session_id,
                choice,
            },
            Input::Show { user } => {
                // Failures were already reported to the chat
                let _ = engine.show(message, user).await?;
                continue;
            }
            Input::Help => {
                transport.notify(Some(message), &Notice::Help).await?;
                continue;
            }
            Input::UnknownCommand(command) => {
                info!(actor = %actor, command = %command, "Unknown command");
                transport
                    .notify(Some(message), &Notice::UnknownCommand)
                    .await?;
                continue;
            }
            Input::Chatter => continue,
        };

        let handled = engine.dispatch(event).await?;
        if let Some(outcome) = handled.outcome() {
            debug!(?outcome, "Event handled");
        }
    }

    info!("Input closed");
    Ok(())
}
