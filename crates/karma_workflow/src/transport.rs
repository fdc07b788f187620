//! Chat Transport - outbound prompt and notification surface.

use crate::notice::Notice;
use crate::types::{DirectoryEntry, TransferSummary};
use anyhow::Result;
use async_trait::async_trait;
use karma_ids::MessageId;

/// What the workflow needs from the chat platform.
///
/// Prompt message ids double as session ids, so a transport must never hand
/// out the same id for two live prompts.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Ask the requester to pick one of `candidates`.
    async fn present_selection(
        &self,
        reply_to: MessageId,
        candidates: &[DirectoryEntry],
    ) -> Result<MessageId>;

    /// Ask the chat to confirm or decline a transfer.
    async fn present_confirmation(
        &self,
        reply_to: MessageId,
        summary: &TransferSummary,
    ) -> Result<MessageId>;

    /// Post a notice, as a reply when `reply_to` is set.
    async fn notify(&self, reply_to: Option<MessageId>, notice: &Notice) -> Result<()>;

    /// Remove a prompt that can no longer be answered.
    async fn retract_prompt(&self, prompt: MessageId) -> Result<()>;
}
