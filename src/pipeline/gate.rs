//! Idempotency gate: decides which message is next and marks it done.
//!
//! Handled-ness lives only in the mailbox, as the marker label:
//! `Unhandled → (reply sent, or sender unanswerable) → Handled`, never
//! back. The local conversation history plays no part in it.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::channels::email_types::MailMessage;
use crate::channels::mailbox::Mailbox;
use crate::error::MailboxError;

/// Default marker label name.
pub const DEFAULT_MARKER_LABEL: &str = "AI_Replied";

/// Selects unhandled messages and applies the processing marker.
pub struct IdempotencyGate {
    mailbox: Arc<dyn Mailbox>,
    marker: String,
    label_id: OnceCell<String>,
}

impl IdempotencyGate {
    pub fn new(mailbox: Arc<dyn Mailbox>, marker: impl Into<String>) -> Self {
        Self {
            mailbox,
            marker: marker.into(),
            label_id: OnceCell::new(),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// The oldest unread inbox message without the marker, if any.
    pub async fn next_unhandled(&self) -> Result<Option<MailMessage>, MailboxError> {
        let summaries = self.mailbox.list_unhandled(&self.marker).await?;
        debug!(candidates = summaries.len(), "Scanned inbox for unhandled messages");
        if summaries.is_empty() {
            return Ok(None);
        }
        let label_id = self.existing_label_id().await?;

        // Listing is newest first.
        for summary in summaries.iter().rev() {
            let message = self.mailbox.get_message(&summary.id).await?;
            if carries_marker(&message, label_id) {
                debug!(message_id = %message.id, "Skipping message that already carries the marker");
                continue;
            }
            return Ok(Some(message));
        }
        Ok(None)
    }

    /// Ensure the marker is on `message_id`, creating the label if needed.
    /// Call only after the reply was sent or the message was given up on.
    pub async fn mark_handled(&self, message_id: &str) -> Result<(), MailboxError> {
        let label_id = self
            .label_id
            .get_or_try_init(|| self.mailbox.ensure_label(&self.marker))
            .await?;
        self.mailbox.apply_label(message_id, label_id).await?;
        info!(message_id = message_id, label = %self.marker, "Marked message handled");
        Ok(())
    }

    /// Marker label id if the label exists. Never creates it.
    async fn existing_label_id(&self) -> Result<Option<&str>, MailboxError> {
        if let Some(id) = self.label_id.get() {
            return Ok(Some(id.as_str()));
        }
        match self.mailbox.find_label(&self.marker).await? {
            Some(id) => Ok(Some(
                self.label_id.get_or_init(|| async move { id }).await.as_str(),
            )),
            None => Ok(None),
        }
    }
}

fn carries_marker(message: &MailMessage, label_id: Option<&str>) -> bool {
    label_id.is_some_and(|id| message.label_ids.iter().any(|l| l == id))
}
