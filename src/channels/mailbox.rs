//! Mailbox Service abstraction.
//!
//! The pipeline consumes these capabilities; it does not implement any
//! provider's authentication or transport.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::channels::email_types::MailMessage;
use crate::error::MailboxError;

/// Identifier pair returned by message listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSummary {
    pub id: String,
    pub thread_id: String,
}

/// A reply ready to be handed to the Mailbox Service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingReply {
    /// Bare recipient address.
    pub to: String,
    /// Final subject line (already `Re:`-prefixed).
    pub subject: String,
    pub body: String,
    /// Thread the reply belongs to.
    pub thread_id: Option<String>,
    /// `Message-ID` of the message being answered.
    pub in_reply_to: Option<String>,
    /// `References` chain for the reply.
    pub references: Option<String>,
}

/// Capabilities the pipeline needs from a mailbox provider.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Provider name, for logging.
    fn name(&self) -> &str;

    /// Unread inbox messages that do not carry the `marker` label, in the
    /// provider's inbox order: newest first.
    async fn list_unhandled(&self, marker: &str) -> Result<Vec<MessageSummary>, MailboxError>;

    /// Fetch one message with headers and full payload.
    async fn get_message(&self, id: &str) -> Result<MailMessage, MailboxError>;

    /// Every message of a thread, oldest first.
    async fn get_thread(&self, thread_id: &str) -> Result<Vec<MailMessage>, MailboxError>;

    /// Send a reply.
    async fn send(&self, reply: &OutgoingReply) -> Result<(), MailboxError>;

    /// Id of the label called `name`, `None` if it does not exist yet.
    async fn find_label(&self, name: &str) -> Result<Option<String>, MailboxError>;

    /// Return the id of the label called `name`, creating it if missing.
    async fn ensure_label(&self, name: &str) -> Result<String, MailboxError>;

    /// Attach a label to a message. Applying it twice is harmless.
    async fn apply_label(&self, message_id: &str, label_id: &str) -> Result<(), MailboxError>;
}
