//! Shared types for the reply pipeline.

use std::fmt;

use serde::Serialize;

use crate::channels::body::extract_body;
use crate::channels::email_types::{MailMessage, extract_email, is_replyable, reply_subject};
use crate::channels::mailbox::OutgoingReply;
use crate::error::PipelineError;

/// Subject used when the triggering message has none.
pub const NO_SUBJECT: &str = "(no subject)";

// ── Inbound message ─────────────────────────────────────────────────

/// The fields of a triggering message the pipeline works with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboundEmail {
    pub message_id: String,
    pub thread_id: String,
    /// Raw `From` header.
    pub sender: String,
    pub subject: String,
    pub body: String,
    /// RFC 822 `Message-ID`, if the provider exposed it.
    pub rfc_message_id: Option<String>,
    pub references: Option<String>,
}

impl InboundEmail {
    pub fn from_message(message: &MailMessage) -> Self {
        Self {
            message_id: message.id.clone(),
            thread_id: message.thread_id.clone(),
            sender: message.sender().to_string(),
            subject: message.subject().unwrap_or(NO_SUBJECT).to_string(),
            body: extract_body(&message.payload),
            rfc_message_id: message.message_id_header().map(str::to_string),
            references: message.reply_references(),
        }
    }

    /// Bare address replies go to.
    pub fn reply_to(&self) -> &str {
        extract_email(&self.sender)
    }

    /// Whether the sender resolves to an address a reply can go to.
    pub fn can_reply(&self) -> bool {
        is_replyable(self.reply_to())
    }

    /// The inbound turn as logged in the Conversation Store.
    pub fn history_text(&self) -> String {
        format!("From {}: {}", self.sender, self.body)
    }

    /// A reply to this message within its thread.
    pub fn reply(&self, body: impl Into<String>) -> OutgoingReply {
        OutgoingReply {
            to: self.reply_to().to_string(),
            subject: reply_subject(&self.subject),
            body: body.into(),
            thread_id: Some(self.thread_id.clone()),
            in_reply_to: self.rfc_message_id.clone(),
            references: self.references.clone(),
        }
    }
}

// ── Cycle outcome ───────────────────────────────────────────────────

/// Why a cycle stopped before completing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum AbortReason {
    /// Mailbox Service failed; nothing was sent or marked.
    Mailbox(String),
    /// Completion failed; nothing was sent, marked or logged.
    Generation(String),
    /// Reply went out but the marker was not applied. The message will be
    /// answered again on a later cycle unless an operator marks it.
    MarkFailed(String),
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mailbox(detail) => write!(f, "mailbox failure: {detail}"),
            Self::Generation(detail) => write!(f, "generation failure: {detail}"),
            Self::MarkFailed(detail) => write!(f, "sent but not marked: {detail}"),
        }
    }
}

impl From<PipelineError> for AbortReason {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Mailbox(e) => Self::Mailbox(e.to_string()),
            PipelineError::Generation(reason) => Self::Generation(reason),
            e @ PipelineError::Undeliverable(_) => Self::Mailbox(e.to_string()),
            e @ PipelineError::MarkFailed { .. } => Self::MarkFailed(e.to_string()),
        }
    }
}

/// Result of one orchestrator cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Reply sent, turns logged, message marked.
    Replied { message_id: String, thread_id: String },
    /// Inbox has no unhandled message.
    NoPendingMessage,
    /// Dry run: a draft was produced and nothing else happened.
    Drafted { message_id: String, draft: String },
    /// Message cannot be answered; marked without a reply so it stops
    /// holding up the queue.
    Skipped { message_id: String, reason: String },
    /// Cycle stopped early.
    Aborted {
        message_id: Option<String>,
        reason: AbortReason,
    },
}

impl CycleOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Replied { .. } => "replied",
            Self::NoPendingMessage => "no_pending_message",
            Self::Drafted { .. } => "drafted",
            Self::Skipped { .. } => "skipped",
            Self::Aborted { .. } => "aborted",
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::email_types::{Header, MessagePart};
    use crate::error::MailboxError;

    fn message() -> MailMessage {
        MailMessage {
            id: "m2".into(),
            thread_id: "t1".into(),
            label_ids: vec!["INBOX".into()],
            payload: MessagePart::text("text/plain", "Can we meet Friday?").with_headers(vec![
                Header::new("From", "Alice Example <alice@example.com>"),
                Header::new("Subject", "Project X"),
                Header::new("Message-ID", "<m2@example.com>"),
            ]),
        }
    }

    #[test]
    fn inbound_from_message() {
        let inbound = InboundEmail::from_message(&message());
        assert_eq!(inbound.message_id, "m2");
        assert_eq!(inbound.thread_id, "t1");
        assert_eq!(inbound.subject, "Project X");
        assert_eq!(inbound.body, "Can we meet Friday?");
        assert_eq!(inbound.reply_to(), "alice@example.com");
        assert_eq!(
            inbound.history_text(),
            "From Alice Example <alice@example.com>: Can we meet Friday?"
        );
    }

    #[test]
    fn missing_subject_uses_placeholder() {
        let mut msg = message();
        msg.payload.headers.retain(|h| h.name != "Subject");
        let inbound = InboundEmail::from_message(&msg);
        assert_eq!(inbound.subject, NO_SUBJECT);
    }

    #[test]
    fn sender_without_address_cannot_be_answered() {
        let mut msg = message();
        msg.payload.headers.retain(|h| h.name != "From");
        let inbound = InboundEmail::from_message(&msg);
        assert_eq!(inbound.sender, "unknown");
        assert!(!inbound.can_reply());
        assert!(InboundEmail::from_message(&message()).can_reply());
    }

    #[test]
    fn reply_is_threaded() {
        let reply = InboundEmail::from_message(&message()).reply("See you then.");
        assert_eq!(reply.to, "alice@example.com");
        assert_eq!(reply.subject, "Re: Project X");
        assert_eq!(reply.thread_id.as_deref(), Some("t1"));
        assert_eq!(reply.in_reply_to.as_deref(), Some("<m2@example.com>"));
        assert_eq!(reply.references.as_deref(), Some("<m2@example.com>"));
    }

    #[test]
    fn abort_reason_from_pipeline_error() {
        let reason: AbortReason = PipelineError::Generation("boom".into()).into();
        assert_eq!(reason, AbortReason::Generation("boom".into()));

        let reason: AbortReason = PipelineError::MarkFailed {
            message_id: "m1".into(),
            source: MailboxError::NotFound("m1".into()),
        }
        .into();
        assert!(matches!(reason, AbortReason::MarkFailed(ref d) if d.contains("m1")));
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let json = serde_json::to_value(CycleOutcome::NoPendingMessage).unwrap();
        assert_eq!(json["outcome"], "no_pending_message");
        assert_eq!(CycleOutcome::NoPendingMessage.label(), "no_pending_message");
    }
}
