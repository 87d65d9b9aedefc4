//! Mailbox abstraction and the Gmail adapter.

pub mod body;
pub mod email_types;
pub mod gmail;
pub mod mailbox;

pub use body::extract_body;
pub use email_types::{Header, MailMessage, MessagePart};
pub use gmail::{GmailConfig, GmailMailbox};
pub use mailbox::{Mailbox, MessageSummary, OutgoingReply};
