//! Inbox auto-reply: answers unread mail with LLM-drafted replies.

pub mod channels;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod llm;
pub mod pipeline;
pub mod store;
