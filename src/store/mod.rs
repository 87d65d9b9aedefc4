//! Persistence layer: file-backed conversation history.

pub mod conversations;

pub use conversations::{ConversationStore, Role, Turn};
