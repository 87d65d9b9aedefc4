//! Error types for the inbox auto-reply pipeline.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mailbox Service errors. Every variant aborts the current cycle except
/// `InvalidRecipient`, which no retry can fix.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Mailbox {operation} failed: {reason}")]
    RequestFailed { operation: String, reason: String },

    #[error("Mailbox {operation} returned HTTP {status}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response from mailbox {operation}: {reason}")]
    InvalidResponse { operation: String, reason: String },

    #[error("Message not found: {0}")]
    NotFound(String),

    #[error("Failed to build outgoing message: {0}")]
    Compose(String),

    #[error("Cannot reply to '{0}': not a valid address")]
    InvalidRecipient(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },
}

/// Conversation Store errors.
///
/// Callers on the read path treat all of these as "no history"; the variants
/// only decide how loudly that is logged.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store document not found: {0}")]
    NotFound(String),

    #[error("Store document {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pipeline-related errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Sender '{0}' cannot receive a reply")]
    Undeliverable(String),

    #[error("Reply sent but marker not applied to {message_id}: {source}")]
    MarkFailed {
        message_id: String,
        #[source]
        source: MailboxError,
    },
}

