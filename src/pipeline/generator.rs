//! Response generator: builds the reply prompt and calls the LLM.
//!
//! Prompt order is fixed: persona, transcript, knowledge, new message.
//! Provider failures never escape this module; they come back as
//! [`Draft::Failed`], whose text is a visible error string. Callers must
//! check [`Draft::is_failure`] before acting on a draft.

use std::sync::Arc;

use tracing::{info, warn};

use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};

/// Persona used when none is configured.
pub const DEFAULT_PERSONA: &str = "You are an AI email assistant. Write a short, polite and \
     professional reply to the new email. Reply with the email body only: no subject line, \
     no signature placeholders, no commentary.";

/// Leading marker of a failure draft's text.
pub const FAILURE_PREFIX: &str = "[reply generation failed]";

/// Configuration for reply generation.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Persona/style instruction, fixed for the deployment.
    pub persona: String,
    /// LLM temperature for reply generation.
    pub temperature: f32,
    /// Max tokens for the LLM response.
    pub max_tokens: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            persona: DEFAULT_PERSONA.to_string(),
            temperature: 0.3,
            max_tokens: 1024,
        }
    }
}

/// Inputs for one reply.
#[derive(Debug, Clone, Copy)]
pub struct ReplyRequest<'a> {
    pub subject: &'a str,
    pub body: &'a str,
    /// Rendered thread transcript; may be empty.
    pub transcript: &'a str,
    /// Knowledge context; may be empty.
    pub knowledge: &'a str,
}

/// Outcome of a generation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Draft {
    /// A usable reply.
    Reply(String),
    /// Generation failed. Never send this.
    Failed { reason: String },
}

impl Draft {
    /// The draft as text. Failures render as a visible error string.
    pub fn text(&self) -> String {
        match self {
            Self::Reply(text) => text.clone(),
            Self::Failed { reason } => format!("{FAILURE_PREFIX} {reason}"),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Generates reply drafts with an LLM.
pub struct ResponseGenerator {
    llm: Arc<dyn LlmProvider>,
    config: GeneratorConfig,
}

impl ResponseGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>, config: GeneratorConfig) -> Self {
        Self { llm, config }
    }

    /// Ordered messages for `request`.
    pub fn build_messages(&self, request: &ReplyRequest<'_>) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.config.persona.clone()),
            ChatMessage::user(build_user_prompt(request)),
        ]
    }

    /// Produce a draft. Never fails; see [`Draft`].
    pub async fn generate(&self, request: &ReplyRequest<'_>) -> Draft {
        let completion = CompletionRequest::new(self.build_messages(request))
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);

        match self.llm.complete(completion).await {
            Ok(response) => {
                let text = response.content.trim();
                if text.is_empty() {
                    warn!(model = self.llm.model_name(), "LLM returned an empty reply");
                    return Draft::Failed {
                        reason: "empty completion".to_string(),
                    };
                }
                info!(
                    model = self.llm.model_name(),
                    chars = text.len(),
                    "Generated reply draft"
                );
                Draft::Reply(text.to_string())
            }
            Err(e) => {
                warn!(model = self.llm.model_name(), error = %e, "Reply generation failed");
                Draft::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}

/// Transcript and knowledge blocks are omitted when empty.
fn build_user_prompt(request: &ReplyRequest<'_>) -> String {
    let mut sections = Vec::with_capacity(3);

    if !request.transcript.trim().is_empty() {
        sections.push(format!(
            "Conversation so far (oldest first):\n{}",
            request.transcript.trim()
        ));
    }
    if !request.knowledge.trim().is_empty() {
        sections.push(format!(
            "Reference knowledge:\n{}",
            request.knowledge.trim()
        ));
    }
    sections.push(format!(
        "New email:\nSubject: {}\nMessage: {}",
        request.subject, request.body
    ));

    sections.join("\n\n")
}
