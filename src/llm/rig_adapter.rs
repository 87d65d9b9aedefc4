//! Bridges rig's `CompletionModel` to our `LlmProvider` trait.

use async_trait::async_trait;
use rig::agent::AgentBuilder;
use rig::completion::{Chat, CompletionModel};
use rig::message::Message;

use crate::error::LlmError;
use crate::llm::provider::{ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, Role};

/// Used when the caller does not pin a temperature.
const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Anthropic rejects requests without `max_tokens`.
const DEFAULT_MAX_TOKENS: u64 = 1024;

/// `LlmProvider` backed by any rig completion model.
pub struct RigAdapter<M: CompletionModel> {
    model: M,
    model_name: String,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let split = split_request(&request.messages).ok_or_else(|| LlmError::RequestFailed {
            provider: self.model_name.clone(),
            reason: "request has no trailing user message".to_string(),
        })?;

        let history: Vec<Message> = split
            .history
            .iter()
            .map(|m| match m.role {
                Role::Assistant => Message::assistant(m.content.clone()),
                _ => Message::user(m.content.clone()),
            })
            .collect();

        let agent = AgentBuilder::new(self.model.clone())
            .preamble(&split.preamble)
            .temperature(request.temperature.map_or(DEFAULT_TEMPERATURE, f64::from))
            .max_tokens(request.max_tokens.map_or(DEFAULT_MAX_TOKENS, u64::from))
            .build();

        let content = agent
            .chat(split.prompt.clone(), history)
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: self.model_name.clone(),
                reason: e.to_string(),
            })?;

        Ok(CompletionResponse { content })
    }
}

/// A request regrouped into the shape rig's `Chat` expects.
#[derive(Debug, PartialEq, Eq)]
struct SplitRequest {
    preamble: String,
    history: Vec<ChatMessage>,
    prompt: String,
}

/// System messages become the preamble, the last user message becomes the
/// prompt, everything between stays as chat history in order.
fn split_request(messages: &[ChatMessage]) -> Option<SplitRequest> {
    let preamble = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut turns: Vec<ChatMessage> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .cloned()
        .collect();

    let last = turns.pop()?;
    if last.role != Role::User {
        return None;
    }

    Some(SplitRequest {
        preamble,
        history: turns,
        prompt: last.content,
    })
}
