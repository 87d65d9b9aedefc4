//! In-memory mailbox and scripted LLM for pipeline tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::channels::email_types::{Header, MailMessage, MessagePart};
use crate::channels::mailbox::{Mailbox, MessageSummary, OutgoingReply};
use crate::error::{LlmError, MailboxError};
use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};

/// Build a plain-text inbox message.
pub fn message(id: &str, thread_id: &str, from: &str, subject: Option<&str>, body: &str) -> MailMessage {
    let mut headers = vec![
        Header::new("From", from),
        Header::new("Message-ID", format!("<{id}@example.com>")),
    ];
    if let Some(subject) = subject {
        headers.push(Header::new("Subject", subject));
    }
    MailMessage {
        id: id.to_string(),
        thread_id: thread_id.to_string(),
        label_ids: vec!["INBOX".to_string(), "UNREAD".to_string()],
        payload: MessagePart::text("text/plain", body).with_headers(headers),
    }
}

#[derive(Default)]
struct MailboxState {
    /// Oldest first.
    messages: Vec<MailMessage>,
    labels: Vec<(String, String)>,
    sent: Vec<OutgoingReply>,
    calls: Vec<String>,
    fail_send: bool,
    fail_thread: bool,
    fail_list: bool,
    fail_apply: bool,
    /// Listing ignores the marker, like a stale search index.
    stale_listing: bool,
    /// Added latency before `ensure_label` answers.
    label_delay: Option<Duration>,
}

/// Mailbox held entirely in memory, recording every call.
#[derive(Default)]
pub struct MemoryMailbox {
    state: Mutex<MailboxState>,
}

impl MemoryMailbox {
    pub fn with_messages(messages: Vec<MailMessage>) -> Self {
        let mailbox = Self::default();
        mailbox.state.lock().unwrap().messages = messages;
        mailbox
    }

    pub fn deliver(&self, message: MailMessage) {
        self.state.lock().unwrap().messages.push(message);
    }

    pub fn sent(&self) -> Vec<OutgoingReply> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn labels_of(&self, message_id: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .messages
            .iter()
            .find(|m| m.id == message_id)
            .map(|m| m.label_ids.clone())
            .unwrap_or_default()
    }

    pub fn label_id(&self, name: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .labels
            .iter()
            .find(|(_, n)| n == name)
            .map(|(id, _)| id.clone())
    }

    pub fn fail_send(&self, fail: bool) {
        self.state.lock().unwrap().fail_send = fail;
    }

    pub fn fail_thread(&self, fail: bool) {
        self.state.lock().unwrap().fail_thread = fail;
    }

    pub fn fail_list(&self, fail: bool) {
        self.state.lock().unwrap().fail_list = fail;
    }

    pub fn fail_apply(&self, fail: bool) {
        self.state.lock().unwrap().fail_apply = fail;
    }

    pub fn stale_listing(&self, stale: bool) {
        self.state.lock().unwrap().stale_listing = stale;
    }

    pub fn delay_labels(&self, delay: Duration) {
        self.state.lock().unwrap().label_delay = Some(delay);
    }

    /// Create a label up front, as if made in the mail client.
    pub fn create_label(&self, name: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let id = format!("Label_{}", state.labels.len() + 1);
        state.labels.push((id.clone(), name.to_string()));
        id
    }
}

fn unavailable(operation: &str) -> MailboxError {
    MailboxError::Status {
        operation: operation.to_string(),
        status: 503,
        body: "unavailable".to_string(),
    }
}

#[async_trait]
impl Mailbox for MemoryMailbox {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_unhandled(&self, marker: &str) -> Result<Vec<MessageSummary>, MailboxError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("list_unhandled".to_string());
        if state.fail_list {
            return Err(unavailable("list"));
        }
        let marker_id = state
            .labels
            .iter()
            .find(|(_, n)| n == marker)
            .map(|(id, _)| id.clone());
        Ok(state
            .messages
            .iter()
            .filter(|m| m.label_ids.iter().any(|l| l == "UNREAD"))
            .filter(|m| {
                state.stale_listing
                    || marker_id
                        .as_ref()
                        .is_none_or(|id| !m.label_ids.contains(id))
            })
            .rev()
            .map(|m| MessageSummary {
                id: m.id.clone(),
                thread_id: m.thread_id.clone(),
            })
            .collect())
    }

    async fn get_message(&self, id: &str) -> Result<MailMessage, MailboxError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("get_message:{id}"));
        state
            .messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| MailboxError::NotFound(id.to_string()))
    }

    async fn get_thread(&self, thread_id: &str) -> Result<Vec<MailMessage>, MailboxError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("get_thread:{thread_id}"));
        if state.fail_thread {
            return Err(unavailable("thread"));
        }
        Ok(state
            .messages
            .iter()
            .filter(|m| m.thread_id == thread_id)
            .cloned()
            .collect())
    }

    async fn send(&self, reply: &OutgoingReply) -> Result<(), MailboxError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("send".to_string());
        if state.fail_send {
            return Err(unavailable("send"));
        }
        state.sent.push(reply.clone());
        Ok(())
    }

    async fn find_label(&self, name: &str) -> Result<Option<String>, MailboxError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("find_label:{name}"));
        Ok(state
            .labels
            .iter()
            .find(|(_, n)| n == name)
            .map(|(id, _)| id.clone()))
    }

    async fn ensure_label(&self, name: &str) -> Result<String, MailboxError> {
        let delay = self.state.lock().unwrap().label_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("ensure_label:{name}"));
        if let Some((id, _)) = state.labels.iter().find(|(_, n)| n == name) {
            return Ok(id.clone());
        }
        let id = format!("Label_{}", state.labels.len() + 1);
        state.labels.push((id.clone(), name.to_string()));
        Ok(id)
    }

    async fn apply_label(&self, message_id: &str, label_id: &str) -> Result<(), MailboxError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("apply_label:{message_id}"));
        if state.fail_apply {
            return Err(unavailable("modify"));
        }
        let message = state
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| MailboxError::NotFound(message_id.to_string()))?;
        if !message.label_ids.iter().any(|l| l == label_id) {
            message.label_ids.push(label_id.to_string());
        }
        Ok(())
    }
}

/// LLM that answers every request with the same scripted result.
pub struct ScriptedLlm {
    reply: Result<String, String>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    pub fn ok(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            reply: Err(reason.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().unwrap().push(request);
        match &self.reply {
            Ok(text) => Ok(CompletionResponse {
                content: text.clone(),
            }),
            Err(reason) => Err(LlmError::RequestFailed {
                provider: "scripted".to_string(),
                reason: reason.clone(),
            }),
        }
    }
}
