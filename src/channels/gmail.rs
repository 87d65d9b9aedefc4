//! Gmail REST adapter for the `Mailbox` trait.
//!
//! Talks to the Gmail v1 API with a bearer token. Token acquisition (OAuth
//! consent, refresh) happens outside this process.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use lettre::Message;
use lettre::message::Mailbox as Address;
use lettre::message::header::ContentType;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;

use crate::channels::email_types::MailMessage;
use crate::channels::mailbox::{Mailbox, MessageSummary, OutgoingReply};
use crate::error::{ConfigError, MailboxError};

/// Default API endpoint.
pub const DEFAULT_API_BASE: &str = "https://gmail.googleapis.com";

/// Page size for message listings (Gmail maximum is 500).
const LIST_PAGE_SIZE: usize = 100;

// ── Configuration ───────────────────────────────────────────────────

/// Gmail adapter configuration.
#[derive(Debug, Clone)]
pub struct GmailConfig {
    pub api_base: String,
    pub user_id: String,
    pub access_token: SecretString,
    /// From address for replies; looked up from the profile when `None`.
    pub from_address: Option<String>,
}

impl GmailConfig {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            user_id: "me".to_string(),
            access_token: SecretString::from(access_token.into()),
            from_address: None,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_from_address(mut self, from_address: impl Into<String>) -> Self {
        self.from_address = Some(from_address.into());
        self
    }

    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup("GMAIL_ACCESS_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("GMAIL_ACCESS_TOKEN".to_string()))?;

        let mut config = Self::new(token.trim());
        if let Some(base) = lookup("GMAIL_API_BASE").filter(|s| !s.trim().is_empty()) {
            config.api_base = base.trim().trim_end_matches('/').to_string();
        }
        if let Some(user) = lookup("GMAIL_USER_ID").filter(|s| !s.trim().is_empty()) {
            config.user_id = user.trim().to_string();
        }
        config.from_address = lookup("AUTOREPLY_FROM_ADDRESS")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Ok(config)
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListMessagesResponse {
    #[serde(default)]
    messages: Vec<MessageSummary>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ThreadResponse {
    #[serde(default)]
    messages: Vec<MailMessage>,
}

#[derive(Debug, Deserialize)]
struct Label {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ListLabelsResponse {
    #[serde(default)]
    labels: Vec<Label>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Profile {
    email_address: String,
}

#[derive(Debug, Deserialize)]
struct Ignored {}

// ── Adapter ─────────────────────────────────────────────────────────

/// Mailbox backed by the Gmail REST API.
pub struct GmailMailbox {
    config: GmailConfig,
    client: reqwest::Client,
    from_address: OnceCell<String>,
}

impl GmailMailbox {
    pub fn new(config: GmailConfig) -> Self {
        let from_address = match &config.from_address {
            Some(addr) => OnceCell::new_with(Some(addr.clone())),
            None => OnceCell::new(),
        };
        Self {
            config,
            client: reqwest::Client::new(),
            from_address,
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/gmail/v1/users/{}/{path}",
            self.config.api_base.trim_end_matches('/'),
            self.config.user_id
        )
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, MailboxError> {
        let resp = self
            .client
            .get(self.api_url(path))
            .bearer_auth(self.config.access_token.expose_secret())
            .query(query)
            .send()
            .await
            .map_err(|e| MailboxError::RequestFailed {
                operation: operation.to_string(),
                reason: e.to_string(),
            })?;
        read_json(operation, resp).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, MailboxError> {
        let resp = self
            .client
            .post(self.api_url(path))
            .bearer_auth(self.config.access_token.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| MailboxError::RequestFailed {
                operation: operation.to_string(),
                reason: e.to_string(),
            })?;
        read_json(operation, resp).await
    }

    /// From address for replies, resolved from the profile on first use.
    async fn from_address(&self) -> Result<&str, MailboxError> {
        let addr = self
            .from_address
            .get_or_try_init(|| async {
                let profile: Profile = self.get_json("profile", "profile", &[]).await?;
                tracing::debug!(address = %profile.email_address, "Resolved sender address");
                Ok::<_, MailboxError>(profile.email_address)
            })
            .await?;
        Ok(addr.as_str())
    }

}

#[async_trait]
impl Mailbox for GmailMailbox {
    fn name(&self) -> &str {
        "gmail"
    }

    /// Walks every page: the oldest unhandled message sits on the last one.
    async fn list_unhandled(&self, marker: &str) -> Result<Vec<MessageSummary>, MailboxError> {
        let query = unhandled_query(marker);
        let mut found = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("q", query.clone()),
                ("labelIds", "INBOX".to_string()),
                ("maxResults", LIST_PAGE_SIZE.to_string()),
            ];
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }

            let page: ListMessagesResponse =
                self.get_json("messages.list", "messages", &params).await?;
            found.extend(page.messages);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        tracing::debug!(count = found.len(), "Listed unhandled messages");
        Ok(found)
    }

    async fn get_message(&self, id: &str) -> Result<MailMessage, MailboxError> {
        self.get_json(
            "messages.get",
            &format!("messages/{id}"),
            &[("format", "full".to_string())],
        )
        .await
    }

    async fn get_thread(&self, thread_id: &str) -> Result<Vec<MailMessage>, MailboxError> {
        let thread: ThreadResponse = self
            .get_json(
                "threads.get",
                &format!("threads/{thread_id}"),
                &[("format", "full".to_string())],
            )
            .await?;
        Ok(thread.messages)
    }

    async fn send(&self, reply: &OutgoingReply) -> Result<(), MailboxError> {
        let from = self.from_address().await?.to_string();
        let raw = URL_SAFE.encode(compose_reply(&from, reply)?);

        let mut body = serde_json::json!({ "raw": raw });
        if let Some(thread_id) = &reply.thread_id {
            body["threadId"] = serde_json::Value::String(thread_id.clone());
        }

        let _: Ignored = self.post_json("messages.send", "messages/send", &body).await?;
        tracing::debug!(to = %reply.to, "Gmail accepted message");
        Ok(())
    }

    async fn find_label(&self, name: &str) -> Result<Option<String>, MailboxError> {
        let listed: ListLabelsResponse = self.get_json("labels.list", "labels", &[]).await?;
        Ok(listed
            .labels
            .into_iter()
            .find(|l| l.name.eq_ignore_ascii_case(name))
            .map(|l| l.id))
    }

    async fn ensure_label(&self, name: &str) -> Result<String, MailboxError> {
        if let Some(id) = self.find_label(name).await? {
            return Ok(id);
        }

        let body = serde_json::json!({
            "name": name,
            "labelListVisibility": "labelShow",
            "messageListVisibility": "show",
        });
        match self.post_json::<Label>("labels.create", "labels", &body).await {
            Ok(label) => {
                tracing::info!(label = %name, id = %label.id, "Created marker label");
                Ok(label.id)
            }
            // Someone else created it between our list and create.
            Err(MailboxError::Status { status: 409, .. }) => {
                self.find_label(name)
                    .await?
                    .ok_or_else(|| MailboxError::InvalidResponse {
                        operation: "labels.create".to_string(),
                        reason: format!("label '{name}' reported as existing but not listed"),
                    })
            }
            Err(e) => Err(e),
        }
    }

    async fn apply_label(&self, message_id: &str, label_id: &str) -> Result<(), MailboxError> {
        let body = serde_json::json!({ "addLabelIds": [label_id] });
        let _: Ignored = self
            .post_json("messages.modify", &format!("messages/{message_id}/modify"), &body)
            .await?;
        Ok(())
    }
}

// ── Helpers (public for testing) ────────────────────────────────────

/// Search query selecting unread inbox messages without the marker.
pub fn unhandled_query(marker: &str) -> String {
    // Gmail search spells spaces in label names as dashes.
    format!("in:inbox is:unread -label:{}", marker.trim().replace(' ', "-"))
}

/// Render a reply as RFC 822 bytes.
pub fn compose_reply(from: &str, reply: &OutgoingReply) -> Result<Vec<u8>, MailboxError> {
    let from: Address = from
        .parse()
        .map_err(|e| MailboxError::Compose(format!("invalid from address '{from}': {e}")))?;
    let to: Address = reply
        .to
        .parse()
        .map_err(|_| MailboxError::InvalidRecipient(reply.to.clone()))?;

    let mut builder = Message::builder()
        .from(from)
        .to(to)
        .subject(reply.subject.clone())
        .header(ContentType::TEXT_PLAIN);
    if let Some(id) = &reply.in_reply_to {
        builder = builder.in_reply_to(id.clone());
    }
    if let Some(refs) = &reply.references {
        builder = builder.references(refs.clone());
    }

    let email = builder
        .body(reply.body.clone())
        .map_err(|e| MailboxError::Compose(e.to_string()))?;
    Ok(email.formatted())
}

async fn read_json<T: DeserializeOwned>(
    operation: &str,
    resp: reqwest::Response,
) -> Result<T, MailboxError> {
    let status = resp.status();
    if status == StatusCode::NOT_FOUND {
        return Err(MailboxError::NotFound(format!(
            "{operation}: {}",
            resp.url().path()
        )));
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(MailboxError::Status {
            operation: operation.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    resp.json::<T>()
        .await
        .map_err(|e| MailboxError::InvalidResponse {
            operation: operation.to_string(),
            reason: e.to_string(),
        })
}
