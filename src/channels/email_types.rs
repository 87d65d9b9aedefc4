//! Email-specific types: provider message model, quote stripping, address handling.

use serde::{Deserialize, Serialize};

/// A single `Name: value` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Inline body of a message part. `data` is base64url-encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_id: Option<String>,
}

/// One node of a (possibly multi-part) message payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: PartBody,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<MessagePart>,
}

impl MessagePart {
    /// A leaf part whose body is already base64url-encoded.
    pub fn encoded(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        let data = data.into();
        Self {
            mime_type: mime_type.into(),
            body: PartBody {
                size: data.len() as u64,
                data: Some(data),
                attachment_id: None,
            },
            ..Default::default()
        }
    }

    /// A leaf part from plain text; encodes it the way providers ship it.
    pub fn text(mime_type: impl Into<String>, text: &str) -> Self {
        use base64::Engine as _;
        Self::encoded(
            mime_type,
            base64::engine::general_purpose::URL_SAFE.encode(text.as_bytes()),
        )
    }

    /// A container part holding `parts` in order.
    pub fn multipart(mime_type: impl Into<String>, parts: Vec<MessagePart>) -> Self {
        Self {
            mime_type: mime_type.into(),
            parts,
            ..Default::default()
        }
    }

    pub fn with_headers(mut self, headers: Vec<Header>) -> Self {
        self.headers = headers;
        self
    }

    /// MIME type without parameters, lowercased.
    pub fn essence(&self) -> String {
        self.mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
    }
}

/// A message as fetched from the Mailbox Service. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailMessage {
    pub id: String,
    pub thread_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub label_ids: Vec<String>,
    #[serde(default)]
    pub payload: MessagePart,
}

impl MailMessage {
    /// First header named `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.payload
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Subject header, `None` when absent or blank.
    pub fn subject(&self) -> Option<&str> {
        self.header("Subject")
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Raw `From` header, `"unknown"` when absent.
    pub fn sender(&self) -> &str {
        self.header("From").unwrap_or("unknown")
    }

    /// RFC 822 `Message-ID`, used to thread the reply.
    pub fn message_id_header(&self) -> Option<&str> {
        self.header("Message-ID")
    }

    /// Existing `References` chain, if any.
    pub fn references(&self) -> Option<&str> {
        self.header("References")
    }

    /// `References` value for a reply to this message: the existing chain
    /// followed by this message's `Message-ID`.
    pub fn reply_references(&self) -> Option<String> {
        let own = self.message_id_header()?.trim();
        match self.references().map(str::trim).filter(|r| !r.is_empty()) {
            Some(chain) if chain.split_whitespace().any(|id| id == own) => Some(chain.to_string()),
            Some(chain) => Some(format!("{chain} {own}")),
            None => Some(own.to_string()),
        }
    }
}

/// Strip quoted text from an email body.
///
/// Removes:
/// - Lines starting with `>` (quoted reply lines)
/// - "On ... wrote:" attribution lines and everything after them
///
/// Pure string parsing, no LLM calls.
pub fn strip_quoted_text(body: &str) -> String {
    let mut result = Vec::new();

    for line in body.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with('>') {
            continue;
        }

        // "On Mon, Jan 1, 2026 at 10:00 AM Alice <alice@ex.com> wrote:"
        if trimmed.starts_with("On ") && trimmed.ends_with("wrote:") {
            break;
        }

        if trimmed.starts_with("---") && trimmed.contains("Original Message") {
            break;
        }

        result.push(line);
    }

    while result.last().is_some_and(|l| l.trim().is_empty()) {
        result.pop();
    }

    result.join("\n")
}

/// Extract the bare address from a From header value.
///
/// - `"Name <email@example.com>"` → `"email@example.com"`
/// - `"email@example.com"` → `"email@example.com"`
/// - `"<email@example.com>"` → `"email@example.com"`
pub fn extract_email(from: &str) -> &str {
    if let Some(start) = from.rfind('<')
        && let Some(end) = from[start..].find('>')
    {
        return from[start + 1..start + end].trim();
    }
    from.trim()
}

/// Whether a bare address can be used as a reply recipient.
pub fn is_replyable(address: &str) -> bool {
    address.parse::<lettre::Address>().is_ok()
}

/// `Re: <subject>`, without stacking prefixes.
pub fn reply_subject(subject: &str) -> String {
    let subject = subject.trim();
    let has_prefix = subject
        .get(..3)
        .is_some_and(|p| p.eq_ignore_ascii_case("re:"));
    if has_prefix {
        subject.to_string()
    } else {
        format!("Re: {subject}")
    }
}
