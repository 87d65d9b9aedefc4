//! Body extraction: turns a provider payload into best-effort plain text.
//!
//! Plain text always wins over HTML, regardless of part order. Nothing in
//! here fails: a payload without readable content yields
//! [`NO_CONTENT_PLACEHOLDER`].

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};

use crate::channels::email_types::MessagePart;

/// Returned when a payload has no decodable text.
pub const NO_CONTENT_PLACEHOLDER: &str = "(no text content found)";

/// Extract readable text from a message payload.
pub fn extract_body(payload: &MessagePart) -> String {
    if payload.parts.is_empty() {
        return decode_leaf(payload).unwrap_or_else(|| NO_CONTENT_PLACEHOLDER.to_string());
    }

    let mut html_fallback = None;
    if let Some(text) = scan_parts(&payload.parts, &mut html_fallback) {
        return text;
    }
    html_fallback.unwrap_or_else(|| NO_CONTENT_PLACEHOLDER.to_string())
}

/// Depth-first scan in document order. Returns the first plain-text body;
/// remembers the first HTML body seen on the way.
fn scan_parts(parts: &[MessagePart], html_fallback: &mut Option<String>) -> Option<String> {
    for part in parts {
        if !part.parts.is_empty() {
            if let Some(text) = scan_parts(&part.parts, html_fallback) {
                return Some(text);
            }
            continue;
        }

        match part.essence().as_str() {
            "text/plain" => {
                if let Some(text) = decode_text(part) {
                    return Some(text);
                }
            }
            "text/html" if html_fallback.is_none() => {
                *html_fallback = decode_text(part)
                    .map(|html| strip_html(&html))
                    .filter(|text| !text.is_empty());
            }
            _ => {}
        }
    }
    None
}

/// Decode a single-part payload, stripping markup when it is HTML.
fn decode_leaf(part: &MessagePart) -> Option<String> {
    let text = decode_text(part)?;
    if part.essence() == "text/html" {
        Some(strip_html(&text)).filter(|t| !t.is_empty())
    } else {
        Some(text)
    }
}

/// Decode a part's base64url body to trimmed text. `None` if absent or empty.
fn decode_text(part: &MessagePart) -> Option<String> {
    let data = part.body.data.as_deref()?;
    let bytes = decode_base64(data)?;
    let text = String::from_utf8_lossy(&bytes).trim().to_string();
    Some(text).filter(|t| !t.is_empty())
}

/// Providers ship URL-safe base64, padded or not; tolerate the standard
/// alphabet too.
pub fn decode_base64(data: &str) -> Option<Vec<u8>> {
    let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    let unpadded = compact.trim_end_matches('=');
    URL_SAFE_NO_PAD
        .decode(unpadded)
        .or_else(|_| STANDARD_NO_PAD.decode(unpadded))
        .ok()
}

/// Strip HTML tags and return the visible text.
///
/// Drops `<script>`/`<style>` contents, decodes the common entities and
/// normalizes whitespace.
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut rest = html;

    while let Some(start) = rest.find('<') {
        result.push_str(&rest[..start]);
        rest = &rest[start..];

        let Some(end) = rest.find('>') else {
            rest = "";
            break;
        };
        let tag = rest[1..end].trim().to_ascii_lowercase();
        rest = &rest[end + 1..];

        for hidden in ["script", "style"] {
            if tag == hidden || tag.starts_with(&format!("{hidden} ")) {
                let close = format!("</{hidden}");
                let lower = rest.to_ascii_lowercase();
                rest = match lower.find(&close) {
                    Some(pos) => {
                        let after = &rest[pos..];
                        after.find('>').map_or("", |gt| &after[gt + 1..])
                    }
                    None => "",
                };
            }
        }

        // Adjacent blocks would otherwise run together.
        result.push(' ');
    }
    result.push_str(rest);

    decode_entities(&result)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
