//! Thread reconstruction: renders prior thread messages as a transcript.
//!
//! The triggering message is never part of its own transcript. Subjects
//! missing on replies fall back to `Re: <first message subject>`, always
//! derived from the thread root so the lineage stays stable.

use std::sync::Arc;

use tracing::debug;

use crate::channels::body::extract_body;
use crate::channels::email_types::{MailMessage, strip_quoted_text};
use crate::channels::mailbox::Mailbox;
use crate::error::MailboxError;
use crate::pipeline::types::NO_SUBJECT;

/// Default number of prior messages rendered.
pub const DEFAULT_THREAD_WINDOW: usize = 3;

/// Builds transcripts from the Mailbox Service's view of a thread.
pub struct ThreadReconstructor {
    mailbox: Arc<dyn Mailbox>,
    window: usize,
    strip_quotes: bool,
}

impl ThreadReconstructor {
    pub fn new(mailbox: Arc<dyn Mailbox>, window: usize) -> Self {
        Self {
            mailbox,
            window,
            strip_quotes: false,
        }
    }

    /// Drop quoted lines from rendered bodies.
    pub fn with_strip_quotes(mut self, strip_quotes: bool) -> Self {
        self.strip_quotes = strip_quotes;
        self
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Transcript of `thread_id`, excluding its newest message.
    pub async fn transcript(&self, thread_id: &str) -> Result<String, MailboxError> {
        let messages = self.mailbox.get_thread(thread_id).await?;
        Ok(render_transcript(&messages, self.window, self.strip_quotes))
    }

    /// Transcript of the messages preceding `trigger_id` in `thread_id`.
    ///
    /// When the trigger is the newest message this is exactly
    /// [`transcript`](Self::transcript). Messages that arrived after the
    /// trigger are left out; if the trigger is not in the thread listing,
    /// the newest message is excluded instead.
    pub async fn transcript_for(
        &self,
        thread_id: &str,
        trigger_id: &str,
    ) -> Result<String, MailboxError> {
        let mut messages = self.mailbox.get_thread(thread_id).await?;
        if let Some(pos) = messages.iter().position(|m| m.id == trigger_id) {
            messages.truncate(pos + 1);
        }
        debug!(
            thread_id = thread_id,
            messages = messages.len(),
            window = self.window,
            "Reconstructing thread"
        );
        Ok(render_transcript(&messages, self.window, self.strip_quotes))
    }
}

/// Render the last `window` messages before the newest one, oldest first,
/// separated by blank lines. Empty when the thread has at most one message.
pub fn render_transcript(messages: &[MailMessage], window: usize, strip_quotes: bool) -> String {
    let Some((root, _)) = messages.split_first() else {
        return String::new();
    };
    if messages.len() <= 1 {
        return String::new();
    }

    let prior = &messages[..messages.len() - 1];
    let start = prior.len().saturating_sub(window);
    let root_subject = root.subject().unwrap_or(NO_SUBJECT);

    prior[start..]
        .iter()
        .map(|message| render_record(message, root_subject, strip_quotes))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_record(message: &MailMessage, root_subject: &str, strip_quotes: bool) -> String {
    let subject = message
        .subject()
        .map(str::to_string)
        .unwrap_or_else(|| format!("Re: {root_subject}"));

    let mut body = extract_body(&message.payload);
    if strip_quotes {
        let stripped = strip_quoted_text(&body);
        if !stripped.trim().is_empty() {
            body = stripped;
        }
    }

    format!("From: {}\nSubject: {subject}\nMessage: {body}", message.sender())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::email_types::{Header, MessagePart};
    use crate::pipeline::test_support::MemoryMailbox;

    fn msg(id: &str, from: &str, subject: Option<&str>, body: &str) -> MailMessage {
        let mut headers = vec![Header::new("From", from)];
        if let Some(subject) = subject {
            headers.push(Header::new("Subject", subject));
        }
        MailMessage {
            id: id.into(),
            thread_id: "t1".into(),
            label_ids: vec![],
            payload: MessagePart::text("text/plain", body).with_headers(headers),
        }
    }

    #[test]
    fn single_message_thread_has_no_transcript() {
        let thread = vec![msg("m1", "a@x.com", Some("Hi"), "only one")];
        assert_eq!(render_transcript(&thread, 3, false), "");
        assert_eq!(render_transcript(&[], 3, false), "");
    }

    #[test]
    fn renders_three_line_records_oldest_first() {
        let thread = vec![
            msg("m1", "alice@x.com", Some("Project X"), "Kickoff?"),
            msg("m2", "bob@x.com", Some("Re: Project X"), "Monday works"),
            msg("m3", "alice@x.com", Some("Re: Project X"), "trigger"),
        ];
        assert_eq!(
            render_transcript(&thread, 3, false),
            "From: alice@x.com\nSubject: Project X\nMessage: Kickoff?\n\n\
             From: bob@x.com\nSubject: Re: Project X\nMessage: Monday works"
        );
    }

    #[test]
    fn missing_subject_falls_back_to_root() {
        let thread = vec![
            msg("m1", "alice@x.com", Some("Project X"), "first"),
            msg("m2", "bob@x.com", None, "second"),
            msg("m3", "alice@x.com", Some("Re: Project X"), "trigger"),
        ];
        let transcript = render_transcript(&thread, 3, false);
        assert!(transcript.contains("From: bob@x.com\nSubject: Re: Project X\nMessage: second"));
    }

    #[test]
    fn fallback_uses_root_not_previous_subject() {
        let thread = vec![
            msg("m1", "alice@x.com", Some("Project X"), "first"),
            msg("m2", "bob@x.com", Some("Changed topic"), "second"),
            msg("m3", "carol@x.com", None, "third"),
            msg("m4", "alice@x.com", None, "trigger"),
        ];
        let transcript = render_transcript(&thread, 3, false);
        assert!(transcript.contains("From: carol@x.com\nSubject: Re: Project X\n"));
        assert!(!transcript.contains("Re: Changed topic"));
    }

    #[test]
    fn window_keeps_most_recent_prior_messages() {
        let thread: Vec<MailMessage> = (1..=5)
            .map(|i| msg(&format!("m{i}"), "a@x.com", Some("S"), &format!("body {i}")))
            .collect();
        let transcript = render_transcript(&thread, 3, false);
        let bodies: Vec<&str> = transcript
            .lines()
            .filter_map(|l| l.strip_prefix("Message: "))
            .collect();
        assert_eq!(bodies, vec!["body 2", "body 3", "body 4"]);
    }

    #[test]
    fn zero_window_is_empty() {
        let thread = vec![
            msg("m1", "a@x.com", Some("S"), "one"),
            msg("m2", "a@x.com", Some("S"), "two"),
        ];
        assert_eq!(render_transcript(&thread, 0, false), "");
    }

    #[test]
    fn strip_quotes_applies_when_enabled() {
        let thread = vec![
            msg("m1", "a@x.com", Some("S"), "Sure.\n> earlier text"),
            msg("m2", "b@x.com", Some("S"), "trigger"),
        ];
        assert!(render_transcript(&thread, 3, false).contains("> earlier text"));
        assert!(!render_transcript(&thread, 3, true).contains("> earlier text"));
    }

    #[tokio::test]
    async fn transcript_for_cuts_at_trigger() {
        let mailbox = Arc::new(MemoryMailbox::with_messages(vec![
            msg("m1", "a@x.com", Some("S"), "one"),
            msg("m2", "b@x.com", Some("S"), "two"),
            msg("m3", "a@x.com", Some("S"), "three"),
        ]));
        let reconstructor = ThreadReconstructor::new(mailbox, DEFAULT_THREAD_WINDOW);

        let at_m2 = reconstructor.transcript_for("t1", "m2").await.unwrap();
        assert!(at_m2.contains("Message: one"));
        assert!(!at_m2.contains("Message: two"));
        assert!(!at_m2.contains("Message: three"));

        let newest = reconstructor.transcript("t1").await.unwrap();
        assert_eq!(newest, reconstructor.transcript_for("t1", "m3").await.unwrap());
        assert_eq!(newest, reconstructor.transcript_for("t1", "unknown").await.unwrap());
    }
}
