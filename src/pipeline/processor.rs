//! Reply processor: runs one inbox cycle end to end.
//!
//! Flow for the single message a cycle handles:
//! 1. Gate picks the oldest unhandled message
//! 2. Thread transcript + knowledge → response generator
//! 3. Send the reply
//! 4. Log the inbound and generated turns
//! 5. Apply the marker label
//!
//! A failed generation stops the cycle before step 3, so nothing is sent,
//! logged or marked and the message is retried on the next cycle. The
//! marker goes on only after the send succeeded, with one exception: a
//! message whose sender has no usable address is marked without a reply,
//! since retrying it would block every newer message.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::channels::email_types::MailMessage;
use crate::channels::mailbox::Mailbox;
use crate::error::{MailboxError, PipelineError};
use crate::knowledge::KnowledgeSource;
use crate::pipeline::gate::IdempotencyGate;
use crate::pipeline::generator::{Draft, ReplyRequest, ResponseGenerator};
use crate::pipeline::thread::ThreadReconstructor;
use crate::pipeline::types::{AbortReason, CycleOutcome, InboundEmail};
use crate::store::{ConversationStore, Turn};

/// Default number of stored turns shown in the debug history view.
pub const DEFAULT_HISTORY_TURNS: usize = 6;

/// Per-deployment knobs for the processor.
#[derive(Debug, Clone)]
pub struct ProcessorOptions {
    /// Stored turns rendered at debug level before generating.
    pub history_turns: usize,
    /// Generate drafts without sending, logging or marking.
    pub dry_run: bool,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            history_turns: DEFAULT_HISTORY_TURNS,
            dry_run: false,
        }
    }
}

/// What happened to the selected message before the send step.
enum Prepared {
    Reply { inbound: InboundEmail, text: String },
    DryRun { inbound: InboundEmail, draft: String },
}

/// Orchestrates gate, thread reconstruction, generation, send, log and mark.
pub struct ReplyProcessor {
    mailbox: Arc<dyn Mailbox>,
    gate: IdempotencyGate,
    reconstructor: ThreadReconstructor,
    store: Arc<ConversationStore>,
    generator: ResponseGenerator,
    knowledge: KnowledgeSource,
    options: ProcessorOptions,
}

impl ReplyProcessor {
    pub fn new(
        mailbox: Arc<dyn Mailbox>,
        gate: IdempotencyGate,
        reconstructor: ThreadReconstructor,
        store: Arc<ConversationStore>,
        generator: ResponseGenerator,
        knowledge: KnowledgeSource,
        options: ProcessorOptions,
    ) -> Self {
        Self {
            mailbox,
            gate,
            reconstructor,
            store,
            generator,
            knowledge,
            options,
        }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Handle at most one unhandled message.
    ///
    /// Never returns an error: every failure is reported as
    /// [`CycleOutcome::Aborted`]. Logs exactly one outcome line.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let outcome = self.cycle().await;
        match &outcome {
            CycleOutcome::Replied {
                message_id,
                thread_id,
            } => info!(
                message_id = %message_id,
                thread_id = %thread_id,
                outcome = outcome.label(),
                "Cycle finished"
            ),
            CycleOutcome::Drafted { message_id, draft } => info!(
                message_id = %message_id,
                chars = draft.len(),
                outcome = outcome.label(),
                "Cycle finished (dry run, nothing sent)"
            ),
            CycleOutcome::Skipped { message_id, reason } => warn!(
                message_id = %message_id,
                reason = %reason,
                outcome = outcome.label(),
                "Cycle finished without a reply"
            ),
            CycleOutcome::NoPendingMessage => info!(
                mailbox = self.mailbox.name(),
                outcome = outcome.label(),
                "Cycle finished"
            ),
            CycleOutcome::Aborted { message_id, reason } => error!(
                message_id = message_id.as_deref().unwrap_or("-"),
                reason = %reason,
                outcome = outcome.label(),
                "Cycle aborted"
            ),
        }
        outcome
    }

    async fn cycle(&self) -> CycleOutcome {
        let message = match self.gate.next_unhandled().await {
            Ok(Some(message)) => message,
            Ok(None) => return CycleOutcome::NoPendingMessage,
            Err(e) => {
                return CycleOutcome::Aborted {
                    message_id: None,
                    reason: AbortReason::Mailbox(e.to_string()),
                };
            }
        };

        match self.handle(&message).await {
            Ok(outcome) => outcome,
            Err(e @ PipelineError::Undeliverable(_)) => self.skip(&message.id, e.to_string()).await,
            Err(e) => CycleOutcome::Aborted {
                message_id: Some(message.id.clone()),
                reason: AbortReason::from(e),
            },
        }
    }

    /// Take an unanswerable message out of the queue. Dry runs leave it.
    async fn skip(&self, message_id: &str, reason: String) -> CycleOutcome {
        if !self.options.dry_run
            && let Err(e) = self.gate.mark_handled(message_id).await
        {
            return CycleOutcome::Aborted {
                message_id: Some(message_id.to_string()),
                reason: AbortReason::Mailbox(e.to_string()),
            };
        }
        CycleOutcome::Skipped {
            message_id: message_id.to_string(),
            reason,
        }
    }

    async fn handle(&self, message: &MailMessage) -> Result<CycleOutcome, PipelineError> {
        match self.prepare(message).await? {
            Prepared::DryRun { inbound, draft } => Ok(CycleOutcome::Drafted {
                message_id: inbound.message_id,
                draft,
            }),
            Prepared::Reply { inbound, text } => {
                self.mailbox
                    .send(&inbound.reply(text.clone()))
                    .await
                    .map_err(|e| match e {
                        MailboxError::InvalidRecipient(_) => {
                            PipelineError::Undeliverable(inbound.sender.clone())
                        }
                        e => PipelineError::Mailbox(e),
                    })?;
                info!(
                    message_id = %inbound.message_id,
                    to = inbound.reply_to(),
                    "Reply sent"
                );

                // Store failures must not block the marker; the reply is out.
                let turns = vec![Turn::inbound(inbound.history_text()), Turn::generated(text)];
                if let Err(e) = self.store.append_turns(&inbound.thread_id, turns).await {
                    warn!(
                        thread_id = %inbound.thread_id,
                        error = %e,
                        "Failed to log conversation turns"
                    );
                }

                self.gate
                    .mark_handled(&inbound.message_id)
                    .await
                    .map_err(|source| PipelineError::MarkFailed {
                        message_id: inbound.message_id.clone(),
                        source,
                    })?;

                Ok(CycleOutcome::Replied {
                    message_id: inbound.message_id,
                    thread_id: inbound.thread_id,
                })
            }
        }
    }

    /// Build context and generate. No side effects on the mailbox or store.
    async fn prepare(&self, message: &MailMessage) -> Result<Prepared, PipelineError> {
        let inbound = InboundEmail::from_message(message);
        debug!(
            message_id = %inbound.message_id,
            thread_id = %inbound.thread_id,
            from = %inbound.sender,
            subject = %inbound.subject,
            "Processing message"
        );

        if !inbound.can_reply() {
            return Err(PipelineError::Undeliverable(inbound.sender));
        }

        let transcript = self
            .reconstructor
            .transcript_for(&inbound.thread_id, &inbound.message_id)
            .await?;

        if self.options.history_turns > 0 {
            let history = self
                .store
                .render_recent(&inbound.thread_id, self.options.history_turns)
                .await;
            if !history.is_empty() {
                debug!(thread_id = %inbound.thread_id, history = %history, "Stored conversation");
            }
        }

        let knowledge = self.knowledge.load().await;

        let draft = self
            .generator
            .generate(&ReplyRequest {
                subject: &inbound.subject,
                body: &inbound.body,
                transcript: &transcript,
                knowledge: &knowledge,
            })
            .await;

        let text = match draft {
            Draft::Reply(text) => text,
            Draft::Failed { reason } => return Err(PipelineError::Generation(reason)),
        };

        if self.options.dry_run {
            return Ok(Prepared::DryRun {
                inbound,
                draft: text,
            });
        }
        Ok(Prepared::Reply { inbound, text })
    }
}
