//! Reply pipeline.
//!
//! One cycle handles at most one inbox message:
//! 1. `IdempotencyGate::next_unhandled()`: oldest unread message without the marker
//! 2. `ThreadReconstructor::transcript_for()`: prior thread messages
//! 3. `ResponseGenerator::generate()`: persona + transcript + knowledge
//! 4. `Mailbox::send()`, then `ConversationStore::append_turns()`
//! 5. `IdempotencyGate::mark_handled()`
//!
//! Nothing is marked before the reply was sent, and a failed generation
//! is never sent.

pub mod gate;
pub mod generator;
pub mod processor;
pub mod reply_loop;
pub mod thread;
pub mod types;

#[cfg(test)]
mod test_support;

pub use gate::IdempotencyGate;
pub use generator::{Draft, GeneratorConfig, ReplyRequest, ResponseGenerator};
pub use processor::{ProcessorOptions, ReplyProcessor};
pub use reply_loop::spawn_reply_loop;
pub use thread::ThreadReconstructor;
pub use types::{AbortReason, CycleOutcome, InboundEmail};
