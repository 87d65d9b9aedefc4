//! Background reply loop: runs one cycle per tick.
//!
//! A tick handles at most one message, so a backlog of N messages takes N
//! ticks. An aborted message stays unhandled and is retried on a later tick.
//! Shutdown is only observed between cycles: a cycle that has started always
//! runs through send, log and mark.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::pipeline::processor::ReplyProcessor;

/// Spawn the periodic loop. Returns its `JoinHandle` and a shutdown sender.
///
/// Send `true` (or drop the sender), then await the handle to let the
/// current cycle finish. A cycle that outlasts the interval delays the next
/// tick rather than overlapping with it.
pub fn spawn_reply_loop(
    processor: Arc<ReplyProcessor>,
    interval: Duration,
) -> (JoinHandle<()>, watch::Sender<bool>) {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "Reply loop started");

        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        // First tick fires immediately.
        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = shutdown_rx.changed() => break,
            }

            processor.run_cycle().await;

            if *shutdown_rx.borrow() {
                break;
            }
        }
        info!("Reply loop shutting down");
    });

    (handle, shutdown_tx)
}
