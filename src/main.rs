use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use inbox_autoreply::channels::{GmailMailbox, Mailbox};
use inbox_autoreply::config::ReplyConfig;
use inbox_autoreply::knowledge::KnowledgeSource;
use inbox_autoreply::llm::create_provider;
use inbox_autoreply::pipeline::{
    GeneratorConfig, IdempotencyGate, ProcessorOptions, ReplyProcessor, ResponseGenerator,
    ThreadReconstructor, spawn_reply_loop,
};
use inbox_autoreply::store::ConversationStore;

/// How long Ctrl-C waits for an in-flight cycle before exiting anyway.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(120);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ReplyConfig::from_env().context("Invalid configuration")?;

    // Held for the life of the process so buffered log lines get flushed.
    let log_guard = init_tracing(&config)?;

    eprintln!("📬 Inbox auto-reply v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llm.model);
    eprintln!("   Marker label: {}", config.marker_label);
    eprintln!("   History: {}", config.history_path.display());
    if let Some(path) = &config.knowledge_path {
        eprintln!("   Knowledge: {}", path.display());
    }
    if config.dry_run {
        eprintln!("   Dry run: replies are drafted, never sent");
    }

    // ── Components ──────────────────────────────────────────────────────
    let llm = create_provider(&config.llm).context("Failed to create LLM provider")?;

    let mailbox: Arc<dyn Mailbox> = Arc::new(GmailMailbox::new(config.gmail.clone()));
    let gate = IdempotencyGate::new(Arc::clone(&mailbox), config.marker_label.clone());
    let reconstructor = ThreadReconstructor::new(Arc::clone(&mailbox), config.thread_window)
        .with_strip_quotes(config.strip_quotes);
    let store = Arc::new(ConversationStore::new(config.history_path.clone()));
    let generator = ResponseGenerator::new(
        llm,
        GeneratorConfig {
            persona: config.persona.clone(),
            ..Default::default()
        },
    );

    let processor = Arc::new(ReplyProcessor::new(
        mailbox,
        gate,
        reconstructor,
        store,
        generator,
        KnowledgeSource::new(config.knowledge_path.clone()),
        ProcessorOptions {
            history_turns: config.history_turns,
            dry_run: config.dry_run,
        },
    ));

    // ── Run ─────────────────────────────────────────────────────────────
    let Some(interval) = config.poll_interval else {
        let outcome = processor.run_cycle().await;
        println!("{}", serde_json::to_string(&outcome)?);
        if outcome.is_aborted() {
            drop(log_guard);
            std::process::exit(1);
        }
        return Ok(());
    };

    eprintln!("   Polling every {}s. Ctrl-C to stop.\n", interval.as_secs());
    let (handle, shutdown) = spawn_reply_loop(processor, interval);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown requested, finishing current cycle");
    shutdown.send_replace(true);
    match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "Reply loop task failed"),
        Err(_) => tracing::warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "Cycle still running after grace period, exiting"
        ),
    }

    drop(log_guard);
    Ok(())
}

/// stderr always; a daily-rotated file too when a log directory is set.
fn init_tracing(config: &ReplyConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "inbox-autoreply.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}
