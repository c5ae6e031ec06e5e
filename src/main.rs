use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use resolvx::ack::{AckManager, AckRouteState, FollowupScheduler, ack_routes, spawn_scheduler};
use resolvx::channels::notify::sink_from_config;
use resolvx::channels::{
    GmailClient, GmailReplySender, PayloadOutbox, ReplySender, SmtpReplySender, WebhookTicketSink,
};
use resolvx::config::{
    FollowupConfig, MailboxConfig, ReplyConfig, ServerConfig, TicketingConfig, WatcherConfig,
};
use resolvx::pipeline::{IngestionWatcher, WatcherChannels, spawn_watcher};
use resolvx::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let server = ServerConfig::from_env();
    let _log_guard = init_tracing(&server);

    info!("Resolvx v{}", env!("CARGO_PKG_VERSION"));

    let mailbox = MailboxConfig::from_env();
    let watcher_config = WatcherConfig::from_env();
    let ticketing = TicketingConfig::from_env();
    let reply = ReplyConfig::from_env();
    let followup = FollowupConfig::from_env();

    if !mailbox.has_credentials() {
        warn!("No Gmail credentials configured; mailbox polling will fail until they are set");
    }

    // ── Database ────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&server.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", server.db_path.display()))?,
    );

    // ── Channels ────────────────────────────────────────────────────────
    let gmail = Arc::new(GmailClient::new(mailbox.clone()).context("Failed to build Gmail client")?);

    let replies: Arc<dyn ReplySender> = match reply.smtp.clone() {
        Some(smtp) => {
            info!(host = %smtp.host, port = smtp.port, "Replies via SMTP");
            Arc::new(SmtpReplySender::new(smtp, reply.from_address.clone()))
        }
        None => {
            info!("Replies via Gmail API");
            Arc::new(GmailReplySender::new(Arc::clone(&gmail), &reply))
        }
    };

    let tickets = Arc::new(WebhookTicketSink::new(&ticketing).context("Failed to build ticketing client")?);
    let outbox = PayloadOutbox::new(ticketing.outbox_path.clone());

    // ── Ingestion watcher ───────────────────────────────────────────────
    let watcher = Arc::new(
        IngestionWatcher::new(
            watcher_config,
            &mailbox,
            reply.signature.clone(),
            Arc::clone(&db),
            WatcherChannels {
                mailbox: gmail,
                tickets,
                replies,
                outbox,
            },
        )
        .context("Failed to build ingestion watcher")?,
    );
    let (watcher_handle, watcher_shutdown) = spawn_watcher(watcher);

    // ── Follow-up scheduler ─────────────────────────────────────────────
    let sink = sink_from_config(&followup);
    let manager = Arc::new(AckManager::new(Arc::clone(&db), &followup));
    let scheduler = Arc::new(FollowupScheduler::new(Arc::clone(&db), sink, followup));
    let (scheduler_handle, scheduler_shutdown) = spawn_scheduler(scheduler);

    // ── HTTP server ─────────────────────────────────────────────────────
    let app = ack_routes(AckRouteState { manager });
    let listener = tokio::net::TcpListener::bind(server.bind_addr())
        .await
        .with_context(|| format!("Failed to bind {}", server.bind_addr()))?;
    info!(addr = %server.bind_addr(), "Acknowledgement API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    // ── Shutdown ────────────────────────────────────────────────────────
    watcher_shutdown.store(true, Ordering::Relaxed);
    scheduler_shutdown.store(true, Ordering::Relaxed);

    for (name, handle) in [("watcher", watcher_handle), ("scheduler", scheduler_handle)] {
        let abort = handle.abort_handle();
        if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
            warn!(task = name, "Background task did not stop in time, aborting");
            abort.abort();
        }
    }

    info!("Resolvx stopped");
    Ok(())
}

/// Stderr logging filtered by `RUST_LOG` (default `info`), plus a daily
/// rolling file when a log directory is configured.
fn init_tracing(server: &ServerConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match &server.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "resolvx.log");
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
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    guard
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
