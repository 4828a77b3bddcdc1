use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use review_sync::clients::{
    ChatClient, HttpSourceClient, NotionWorkflowClient, RoleMentions, SourceClient,
    WebhookChatClient, WorkflowClient,
};
use review_sync::config::{
    ChatConfig, MailConfig, ServerConfig, SourceConfig, SyncConfig, WorkflowConfig,
};
use review_sync::control::{ControlState, app_router};
use review_sync::mail::{
    ImapMailbox, MailIngestionPipeline, Mailbox, spawn_ingestion_worker, spawn_mail_listener,
};
use review_sync::notify::{EventDispatcher, LoggingSink, ReviewEventSink};
use review_sync::store::{IdentityStore, LibSqlBackend};
use review_sync::sync::{
    CommitReconciler, EngineControl, PullRequestReconciler, ReconciliationEngine, WorkflowReplica,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let server_config = ServerConfig::from_env()?;
    let _log_guard = init_tracing(server_config.log_dir.as_deref());

    let source_config = SourceConfig::from_env()?;
    let workflow_config = WorkflowConfig::from_env()?;
    let sync_config = SyncConfig::from_env()?;

    eprintln!("🔁 Review Sync v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Repository: {} ({})", source_config.repository, source_config.branch);
    eprintln!("   Control API: http://0.0.0.0:{}", server_config.port);

    // ── Database ─────────────────────────────────────────────────────────
    let db_path = std::path::Path::new(&server_config.db_path);
    let store: Arc<dyn IdentityStore> = Arc::new(
        LibSqlBackend::new_local(db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", server_config.db_path))?,
    );
    eprintln!("   Database: {}", server_config.db_path);

    // ── Clients ──────────────────────────────────────────────────────────
    let source: Arc<dyn SourceClient> = Arc::new(HttpSourceClient::new(&source_config));
    let workflow: Arc<dyn WorkflowClient> = Arc::new(NotionWorkflowClient::new(&workflow_config));

    // ── Reconciliation engines ───────────────────────────────────────────
    let pull_requests = ReconciliationEngine::new(
        PullRequestReconciler::new(
            Arc::clone(&source),
            WorkflowReplica::new(
                Arc::clone(&workflow),
                Arc::clone(&store),
                workflow_config.pull_request_collection.clone(),
            ),
            source_config.page_size,
            sync_config.active_hours,
        ),
        sync_config.poll_time_ms,
    );
    let commits = ReconciliationEngine::new(
        CommitReconciler::new(
            Arc::clone(&source),
            WorkflowReplica::new(
                Arc::clone(&workflow),
                Arc::clone(&store),
                workflow_config.commit_collection.clone(),
            ),
            source_config.branch.clone(),
            source_config.page_size,
            sync_config.active_hours,
        ),
        sync_config.poll_time_ms,
    );
    let engines: Vec<Arc<dyn EngineControl>> = vec![Arc::new(pull_requests), Arc::new(commits)];

    if sync_config.autostart {
        for engine in &engines {
            engine.start();
        }
    }
    eprintln!(
        "   Sync: every {}ms{} ({})",
        sync_config.poll_time_ms,
        match sync_config.active_hours {
            Some((start, end)) => format!(", {start:02}:00-{end:02}:00 UTC"),
            None => String::new(),
        },
        if sync_config.autostart { "autostart" } else { "manual start" }
    );

    // ── Chat dispatch ────────────────────────────────────────────────────
    let dispatcher = match ChatConfig::from_env() {
        Ok(chat_config) => {
            let chat: Arc<dyn ChatClient> = Arc::new(WebhookChatClient::new(&chat_config));
            eprintln!("   Chat: enabled");
            Some(Arc::new(EventDispatcher::new(
                Arc::clone(&store),
                chat,
                Some(Arc::clone(&workflow)),
                RoleMentions::from_config(&chat_config),
            )))
        }
        Err(e) => {
            eprintln!("   Chat: disabled ({e})");
            None
        }
    };

    // ── Mail ingestion ───────────────────────────────────────────────────
    let ingestion = match MailConfig::from_env() {
        Some(mail_config) => {
            eprintln!(
                "   Mail: enabled (IMAP: {}, sender: {})",
                mail_config.imap_host, mail_config.notification_sender
            );
            let mailbox: Arc<dyn Mailbox> = Arc::new(ImapMailbox::new(mail_config.clone()));
            let pipeline = Arc::new(MailIngestionPipeline::new(
                mail_config.notification_sender.clone(),
                Arc::clone(&mailbox),
            ));
            let listener = spawn_mail_listener(
                mailbox,
                Duration::from_secs(mail_config.poll_interval_secs),
                mail_config.reconnect,
            );
            let sink: Arc<dyn ReviewEventSink> = match &dispatcher {
                Some(d) => Arc::clone(d) as Arc<dyn ReviewEventSink>,
                None => {
                    tracing::warn!("Mail ingestion enabled without chat; review events will only be logged");
                    Arc::new(LoggingSink)
                }
            };
            spawn_ingestion_worker(listener.events, Arc::clone(&pipeline), sink);
            Some(pipeline)
        }
        None => {
            eprintln!("   Mail: disabled");
            None
        }
    };
    eprintln!();

    // ── HTTP control surface ─────────────────────────────────────────────
    let app = app_router(ControlState {
        engines,
        ingestion,
        dispatcher,
    });
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", server_config.port))
        .await
        .with_context(|| format!("Failed to bind control port {}", server_config.port))?;
    tracing::info!(port = server_config.port, "Control server started");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Console logging always; a daily rolling file too when `log_dir` is set.
fn init_tracing(log_dir: Option<&str>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = tracing_subscriber::fmt::layer().with_target(false);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "review-sync.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(console).init();
            None
        }
    }
}
