//! Mailbox listener and ingestion worker.
//!
//! The listener polls the mailbox and pushes `MailboxEvent`s into a channel;
//! the ingestion worker drains that channel one message at a time through the
//! pipeline and hands resulting events to a sink. The two halves share no
//! state besides the channel.

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use crate::error::MailError;
use crate::mail::mailbox::Mailbox;
use crate::mail::pipeline::MailIngestionPipeline;
use crate::mail::types::RawMailMessage;
use crate::notify::ReviewEventSink;

/// Listener channel capacity.
const CHANNEL_CAPACITY: usize = 64;

/// What the listener pushes to the ingestion worker.
#[derive(Debug)]
pub enum MailboxEvent {
    Mail(RawMailMessage),
    /// Listener failed and will stop; always followed by `End`.
    Error(MailError),
    End,
}

pub type MailStream = Pin<Box<dyn Stream<Item = MailboxEvent> + Send>>;

/// Handle to a running listener.
pub struct MailListener {
    pub events: MailStream,
    pub handle: JoinHandle<()>,
    /// Set to stop polling at the next tick.
    pub shutdown: Arc<AtomicBool>,
}

/// Spawn a background task polling `mailbox` every `poll_interval`.
///
/// Each unseen UID is emitted once per process lifetime. Transport failures
/// are retried on the next tick only when `reconnect` is set; any other
/// failure emits `Error` then `End` and stops the listener for good.
pub fn spawn_mail_listener(
    mailbox: Arc<dyn Mailbox>,
    poll_interval: Duration,
    reconnect: bool,
) -> MailListener {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(
            "Mail listener started, polling every {}s (reconnect: {reconnect})",
            poll_interval.as_secs()
        );

        let mut tick = tokio::time::interval(poll_interval);
        let mut emitted: HashSet<String> = HashSet::new();

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Mail listener shutting down");
                let _ = tx.send(MailboxEvent::End).await;
                return;
            }

            match mailbox.fetch_unseen().await {
                Ok(messages) => {
                    // Anything no longer unseen has been consumed or deleted.
                    let current: HashSet<&str> = messages.iter().map(|m| m.uid.as_str()).collect();
                    emitted.retain(|uid| current.contains(uid.as_str()));

                    for message in messages {
                        if !emitted.insert(message.uid.clone()) {
                            continue;
                        }
                        debug!(uid = %message.uid, sender = %message.sender, "Mail received");
                        if tx.send(MailboxEvent::Mail(message)).await.is_err() {
                            info!("Mail event channel closed, listener exiting");
                            return;
                        }
                    }
                }
                Err(e) if reconnect && e.is_transport() => {
                    warn!(error = %e, "Mailbox transport failed, reconnecting on next poll");
                }
                Err(e) => {
                    error!(error = %e, "Mailbox listener stopped");
                    let _ = tx.send(MailboxEvent::Error(e)).await;
                    let _ = tx.send(MailboxEvent::End).await;
                    return;
                }
            }
        }
    });

    MailListener {
        events: Box::pin(ReceiverStream::new(rx)),
        handle,
        shutdown: shutdown_flag,
    }
}

/// Spawn the worker draining `events` sequentially through `pipeline`.
pub fn spawn_ingestion_worker(
    mut events: MailStream,
    pipeline: Arc<MailIngestionPipeline>,
    sink: Arc<dyn ReviewEventSink>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                MailboxEvent::Mail(message) => match pipeline.ingest(&message).await {
                    Ok(Some(review)) => sink.handle_review(review).await,
                    Ok(None) => {}
                    Err(e) => warn!(uid = %message.uid, error = %e, "Failed to mark notification consumed"),
                },
                MailboxEvent::Error(e) => {
                    error!(error = %e, "Mailbox reported a fatal error");
                }
                MailboxEvent::End => {
                    info!("Mailbox closed, ingestion worker exiting");
                    break;
                }
            }
        }
    })
}
