//! Mail ingestion pipeline: one raw notification in, at most one review event out.
//!
//! Stages:
//! 1. Sender guard (exact address match, otherwise ignored)
//! 2. Structural region extraction (`extract`)
//! 3. Action classification (`classifier`)
//! 4. Event assembly, then mark the message consumed in the mailbox
//!
//! Every drop is silent to the caller: only mailbox write failures surface
//! as errors.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use scraper::Html;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::MailError;
use crate::mail::classifier::ActionClassifier;
use crate::mail::extract;
use crate::mail::mailbox::Mailbox;
use crate::mail::types::{Classification, ParsedReviewEvent, RawMailMessage};

/// Why a message did or did not produce an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// Sender did not match the configured notification address.
    Ignored,
    /// Title or action region could not be located.
    Incomplete,
    /// Action phrase matched no classification rule.
    Unclassified { action: String },
    Event(ParsedReviewEvent),
}

/// Counters exposed on the control surface.
#[derive(Debug, Default)]
pub struct IngestionStats {
    processed: AtomicU64,
    ignored: AtomicU64,
    incomplete: AtomicU64,
    emitted: AtomicU64,
}

/// Point-in-time copy of [`IngestionStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestionStatsSnapshot {
    pub processed: u64,
    pub ignored: u64,
    pub incomplete: u64,
    pub unclassified: u64,
    pub emitted: u64,
}

pub struct MailIngestionPipeline {
    expected_sender: String,
    classifier: ActionClassifier,
    mailbox: Arc<dyn Mailbox>,
    stats: IngestionStats,
}

impl MailIngestionPipeline {
    pub fn new(expected_sender: impl Into<String>, mailbox: Arc<dyn Mailbox>) -> Self {
        Self {
            expected_sender: expected_sender.into(),
            classifier: ActionClassifier::default(),
            mailbox,
            stats: IngestionStats::default(),
        }
    }

    /// Parse without side effects. Parsing the same message twice yields
    /// identical outcomes.
    pub fn parse(&self, message: &RawMailMessage) -> ParseOutcome {
        if message.sender != self.expected_sender {
            return ParseOutcome::Ignored;
        }
        parse_review_html(&message.html, &self.classifier)
    }

    /// Parse a message and, if it yields an event, mark it consumed.
    pub async fn ingest(
        &self,
        message: &RawMailMessage,
    ) -> Result<Option<ParsedReviewEvent>, MailError> {
        self.stats.processed.fetch_add(1, Ordering::Relaxed);

        match self.parse(message) {
            ParseOutcome::Ignored => {
                self.stats.ignored.fetch_add(1, Ordering::Relaxed);
                debug!(uid = %message.uid, sender = %message.sender, "Ignoring mail from non-notification sender");
                Ok(None)
            }
            ParseOutcome::Incomplete => {
                self.stats.incomplete.fetch_add(1, Ordering::Relaxed);
                debug!(uid = %message.uid, "Notification missing title or action region, dropped");
                Ok(None)
            }
            ParseOutcome::Unclassified { action } => {
                debug!(uid = %message.uid, action = %action, "Notification action unclassified, dropped");
                Ok(None)
            }
            ParseOutcome::Event(event) => {
                self.mailbox
                    .mark_seen(std::slice::from_ref(&message.uid))
                    .await?;
                self.stats.emitted.fetch_add(1, Ordering::Relaxed);
                info!(
                    uid = %message.uid,
                    pull_request = ?event.pull_request.id,
                    kind = event.kind.label(),
                    author = %event.author,
                    "Review event parsed"
                );
                Ok(Some(event))
            }
        }
    }

    pub fn stats(&self) -> IngestionStatsSnapshot {
        IngestionStatsSnapshot {
            processed: self.stats.processed.load(Ordering::Relaxed),
            ignored: self.stats.ignored.load(Ordering::Relaxed),
            incomplete: self.stats.incomplete.load(Ordering::Relaxed),
            unclassified: self.classifier.unclassified_count(),
            emitted: self.stats.emitted.load(Ordering::Relaxed),
        }
    }
}

/// Turn notification HTML into a review event.
pub fn parse_review_html(html: &str, classifier: &ActionClassifier) -> ParseOutcome {
    let doc = Html::parse_document(html);
    let regions = extract::locate_regions(&doc);

    let Some(pull_request) = regions.title.and_then(extract::pull_request_ref) else {
        return ParseOutcome::Incomplete;
    };
    let Some(action) = regions.action.and_then(extract::action_phrase) else {
        return ParseOutcome::Incomplete;
    };

    let author = extract::extract_person_name(&action);
    let kind = match classifier.classify(&action, &author) {
        Classification::Event(kind) => kind,
        Classification::Unrecognized => return ParseOutcome::Unclassified { action },
    };

    let comment = regions
        .comment
        .map(extract::comment_text)
        .filter(|c| !c.is_empty());
    let reviewers = regions
        .reviewers
        .map(extract::reviewers)
        .filter(|r| !r.is_empty());
    let commits = regions
        .commits
        .map(extract::commits)
        .filter(|c| !c.is_empty());

    ParseOutcome::Event(ParsedReviewEvent {
        action,
        author,
        kind,
        pull_request,
        comment,
        reviewers,
        commits,
    })
}
