//! Review-notification ingestion: mailbox, HTML extraction and classification.

pub mod classifier;
pub mod extract;
pub mod listener;
pub mod mailbox;
pub mod pipeline;
pub mod types;

pub use classifier::{ActionClassifier, ActionRule};
pub use listener::{MailListener, MailStream, MailboxEvent, spawn_ingestion_worker, spawn_mail_listener};
pub use mailbox::{ImapMailbox, Mailbox};
pub use pipeline::{IngestionStatsSnapshot, MailIngestionPipeline, ParseOutcome, parse_review_html};
pub use types::{
    Classification, CommitRecord, EventKind, ParsedReviewEvent, PullRequestRef, RawMailMessage, Reviewer,
};
