//! Types produced by the mail ingestion pipeline.

use serde::{Deserialize, Serialize};

// ── Raw message ─────────────────────────────────────────────────────

/// One message as read from the mailbox. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMailMessage {
    /// Sender address (bare, without display name).
    pub sender: String,
    /// HTML body.
    pub html: String,
    /// Mailbox-unique id (IMAP UID) used to mark the message consumed.
    pub uid: String,
}

// ── Event kind ──────────────────────────────────────────────────────

/// Lifecycle transition described by a notification's action phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Completed,
    Commented,
    Replied,
    Approved,
    Pushed,
    Abandoned,
    Created,
    AutoComplete,
}

impl EventKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Commented => "commented",
            Self::Replied => "replied",
            Self::Approved => "approved",
            Self::Pushed => "pushed",
            Self::Abandoned => "abandoned",
            Self::Created => "created",
            Self::AutoComplete => "auto-complete",
        }
    }
}

/// Outcome of classifying an action phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Event(EventKind),
    Unrecognized,
}

// ── Parsed event ────────────────────────────────────────────────────

/// Pull request reference located in the title region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRef {
    /// `None` when the link's last path segment is not numeric.
    pub id: Option<i64>,
    pub title: String,
    pub url: String,
}

/// One row of the reviewers table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reviewer {
    pub user: String,
    pub approved: bool,
    pub is_required: bool,
}

/// A commit, either listed in a notification or fetched from the source system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub id: String,
    pub title: String,
    pub author: String,
    /// Timestamp text as rendered by the producer.
    pub created_at: String,
    pub url: String,
}

/// Structured review event extracted from one notification email.
///
/// Optional collections are `None` rather than empty when nothing was parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedReviewEvent {
    /// Raw action phrase, e.g. "Jane Doe approved the pull request".
    pub action: String,
    pub author: String,
    pub kind: EventKind,
    pub pull_request: PullRequestRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewers: Option<Vec<Reviewer>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commits: Option<Vec<CommitRecord>>,
}

impl ParsedReviewEvent {
    pub fn is_created(&self) -> bool {
        self.kind == EventKind::Created
    }

    pub fn is_completed(&self) -> bool {
        self.kind == EventKind::Completed
    }

    pub fn is_commented(&self) -> bool {
        self.kind == EventKind::Commented
    }

    pub fn is_comment_replied(&self) -> bool {
        self.kind == EventKind::Replied
    }

    pub fn is_approved(&self) -> bool {
        self.kind == EventKind::Approved
    }

    pub fn is_updated(&self) -> bool {
        self.kind == EventKind::Pushed
    }

    pub fn is_abandoned(&self) -> bool {
        self.kind == EventKind::Abandoned
    }

    pub fn is_auto_complete(&self) -> bool {
        self.kind == EventKind::AutoComplete
    }

    /// Canonical id used across the replica, chat threads and mappings.
    pub fn canonical_id(&self) -> Option<String> {
        self.pull_request.id.map(|id| id.to_string())
    }
}
