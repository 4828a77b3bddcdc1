//! `IdentityStore` trait. Mappings are the only state that survives a restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::DatabaseError;

/// What a canonical id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    PullRequest,
    Commit,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PullRequest => "pull_request",
            Self::Commit => "commit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pull_request" => Some(Self::PullRequest),
            "commit" => Some(Self::Commit),
            _ => None,
        }
    }
}

/// Cross-reference between a canonical id, its replica record and its chat thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityMapping {
    pub canonical_id: String,
    pub kind: RecordKind,
    pub replica_record_id: Option<String>,
    pub chat_thread_id: Option<String>,
    pub author: String,
    pub title: String,
    pub updated_at: DateTime<Utc>,
}

impl IdentityMapping {
    pub fn new(canonical_id: &str, kind: RecordKind, author: &str, title: &str) -> Self {
        Self {
            canonical_id: canonical_id.to_string(),
            kind,
            replica_record_id: None,
            chat_thread_id: None,
            author: author.to_string(),
            title: title.to_string(),
            updated_at: Utc::now(),
        }
    }

    pub fn with_replica_record(mut self, record_id: &str) -> Self {
        self.replica_record_id = Some(record_id.to_string());
        self
    }

    pub fn with_chat_thread(mut self, thread_id: &str) -> Self {
        self.chat_thread_id = Some(thread_id.to_string());
        self
    }
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn get_mapping(&self, canonical_id: &str) -> Result<Option<IdentityMapping>, DatabaseError>;

    /// Insert or merge a mapping.
    ///
    /// `None` ids never overwrite a stored id; author and title are replaced
    /// only when non-empty.
    async fn upsert_mapping(&self, mapping: &IdentityMapping) -> Result<(), DatabaseError>;

    /// All mappings of one kind, oldest first.
    async fn list_mappings(&self, kind: RecordKind) -> Result<Vec<IdentityMapping>, DatabaseError>;
}
