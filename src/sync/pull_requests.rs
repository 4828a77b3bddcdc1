//! Pull request reconciliation: source pull requests → workflow collection.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::clients::{
    PropertyValue, RecordDraft, SourceClient, SourcePullRequest, StatusFilter, WorkflowRecord,
};
use crate::error::SyncError;
use crate::store::RecordKind;
use crate::sync::engine::{Reconciler, within_active_hours};
use crate::sync::items::{ExchangeItem, snapshots_match};
use crate::sync::replica::{ReplicaFields, WorkflowReplica};

const TITLE: &str = "Name";
const AUTHOR: &str = "Author";
const STATUS: &str = "Status";
const MERGE_STATUS: &str = "Merge Status";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestFields {
    pub title: String,
    pub author: String,
    pub status: String,
    /// Empty when the source reports none.
    pub merge_status: String,
}

impl From<&SourcePullRequest> for PullRequestFields {
    fn from(pr: &SourcePullRequest) -> Self {
        Self {
            title: pr.title.clone(),
            author: pr.author.clone(),
            status: pr.status.as_str().to_string(),
            merge_status: pr.merge_status.clone().unwrap_or_default(),
        }
    }
}

impl ReplicaFields for PullRequestFields {
    const KIND: RecordKind = RecordKind::PullRequest;

    fn to_draft(&self) -> RecordDraft {
        RecordDraft::new()
            .with(TITLE, PropertyValue::Title(self.title.clone()))
            .with(AUTHOR, PropertyValue::Text(self.author.clone()))
            .with(STATUS, PropertyValue::Select(self.status.clone()))
            .with(MERGE_STATUS, PropertyValue::Text(self.merge_status.clone()))
    }

    fn from_record(record: &WorkflowRecord) -> Option<Self> {
        Some(Self {
            title: record.field(TITLE)?.to_string(),
            author: record.field(AUTHOR).unwrap_or_default().to_string(),
            status: record.field(STATUS).unwrap_or_default().to_string(),
            merge_status: record.field(MERGE_STATUS).unwrap_or_default().to_string(),
        })
    }

    fn author(&self) -> &str {
        &self.author
    }

    fn title(&self) -> &str {
        &self.title
    }
}

pub type PullRequestItem = ExchangeItem<PullRequestFields>;

pub struct PullRequestReconciler {
    source: Arc<dyn SourceClient>,
    replica: WorkflowReplica,
    page_size: u32,
    active_hours: Option<(u32, u32)>,
}

impl PullRequestReconciler {
    pub fn new(
        source: Arc<dyn SourceClient>,
        replica: WorkflowReplica,
        page_size: u32,
        active_hours: Option<(u32, u32)>,
    ) -> Self {
        Self {
            source,
            replica,
            page_size,
            active_hours,
        }
    }
}

#[async_trait]
impl Reconciler for PullRequestReconciler {
    type Item = PullRequestItem;

    fn name(&self) -> &'static str {
        "pull-requests"
    }

    async fn fetch_source(&self) -> Result<Vec<PullRequestItem>, SyncError> {
        let prs = self
            .source
            .list_pull_requests(StatusFilter::All, self.page_size)
            .await
            .map_err(SyncError::FetchSource)?;
        Ok(prs
            .iter()
            .map(|pr| ExchangeItem::from_source(pr.id.to_string(), PullRequestFields::from(pr)))
            .collect())
    }

    async fn fetch_replica(&self) -> Result<Vec<PullRequestItem>, SyncError> {
        self.replica.fetch().await
    }

    fn is_equal(&self, source: &[PullRequestItem], replica: &[PullRequestItem]) -> bool {
        snapshots_match(source, replica)
    }

    async fn insert(
        &self,
        source: &[PullRequestItem],
        replica: &[PullRequestItem],
    ) -> Result<Vec<PullRequestItem>, SyncError> {
        self.replica.upsert(source, replica).await
    }

    fn should_fetch(&self, now: DateTime<Utc>) -> bool {
        within_active_hours(self.active_hours, now)
    }
}
