//! Unreviewed-commit reconciliation: recent feature/fix commits that never
//! went through a pull request are mirrored into a workflow collection.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::clients::{
    PropertyValue, PullRequestStatus, RecordDraft, SourceClient, SourceCommit, StatusFilter,
    WorkflowRecord,
};
use crate::error::SyncError;
use crate::mail::CommitRecord;
use crate::store::RecordKind;
use crate::sync::engine::{Reconciler, within_active_hours};
use crate::sync::gap::{GAP_WINDOW_DAYS, detect_unreviewed_commits, is_gap_candidate};
use crate::sync::items::{ExchangeItem, snapshots_match};
use crate::sync::replica::{ReplicaFields, WorkflowReplica};

const TITLE: &str = "Name";
const AUTHOR: &str = "Author";
const LINK: &str = "Link";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitFields {
    pub title: String,
    pub author: String,
    pub url: String,
}

impl ReplicaFields for CommitFields {
    const KIND: RecordKind = RecordKind::Commit;

    fn to_draft(&self) -> RecordDraft {
        RecordDraft::new()
            .with(TITLE, PropertyValue::Title(self.title.clone()))
            .with(AUTHOR, PropertyValue::Text(self.author.clone()))
            .with(LINK, PropertyValue::Url(self.url.clone()))
    }

    fn from_record(record: &WorkflowRecord) -> Option<Self> {
        Some(Self {
            title: record.field(TITLE)?.to_string(),
            author: record.field(AUTHOR).unwrap_or_default().to_string(),
            url: record.field(LINK).unwrap_or_default().to_string(),
        })
    }

    fn author(&self) -> &str {
        &self.author
    }

    fn title(&self) -> &str {
        &self.title
    }
}

pub type CommitItem = ExchangeItem<CommitFields>;

/// First line of a commit message.
fn commit_record(commit: &SourceCommit) -> CommitRecord {
    CommitRecord {
        id: commit.id.clone(),
        title: commit.message.lines().next().unwrap_or_default().trim().to_string(),
        author: commit.author.clone(),
        created_at: commit.author_date.to_rfc3339(),
        url: commit.url.clone(),
    }
}

pub struct CommitReconciler {
    source: Arc<dyn SourceClient>,
    replica: WorkflowReplica,
    branch: String,
    page_size: u32,
    active_hours: Option<(u32, u32)>,
}

impl CommitReconciler {
    pub fn new(
        source: Arc<dyn SourceClient>,
        replica: WorkflowReplica,
        branch: impl Into<String>,
        page_size: u32,
        active_hours: Option<(u32, u32)>,
    ) -> Self {
        Self {
            source,
            replica,
            branch: branch.into(),
            page_size,
            active_hours,
        }
    }
}

#[async_trait]
impl Reconciler for CommitReconciler {
    type Item = CommitItem;

    fn name(&self) -> &'static str {
        "commits"
    }

    async fn fetch_source(&self) -> Result<Vec<CommitItem>, SyncError> {
        let now = Utc::now();
        let commits = self
            .source
            .list_commits(&self.branch, now - Duration::days(GAP_WINDOW_DAYS))
            .await
            .map_err(SyncError::FetchSource)?;

        let candidates: Vec<CommitRecord> = commits
            .iter()
            .filter(|c| is_gap_candidate(&c.message, c.author_date, now))
            .map(commit_record)
            .collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let merged = self
            .source
            .list_pull_requests(StatusFilter::Only(PullRequestStatus::Completed), self.page_size)
            .await
            .map_err(SyncError::FetchSource)?;

        let gaps = detect_unreviewed_commits(&candidates, &merged);
        tracing::debug!(
            candidates = candidates.len(),
            unreviewed = gaps.len(),
            "Commit gap scan complete"
        );

        Ok(gaps
            .into_iter()
            .map(|c| {
                ExchangeItem::from_source(
                    c.id,
                    CommitFields {
                        title: c.title,
                        author: c.author,
                        url: c.url,
                    },
                )
            })
            .collect())
    }

    async fn fetch_replica(&self) -> Result<Vec<CommitItem>, SyncError> {
        self.replica.fetch().await
    }

    fn is_equal(&self, source: &[CommitItem], replica: &[CommitItem]) -> bool {
        snapshots_match(source, replica)
    }

    async fn insert(
        &self,
        source: &[CommitItem],
        replica: &[CommitItem],
    ) -> Result<Vec<CommitItem>, SyncError> {
        self.replica.upsert(source, replica).await
    }

    fn should_fetch(&self, now: DateTime<Utc>) -> bool {
        within_active_hours(self.active_hours, now)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::clients::SourcePullRequest;
    use crate::error::ClientError;
    use crate::store::{IdentityStore, LibSqlBackend};
    use crate::sync::engine::ReconciliationEngine;
    use crate::sync::replica::testing::MemoryWorkflow;

    struct StubSource {
        commits: Vec<SourceCommit>,
        merged: Vec<SourcePullRequest>,
        pr_queries: AtomicUsize,
    }

    #[async_trait]
    impl SourceClient for StubSource {
        async fn list_pull_requests(
            &self,
            status: StatusFilter,
            _top: u32,
        ) -> Result<Vec<SourcePullRequest>, ClientError> {
            assert_eq!(status, StatusFilter::Only(PullRequestStatus::Completed));
            self.pr_queries.fetch_add(1, Ordering::SeqCst);
            Ok(self.merged.clone())
        }

        async fn list_commits(
            &self,
            branch: &str,
            _since: DateTime<Utc>,
        ) -> Result<Vec<SourceCommit>, ClientError> {
            assert_eq!(branch, "main");
            Ok(self.commits.clone())
        }
    }

    fn commit(id: &str, message: &str, days_ago: i64) -> SourceCommit {
        SourceCommit {
            id: id.into(),
            message: message.into(),
            author: "Jane Doe".into(),
            author_date: Utc::now() - Duration::days(days_ago),
            url: format!("https://dev.example.com/commit/{id}"),
        }
    }

    fn merged_pr(merge_commit: &str) -> SourcePullRequest {
        SourcePullRequest {
            id: 1,
            title: "t".into(),
            author: "a".into(),
            status: PullRequestStatus::Completed,
            merge_status: Some("succeeded".into()),
            merge_commit_id: Some(merge_commit.into()),
            url: String::new(),
        }
    }

    async fn reconciler(
        source: Arc<StubSource>,
    ) -> (CommitReconciler, Arc<MemoryWorkflow>, Arc<LibSqlBackend>) {
        let workflow = Arc::new(MemoryWorkflow::default());
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let reconciler = CommitReconciler::new(
            source,
            WorkflowReplica::new(workflow.clone(), store.clone(), "commits"),
            "main",
            100,
            None,
        );
        (reconciler, workflow, store)
    }

    #[tokio::test]
    async fn source_is_filtered_gap_set() {
        let (reconciler, _workflow, _store) = reconciler(Arc::new(StubSource {
            commits: vec![
                commit("a", "feat: merged through PR", 1),
                commit("b", "fix: hotfix pushed directly\n\nlong body", 2),
                commit("c", "chore: bump", 1),
                commit("d", "feat: ancient", 40),
            ],
            merged: vec![merged_pr("a")],
            pr_queries: AtomicUsize::new(0),
        }))
        .await;

        let items = reconciler.fetch_source().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].canonical_id, "b");
        assert_eq!(items[0].fields.title, "fix: hotfix pushed directly");
    }

    #[tokio::test]
    async fn no_candidates_skips_pull_request_query() {
        let source = Arc::new(StubSource {
            commits: vec![commit("c", "docs: readme", 1)],
            merged: vec![],
            pr_queries: AtomicUsize::new(0),
        });
        let (reconciler, _workflow, _store) = reconciler(source.clone()).await;
        assert!(reconciler.fetch_source().await.unwrap().is_empty());
        assert_eq!(source.pr_queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn gaps_are_mirrored_with_mappings() {
        let (reconciler, workflow, store) = reconciler(Arc::new(StubSource {
            commits: vec![commit("b", "fix: direct push", 1)],
            merged: vec![],
            pr_queries: AtomicUsize::new(0),
        }))
        .await;
        let engine = ReconciliationEngine::new(reconciler, 1_000);

        engine.tick(Utc::now()).await.unwrap();

        let records = workflow.records_in("commits");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].field("Link"), Some("https://dev.example.com/commit/b"));
        let mapping = store.get_mapping("b").await.unwrap().unwrap();
        assert_eq!(mapping.kind, RecordKind::Commit);
    }
}
