//! Reading and best-effort upserting of a workflow collection.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::clients::{PropertyValue, RecordDraft, WorkflowClient, WorkflowRecord};
use crate::error::SyncError;
use crate::store::{IdentityMapping, IdentityStore, RecordKind};
use crate::sync::items::{ExchangeItem, ReplicaMeta};

/// Text property holding the canonical id on every replica record.
pub const CANONICAL_ID_PROPERTY: &str = "Canonical ID";

/// Source-owned fields and how they map onto replica properties.
pub trait ReplicaFields: Clone + PartialEq + Send + Sync + 'static {
    const KIND: RecordKind;

    /// Properties to write, not including the canonical id.
    fn to_draft(&self) -> RecordDraft;

    /// Read fields back from a record. `None` for records we cannot interpret.
    fn from_record(record: &WorkflowRecord) -> Option<Self>;

    fn author(&self) -> &str;

    fn title(&self) -> &str;
}

/// One workflow collection viewed as a snapshot of `ExchangeItem<F>`.
pub struct WorkflowReplica {
    workflow: Arc<dyn WorkflowClient>,
    store: Arc<dyn IdentityStore>,
    collection: String,
}

impl WorkflowReplica {
    pub fn new(
        workflow: Arc<dyn WorkflowClient>,
        store: Arc<dyn IdentityStore>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            workflow,
            store,
            collection: collection.into(),
        }
    }

    /// Every interpretable record carrying a canonical id.
    pub async fn fetch<F: ReplicaFields>(&self) -> Result<Vec<ExchangeItem<F>>, SyncError> {
        let records = self
            .workflow
            .query_all(&self.collection)
            .await
            .map_err(SyncError::FetchReplica)?;

        Ok(records
            .iter()
            .filter_map(|record| {
                let canonical_id = record.field(CANONICAL_ID_PROPERTY).filter(|id| !id.is_empty())?;
                Some(ExchangeItem {
                    canonical_id: canonical_id.to_string(),
                    fields: F::from_record(record)?,
                    meta: Some(meta_of(record)),
                })
            })
            .collect())
    }

    /// Create or update every source item that differs from the replica.
    ///
    /// Writes are best-effort per item: a failed write is logged and the stale
    /// replica item is kept so the next tick sees the difference again. A
    /// failed mapping update after a successful write is logged and counted
    /// but the written record still enters the snapshot. Fails only when every
    /// attempted item failed.
    pub async fn upsert<F: ReplicaFields>(
        &self,
        source: &[ExchangeItem<F>],
        replica: &[ExchangeItem<F>],
    ) -> Result<Vec<ExchangeItem<F>>, SyncError> {
        let mut snapshot: Vec<ExchangeItem<F>> = replica.to_vec();
        let position: HashMap<String, usize> = snapshot
            .iter()
            .enumerate()
            .map(|(i, item)| (item.canonical_id.clone(), i))
            .collect();

        let mut attempted = 0usize;
        let mut failed = 0usize;
        let mut last_error = String::new();

        for item in source {
            let existing = position.get(&item.canonical_id).map(|&i| &snapshot[i]);
            if existing.is_some_and(|r| r.fields == item.fields) {
                continue;
            }
            attempted += 1;

            let draft = item
                .fields
                .to_draft()
                .with(CANONICAL_ID_PROPERTY, PropertyValue::Text(item.canonical_id.clone()));
            let record_id = existing.and_then(|r| r.meta.as_ref()).map(|m| m.record_id.clone());

            let written = match &record_id {
                Some(id) => self.workflow.update_record(id, &draft).await,
                None => self.workflow.create_record(&self.collection, &draft).await,
            };

            let record = match written {
                Ok(record) => record,
                Err(e) => {
                    warn!(
                        canonical_id = %item.canonical_id,
                        collection = %self.collection,
                        error = %e,
                        "Replica write failed, will retry next tick"
                    );
                    failed += 1;
                    last_error = e.to_string();
                    continue;
                }
            };

            let mapped = self
                .store
                .upsert_mapping(
                    &IdentityMapping::new(
                        &item.canonical_id,
                        F::KIND,
                        item.fields.author(),
                        item.fields.title(),
                    )
                    .with_replica_record(&record.id),
                )
                .await;

            match mapped {
                Ok(()) => debug!(
                    canonical_id = %item.canonical_id,
                    record_id = %record.id,
                    created = record_id.is_none(),
                    "Replica record written"
                ),
                // The record exists either way, so the snapshot still takes it.
                Err(e) => {
                    warn!(
                        canonical_id = %item.canonical_id,
                        record_id = %record.id,
                        error = %e,
                        "Identity mapping update failed after replica write"
                    );
                    failed += 1;
                    last_error = e.to_string();
                }
            }

            let updated = ExchangeItem {
                canonical_id: item.canonical_id.clone(),
                fields: item.fields.clone(),
                meta: Some(meta_of(&record)),
            };
            match position.get(&item.canonical_id) {
                Some(&i) => snapshot[i] = updated,
                None => snapshot.push(updated),
            }
        }

        if attempted > 0 && failed == attempted {
            return Err(SyncError::Insert {
                attempted,
                last: last_error,
            });
        }
        Ok(snapshot)
    }
}

fn meta_of(record: &WorkflowRecord) -> ReplicaMeta {
    ReplicaMeta {
        record_id: record.id.clone(),
        created_time: record.created_time,
        author_id: record.created_by.clone(),
    }
}
