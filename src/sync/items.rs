//! Snapshot items exchanged between the source and the replica.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Replica-owned metadata. Never part of equality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplicaMeta {
    pub record_id: String,
    pub created_time: Option<DateTime<Utc>>,
    pub author_id: Option<String>,
}

/// One record in a snapshot: canonical id, source-owned fields, and replica
/// metadata when the item was read from (or written to) the replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExchangeItem<F> {
    pub canonical_id: String,
    pub fields: F,
    pub meta: Option<ReplicaMeta>,
}

impl<F> ExchangeItem<F> {
    pub fn from_source(canonical_id: impl Into<String>, fields: F) -> Self {
        Self {
            canonical_id: canonical_id.into(),
            fields,
            meta: None,
        }
    }
}

/// Coarse equality: every source item is present in `replica` with equal
/// fields. Order-insensitive; extra replica items are ignored since the
/// replica is never pruned.
pub fn snapshots_match<F: PartialEq>(source: &[ExchangeItem<F>], replica: &[ExchangeItem<F>]) -> bool {
    let by_id: HashMap<&str, &F> = replica
        .iter()
        .map(|item| (item.canonical_id.as_str(), &item.fields))
        .collect();
    source
        .iter()
        .all(|item| by_id.get(item.canonical_id.as_str()) == Some(&&item.fields))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, title: &str) -> ExchangeItem<String> {
        ExchangeItem::from_source(id, title.to_string())
    }

    #[test]
    fn match_ignores_order_and_meta() {
        let source = vec![item("1", "a"), item("2", "b")];
        let mut replica = vec![item("2", "b"), item("1", "a")];
        replica[0].meta = Some(ReplicaMeta {
            record_id: "page-2".into(),
            created_time: None,
            author_id: Some("u".into()),
        });
        assert!(snapshots_match(&source, &replica));
    }

    #[test]
    fn changed_field_breaks_match() {
        let source = vec![item("1", "a2")];
        let replica = vec![item("1", "a")];
        assert!(!snapshots_match(&source, &replica));
    }

    #[test]
    fn missing_item_breaks_match() {
        assert!(!snapshots_match(&[item("1", "a")], &[]));
    }

    #[test]
    fn extra_replica_items_are_fine() {
        assert!(snapshots_match(&[item("1", "a")], &[item("1", "a"), item("9", "z")]));
        assert!(snapshots_match::<String>(&[], &[]));
    }
}
