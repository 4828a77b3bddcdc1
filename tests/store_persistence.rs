//! Identity mappings on a file-backed database survive reopening.

use review_sync::store::{IdentityMapping, IdentityStore, LibSqlBackend, RecordKind};

#[tokio::test]
async fn mappings_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("review-sync.db");

    {
        let store = LibSqlBackend::new_local(&path).await.unwrap();
        store
            .upsert_mapping(
                &IdentityMapping::new("42", RecordKind::PullRequest, "Jane Doe", "Add login")
                    .with_replica_record("rec-1"),
            )
            .await
            .unwrap();
        store
            .upsert_mapping(
                &IdentityMapping::new("42", RecordKind::PullRequest, "", "").with_chat_thread("t-9"),
            )
            .await
            .unwrap();
    }

    // Migrations run again on reopen and must be no-ops.
    let store = LibSqlBackend::new_local(&path).await.unwrap();
    let mapping = store.get_mapping("42").await.unwrap().unwrap();
    assert_eq!(mapping.kind, RecordKind::PullRequest);
    assert_eq!(mapping.author, "Jane Doe");
    assert_eq!(mapping.title, "Add login");
    assert_eq!(mapping.replica_record_id.as_deref(), Some("rec-1"));
    assert_eq!(mapping.chat_thread_id.as_deref(), Some("t-9"));

    let all = store.list_mappings(RecordKind::PullRequest).await.unwrap();
    assert_eq!(all.len(), 1);
    assert!(store.list_mappings(RecordKind::Commit).await.unwrap().is_empty());
}
