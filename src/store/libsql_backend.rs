//! libSQL backend: async `IdentityStore` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{IdentityMapping, IdentityStore, RecordKind};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

const MAPPING_COLUMNS: &str =
    "canonical_id, kind, replica_record_id, chat_thread_id, author, title, updated_at";

/// Map a libsql Row to an IdentityMapping.
///
/// Column order matches MAPPING_COLUMNS.
fn row_to_mapping(row: &libsql::Row) -> Result<IdentityMapping, libsql::Error> {
    let kind_str: String = row.get(1)?;
    let updated_str: String = row.get(6)?;
    Ok(IdentityMapping {
        canonical_id: row.get(0)?,
        kind: RecordKind::parse(&kind_str).unwrap_or(RecordKind::PullRequest),
        replica_record_id: row.get::<Option<String>>(2)?,
        chat_thread_id: row.get::<Option<String>>(3)?,
        author: row.get(4)?,
        title: row.get(5)?,
        updated_at: parse_datetime(&updated_str),
    })
}

#[async_trait]
impl IdentityStore for LibSqlBackend {
    async fn get_mapping(&self, canonical_id: &str) -> Result<Option<IdentityMapping>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {MAPPING_COLUMNS} FROM identity_mappings WHERE canonical_id = ?1"),
                params![canonical_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_mapping: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_mapping(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("get_mapping row parse: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_mapping: {e}"))),
        }
    }

    async fn upsert_mapping(&self, mapping: &IdentityMapping) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO identity_mappings
                    (canonical_id, kind, replica_record_id, chat_thread_id, author, title, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                 ON CONFLICT(canonical_id) DO UPDATE SET
                    replica_record_id = COALESCE(excluded.replica_record_id, identity_mappings.replica_record_id),
                    chat_thread_id = COALESCE(excluded.chat_thread_id, identity_mappings.chat_thread_id),
                    author = CASE WHEN excluded.author = '' THEN identity_mappings.author ELSE excluded.author END,
                    title = CASE WHEN excluded.title = '' THEN identity_mappings.title ELSE excluded.title END,
                    updated_at = excluded.updated_at",
                params![
                    mapping.canonical_id.as_str(),
                    mapping.kind.as_str(),
                    mapping.replica_record_id.clone(),
                    mapping.chat_thread_id.clone(),
                    mapping.author.as_str(),
                    mapping.title.as_str(),
                    now
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_mapping: {e}")))?;

        debug!(canonical_id = %mapping.canonical_id, kind = mapping.kind.as_str(), "Identity mapping upserted");
        Ok(())
    }

    async fn list_mappings(&self, kind: RecordKind) -> Result<Vec<IdentityMapping>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MAPPING_COLUMNS} FROM identity_mappings WHERE kind = ?1 ORDER BY created_at ASC, canonical_id ASC"
                ),
                params![kind.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_mappings: {e}")))?;

        let mut mappings = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_mappings: {e}")))?
        {
            mappings.push(
                row_to_mapping(&row)
                    .map_err(|e| DatabaseError::Query(format!("list_mappings row parse: {e}")))?,
            );
        }
        Ok(mappings)
    }
}
