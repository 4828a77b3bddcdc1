//! Persistence layer: libSQL-backed identity mappings.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{IdentityMapping, IdentityStore, RecordKind};
