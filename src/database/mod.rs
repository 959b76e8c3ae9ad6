// Storage: SQLite for users, permissions, the document catalog and the audit
// trail; LanceDB for the persisted vector index

pub mod lancedb;
pub mod sqlite;

pub use sqlite::*;
