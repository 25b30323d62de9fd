//! # Catalog Module
//!
//! Durable record of every scan: sessions, directories, files, the scan
//! log and derived duplicate relations.
//!
//! ## Re-scans
//! Every record carries the id of the session that produced it. A re-scan
//! adds a new session with new rows rather than overwriting, so two scans
//! of the same tree can be compared. Readers pick a snapshot with
//! [`SessionSelector`].
//!
//! ## Backends
//! - `SqliteCatalog` - Persistent storage using SQLite

mod records;
mod sqlite;
mod traits;

pub use records::{
    Category, Component, DirectoryRecord, DuplicateRelation, FileRecord, LogLevel,
    PerformanceMetrics, ScanLogEntry, ScanSession, SessionCounts, SessionSelector, SessionStatus,
};
pub use sqlite::SqliteCatalog;
pub use traits::CatalogStore;
