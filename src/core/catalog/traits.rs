//! Catalog store trait definition.

use super::{
    Category, DirectoryRecord, DuplicateRelation, FileRecord, ScanLogEntry, ScanSession,
    SessionSelector,
};
use crate::error::StoreError;
use std::path::Path;

/// Durable record of files, directories, sessions and logs.
///
/// Records are append-only during a scan. The only in-place mutations are
/// session progress updates and category backfill.
pub trait CatalogStore: Send + Sync {
    /// Cheap connectivity check
    fn ping(&self) -> Result<(), StoreError>;

    /// Store a new session in `running` state
    fn create_session(&self, session: &ScanSession) -> Result<(), StoreError>;

    /// Write counters, metrics, status and end time.
    ///
    /// Fails once the stored session has reached a terminal status.
    fn update_session(&self, session: &ScanSession) -> Result<(), StoreError>;

    fn get_session(&self, id: &str) -> Result<Option<ScanSession>, StoreError>;

    /// Returns the new row id
    fn insert_file(&self, record: &FileRecord) -> Result<i64, StoreError>;

    /// Returns the new directory id. The parent, if any, must already exist.
    fn insert_directory(&self, record: &DirectoryRecord) -> Result<i64, StoreError>;

    fn append_log(&self, entry: &ScanLogEntry) -> Result<(), StoreError>;

    /// Log entries for a session in insertion order
    fn query_logs(&self, session_id: &str) -> Result<Vec<ScanLogEntry>, StoreError>;

    /// Every file in the directory's subtree for the selected session
    fn query_files_by_directory(
        &self,
        path: &Path,
        selector: &SessionSelector,
    ) -> Result<Vec<FileRecord>, StoreError>;

    /// Directories ordered by path
    fn query_directories(&self, selector: &SessionSelector)
        -> Result<Vec<DirectoryRecord>, StoreError>;

    /// The catalogued record for one directory
    fn get_directory(
        &self,
        path: &Path,
        selector: &SessionSelector,
    ) -> Result<Option<DirectoryRecord>, StoreError>;

    /// Most recent session holding a record for this directory
    fn latest_session_for_directory(&self, path: &Path) -> Result<Option<String>, StoreError>;

    /// Assign a category to unassigned files and directories under a prefix.
    ///
    /// Returns the number of file rows changed.
    fn backfill_category(
        &self,
        path_prefix: &Path,
        category: Category,
        selector: &SessionSelector,
    ) -> Result<usize, StoreError>;

    fn insert_duplicate_relation(&self, relation: &DuplicateRelation) -> Result<i64, StoreError>;

    /// Relations for one comparison run, or all of them
    fn list_relations(&self, comparison_run: Option<&str>)
        -> Result<Vec<DuplicateRelation>, StoreError>;
}
