//! SQLite catalog backend.

use super::{
    CatalogStore, Category, Component, DirectoryRecord, DuplicateRelation, FileRecord, LogLevel,
    ScanLogEntry, ScanSession, SessionSelector, SessionStatus,
};
use crate::core::comparator::MatchClass;
use crate::core::scanner::PhotoFormat;
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS scan_sessions (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        scan_type TEXT NOT NULL,
        targets TEXT NOT NULL,
        started_at TEXT NOT NULL,
        ended_at TEXT,
        status TEXT NOT NULL,
        counts TEXT NOT NULL,
        metrics TEXT NOT NULL,
        failure_cause TEXT
    );

    CREATE TABLE IF NOT EXISTS scan_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL REFERENCES scan_sessions(id),
        logged_at TEXT NOT NULL,
        level TEXT NOT NULL,
        component TEXT NOT NULL,
        message TEXT NOT NULL,
        filepath TEXT,
        detail TEXT
    );

    CREATE TABLE IF NOT EXISTS directories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        dirpath TEXT NOT NULL,
        parent_id INTEGER REFERENCES directories(id),
        depth INTEGER NOT NULL,
        category TEXT,
        session_id TEXT NOT NULL REFERENCES scan_sessions(id),
        UNIQUE(dirpath, session_id)
    );

    CREATE TABLE IF NOT EXISTS files (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        filename TEXT NOT NULL,
        filepath TEXT NOT NULL,
        directory TEXT NOT NULL,
        format TEXT NOT NULL,
        size INTEGER NOT NULL,
        created_at TEXT,
        modified_at TEXT,
        metadata TEXT NOT NULL,
        metadata_source TEXT,
        category TEXT,
        session_id TEXT NOT NULL REFERENCES scan_sessions(id),
        UNIQUE(filepath, session_id)
    );

    CREATE TABLE IF NOT EXISTS duplicate_relations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        reference_id INTEGER NOT NULL REFERENCES directories(id),
        candidate_id INTEGER NOT NULL REFERENCES directories(id),
        match_type TEXT NOT NULL,
        match_percentage INTEGER NOT NULL,
        comparison_run TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_files_directory ON files(directory, session_id);
    CREATE INDEX IF NOT EXISTS idx_directories_path ON directories(dirpath);
    CREATE INDEX IF NOT EXISTS idx_logs_session ON scan_logs(session_id);
    CREATE INDEX IF NOT EXISTS idx_relations_run ON duplicate_relations(comparison_run);
";

/// SQLite-backed catalog
///
/// Uses WAL mode so comparisons can read while a scan writes.
pub struct SqliteCatalog {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteCatalog {
    /// Open or create a catalog database at the given path
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let open_failed = |reason: String| StoreError::OpenFailed {
            path: path.to_path_buf(),
            reason,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| open_failed(e.to_string()))?;
        }

        let conn = Connection::open(path).map_err(|e| open_failed(e.to_string()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| open_failed(e.to_string()))?;

        Self::init(conn, Some(path.to_path_buf()))
    }

    /// A private catalog that lives as long as this value
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::OpenFailed {
            path: PathBuf::from(":memory:"),
            reason: e.to_string(),
        })?;

        Self::init(conn, None)
    }

    fn init(conn: Connection, db_path: Option<PathBuf>) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    /// File backing this catalog, `None` when in memory
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("catalog connection lock poisoned".to_string()))
    }
}

/// Canonical text form of a path: no trailing separator, no `.` segments
fn path_key(path: &Path) -> String {
    path.components()
        .collect::<PathBuf>()
        .to_string_lossy()
        .into_owned()
}

/// Prefix that every path strictly below `key` starts with
fn subtree_prefix(key: &str) -> String {
    if key.ends_with(MAIN_SEPARATOR) {
        key.to_string()
    } else {
        format!("{}{}", key, MAIN_SEPARATOR)
    }
}

fn time_to_text(time: &DateTime<Utc>) -> String {
    time.to_rfc3339()
}

fn text_to_time(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let text: Option<String> = row.get(idx)?;
    Ok(text.as_deref().and_then(text_to_time))
}

fn category_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Category>> {
    let text: Option<String> = row.get(idx)?;
    Ok(text.as_deref().and_then(Category::parse))
}

const SESSION_COLUMNS: &str =
    "id, scan_type, targets, started_at, ended_at, status, counts, metrics, failure_cause";

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<ScanSession> {
    let started: String = row.get(3)?;
    let status: String = row.get(5)?;

    Ok(ScanSession {
        id: row.get(0)?,
        scan_type: row.get(1)?,
        targets: json_column(row, 2)?,
        started_at: text_to_time(&started)
            .ok_or_else(|| conversion_error(3, format!("bad timestamp: {}", started)))?,
        ended_at: time_column(row, 4)?,
        status: SessionStatus::parse(&status)
            .ok_or_else(|| conversion_error(5, format!("unknown status: {}", status)))?,
        counts: json_column(row, 6)?,
        metrics: json_column(row, 7)?,
        failure_cause: row.get(8)?,
    })
}

const DIRECTORY_COLUMNS: &str = "d.id, d.dirpath, d.parent_id, d.depth, d.category, d.session_id";

fn directory_from_row(row: &Row<'_>) -> rusqlite::Result<DirectoryRecord> {
    Ok(DirectoryRecord {
        id: Some(row.get(0)?),
        path: PathBuf::from(row.get::<_, String>(1)?),
        parent_id: row.get(2)?,
        depth: row.get::<_, i64>(3)? as usize,
        category: category_column(row, 4)?,
        session_id: row.get(5)?,
    })
}

const FILE_COLUMNS: &str = "filename, filepath, directory, format, size, created_at, modified_at,
     metadata, metadata_source, category, session_id";

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        filename: row.get(0)?,
        path: PathBuf::from(row.get::<_, String>(1)?),
        directory: PathBuf::from(row.get::<_, String>(2)?),
        format: PhotoFormat::from_extension(&row.get::<_, String>(3)?),
        size: row.get::<_, i64>(4)? as u64,
        created: time_column(row, 5)?,
        modified: time_column(row, 6)?,
        metadata: json_column(row, 7)?,
        metadata_source: row.get(8)?,
        category: category_column(row, 9)?,
        session_id: row.get(10)?,
    })
}

fn log_from_row(row: &Row<'_>) -> rusqlite::Result<ScanLogEntry> {
    let logged: String = row.get(1)?;
    let level: String = row.get(2)?;
    let component: String = row.get(3)?;
    let detail: Option<String> = row.get(6)?;

    Ok(ScanLogEntry {
        session_id: row.get(0)?,
        logged_at: text_to_time(&logged)
            .ok_or_else(|| conversion_error(1, format!("bad timestamp: {}", logged)))?,
        level: LogLevel::parse(&level)
            .ok_or_else(|| conversion_error(2, format!("unknown level: {}", level)))?,
        component: Component::parse(&component)
            .ok_or_else(|| conversion_error(3, format!("unknown component: {}", component)))?,
        message: row.get(4)?,
        path: row.get::<_, Option<String>>(5)?.map(PathBuf::from),
        detail: match detail {
            Some(text) => Some(serde_json::from_str(&text).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e))
            })?),
            None => None,
        },
    })
}

fn relation_from_row(row: &Row<'_>) -> rusqlite::Result<DuplicateRelation> {
    let match_type: String = row.get(4)?;

    Ok(DuplicateRelation {
        reference_id: row.get(0)?,
        candidate_id: row.get(1)?,
        reference_path: row.get::<_, Option<String>>(2)?.map(PathBuf::from),
        candidate_path: row.get::<_, Option<String>>(3)?.map(PathBuf::from),
        match_type: MatchClass::parse(&match_type)
            .ok_or_else(|| conversion_error(4, format!("unknown match type: {}", match_type)))?,
        match_percentage: row.get::<_, i64>(5)? as u32,
        comparison_run: row.get(6)?,
    })
}

/// Most recent session that catalogued `key`
fn latest_session(conn: &Connection, key: &str) -> Result<Option<String>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT d.session_id FROM directories d
             JOIN scan_sessions s ON s.id = d.session_id
             WHERE d.dirpath = ?
             ORDER BY s.seq DESC LIMIT 1",
            [key],
            |row| row.get(0),
        )
        .optional()?)
}

/// Resolve a selector for one directory key
fn resolve_session(
    conn: &Connection,
    key: &str,
    selector: &SessionSelector,
) -> Result<Option<String>, StoreError> {
    match selector {
        SessionSelector::Session(id) => Ok(Some(id.clone())),
        SessionSelector::Latest => latest_session(conn, key),
    }
}

impl CatalogStore for SqliteCatalog {
    fn ping(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    fn create_session(&self, session: &ScanSession) -> Result<(), StoreError> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO scan_sessions
             (id, scan_type, targets, started_at, ended_at, status, counts, metrics, failure_cause)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                session.id,
                session.scan_type,
                serde_json::to_string(&session.targets)?,
                time_to_text(&session.started_at),
                session.ended_at.as_ref().map(time_to_text),
                session.status.as_str(),
                serde_json::to_string(&session.counts)?,
                serde_json::to_string(&session.metrics)?,
                session.failure_cause,
            ],
        )?;

        Ok(())
    }

    fn update_session(&self, session: &ScanSession) -> Result<(), StoreError> {
        let conn = self.conn()?;

        let changed = conn.execute(
            "UPDATE scan_sessions
             SET ended_at = ?, status = ?, counts = ?, metrics = ?, failure_cause = ?
             WHERE id = ? AND status = 'running'",
            params![
                session.ended_at.as_ref().map(time_to_text),
                session.status.as_str(),
                serde_json::to_string(&session.counts)?,
                serde_json::to_string(&session.metrics)?,
                session.failure_cause,
                session.id,
            ],
        )?;

        if changed == 0 {
            let status: Option<String> = conn
                .query_row(
                    "SELECT status FROM scan_sessions WHERE id = ?",
                    [&session.id],
                    |row| row.get(0),
                )
                .optional()?;

            return match status {
                None => Err(StoreError::UnknownSession {
                    id: session.id.clone(),
                }),
                Some(status) => Err(StoreError::Constraint(format!(
                    "session {} is already {}",
                    session.id, status
                ))),
            };
        }

        Ok(())
    }

    fn get_session(&self, id: &str) -> Result<Option<ScanSession>, StoreError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM scan_sessions WHERE id = ?", SESSION_COLUMNS);

        Ok(conn.query_row(&sql, [id], session_from_row).optional()?)
    }

    fn insert_file(&self, record: &FileRecord) -> Result<i64, StoreError> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO files
             (filename, filepath, directory, format, size, created_at, modified_at,
              metadata, metadata_source, category, session_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                record.filename,
                path_key(&record.path),
                path_key(&record.directory),
                record.format.as_str(),
                record.size as i64,
                record.created.as_ref().map(time_to_text),
                record.modified.as_ref().map(time_to_text),
                serde_json::to_string(&record.metadata)?,
                record.metadata_source,
                record.category.map(|c| c.as_str()),
                record.session_id,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    fn insert_directory(&self, record: &DirectoryRecord) -> Result<i64, StoreError> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO directories (dirpath, parent_id, depth, category, session_id)
             VALUES (?, ?, ?, ?, ?)",
            params![
                path_key(&record.path),
                record.parent_id,
                record.depth as i64,
                record.category.map(|c| c.as_str()),
                record.session_id,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    fn append_log(&self, entry: &ScanLogEntry) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let detail = entry
            .detail
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        conn.execute(
            "INSERT INTO scan_logs
             (session_id, logged_at, level, component, message, filepath, detail)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                entry.session_id,
                time_to_text(&entry.logged_at),
                entry.level.as_str(),
                entry.component.as_str(),
                entry.message,
                entry.path.as_ref().map(|p| p.to_string_lossy().into_owned()),
                detail,
            ],
        )?;

        Ok(())
    }

    fn query_logs(&self, session_id: &str) -> Result<Vec<ScanLogEntry>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT session_id, logged_at, level, component, message, filepath, detail
             FROM scan_logs WHERE session_id = ? ORDER BY id",
        )?;

        let entries = stmt
            .query_map([session_id], log_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    fn query_files_by_directory(
        &self,
        path: &Path,
        selector: &SessionSelector,
    ) -> Result<Vec<FileRecord>, StoreError> {
        let conn = self.conn()?;
        let key = path_key(path);

        let Some(session_id) = resolve_session(&conn, &key, selector)? else {
            return Ok(Vec::new());
        };

        let sql = format!(
            "SELECT {} FROM files
             WHERE session_id = ?1
               AND (directory = ?2 OR substr(directory, 1, length(?3)) = ?3)
             ORDER BY filepath",
            FILE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;

        let files = stmt
            .query_map(params![session_id, key, subtree_prefix(&key)], file_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(files)
    }

    fn query_directories(
        &self,
        selector: &SessionSelector,
    ) -> Result<Vec<DirectoryRecord>, StoreError> {
        let conn = self.conn()?;

        let directories = match selector {
            SessionSelector::Session(id) => {
                let sql = format!(
                    "SELECT {} FROM directories d WHERE d.session_id = ? ORDER BY d.dirpath",
                    DIRECTORY_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([id], directory_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            SessionSelector::Latest => {
                let sql = format!(
                    "SELECT {} FROM directories d
                     JOIN scan_sessions s ON s.id = d.session_id
                     WHERE s.seq = (
                         SELECT MAX(s2.seq) FROM directories d2
                         JOIN scan_sessions s2 ON s2.id = d2.session_id
                         WHERE d2.dirpath = d.dirpath
                     )
                     ORDER BY d.dirpath",
                    DIRECTORY_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([], directory_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };

        Ok(directories)
    }

    fn get_directory(
        &self,
        path: &Path,
        selector: &SessionSelector,
    ) -> Result<Option<DirectoryRecord>, StoreError> {
        let conn = self.conn()?;
        let key = path_key(path);

        let Some(session_id) = resolve_session(&conn, &key, selector)? else {
            return Ok(None);
        };

        let sql = format!(
            "SELECT {} FROM directories d WHERE d.dirpath = ? AND d.session_id = ?",
            DIRECTORY_COLUMNS
        );

        Ok(conn
            .query_row(&sql, params![key, session_id], directory_from_row)
            .optional()?)
    }

    fn latest_session_for_directory(&self, path: &Path) -> Result<Option<String>, StoreError> {
        let conn = self.conn()?;
        latest_session(&conn, &path_key(path))
    }

    fn backfill_category(
        &self,
        path_prefix: &Path,
        category: Category,
        selector: &SessionSelector,
    ) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let key = path_key(path_prefix);

        let Some(session_id) = resolve_session(&conn, &key, selector)? else {
            return Ok(0);
        };
        let prefix = subtree_prefix(&key);

        conn.execute(
            "UPDATE directories SET category = ?1
             WHERE category IS NULL AND session_id = ?2
               AND (dirpath = ?3 OR substr(dirpath, 1, length(?4)) = ?4)",
            params![category.as_str(), session_id, key, prefix],
        )?;

        let changed = conn.execute(
            "UPDATE files SET category = ?1
             WHERE category IS NULL AND session_id = ?2
               AND (directory = ?3 OR substr(directory, 1, length(?4)) = ?4)",
            params![category.as_str(), session_id, key, prefix],
        )?;

        Ok(changed)
    }

    fn insert_duplicate_relation(&self, relation: &DuplicateRelation) -> Result<i64, StoreError> {
        if relation.match_type == MatchClass::Unrelated {
            return Err(StoreError::Constraint(
                "unrelated pairs are not stored as duplicate relations".to_string(),
            ));
        }

        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO duplicate_relations
             (reference_id, candidate_id, match_type, match_percentage, comparison_run, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                relation.reference_id,
                relation.candidate_id,
                relation.match_type.as_str(),
                relation.match_percentage as i64,
                relation.comparison_run,
                time_to_text(&Utc::now()),
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    fn list_relations(
        &self,
        comparison_run: Option<&str>,
    ) -> Result<Vec<DuplicateRelation>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT r.reference_id, r.candidate_id, rd.dirpath, cd.dirpath,
                    r.match_type, r.match_percentage, r.comparison_run
             FROM duplicate_relations r
             LEFT JOIN directories rd ON rd.id = r.reference_id
             LEFT JOIN directories cd ON cd.id = r.candidate_id
             WHERE ?1 IS NULL OR r.comparison_run = ?1
             ORDER BY r.id",
        )?;

        let relations = stmt
            .query_map([comparison_run], relation_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(relations)
    }
}
