//! # Error Module
//!
//! Error types for the photo catalog.
//!
//! ## Design Principles
//! - **Never panic** on user data - return errors instead
//! - **Include context** - paths, session ids, what went wrong
//! - **Recover locally** - per-file and per-directory errors are logged and
//!   counted; only session-level faults reach the caller
//! - **Structured detail** - every error can be flattened into an
//!   [`ErrorDetail`] for the scan log

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Scanning error: {0}")]
    Scan(#[from] ScanError),

    #[error("Metadata extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Catalog store error: {0}")]
    Store(#[from] StoreError),

    #[error("Scan session error: {0}")]
    Session(#[from] SessionError),

    #[error("Comparison error: {0}")]
    Compare(#[from] CompareError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Test data error: {0}")]
    Fixture(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that occur while enumerating a directory tree
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("Permission denied accessing: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("Failed to read entry {path}: {source}")]
    ReadEntry {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Filesystem loop detected at {path}")]
    Loop { path: PathBuf },

    #[error("Invalid exclusion pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Errors from a single metadata extraction tier
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Failed to open {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("No usable metadata in {path}")]
    NoMetadata { path: PathBuf },

    #[error("Format not supported by {extractor}: {path}")]
    UnsupportedFormat {
        extractor: &'static str,
        path: PathBuf,
    },

    #[error("Malformed metadata in {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("Extraction of {path} timed out after {timeout:?}")]
    Timeout { path: PathBuf, timeout: Duration },

    #[error("Extractor thread for {path} exited without a result")]
    WorkerLost { path: PathBuf },

    #[error("Skipped {path}: {stalled} timed-out extractor threads still running")]
    Saturated { path: PathBuf, stalled: usize },
}

/// Errors raised by the catalog store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to open catalog at {path}: {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    #[error("Catalog unavailable: {0}")]
    Unavailable(String),

    #[error("Catalog query failed: {0}")]
    QueryFailed(String),

    #[error("Duplicate record: {0}")]
    Constraint(String),

    #[error("Failed to serialize catalog data: {0}")]
    SerializationFailed(String),

    #[error("No such scan session: {id}")]
    UnknownSession { id: String },
}

impl StoreError {
    /// Whether this error means the catalog can no longer be written at all
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::OpenFailed { .. } | StoreError::Unavailable(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(error: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match &error {
            rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
                ErrorCode::ConstraintViolation => StoreError::Constraint(error.to_string()),
                ErrorCode::CannotOpen
                | ErrorCode::NotADatabase
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::SystemIoFailure
                | ErrorCode::ReadOnly
                | ErrorCode::DiskFull => StoreError::Unavailable(error.to_string()),
                _ => StoreError::QueryFailed(error.to_string()),
            },
            _ => StoreError::QueryFailed(error.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        StoreError::SerializationFailed(error.to_string())
    }
}

/// Session-level faults. These are the only errors a scan returns.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No scan targets given")]
    NoTargets,

    #[error("Scan target {path} is invalid: {reason}")]
    InvalidTarget { path: PathBuf, reason: String },

    #[error("Could not establish scan session: {0}")]
    Establish(#[source] StoreError),

    #[error("Scan session {session_id} failed: {cause}")]
    Fatal { session_id: String, cause: String },

    #[error("Invalid scan settings: {0}")]
    InvalidSettings(String),
}

/// Errors that occur during directory comparison
#[derive(Error, Debug)]
pub enum CompareError {
    #[error("Directory not catalogued: {path}")]
    NotCatalogued { path: PathBuf },

    #[error("Failed to read catalog: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid export pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Errors that occur while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error parsing YAML configuration {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("No directories found for group: {group}")]
    UnknownGroup { group: String },
}

/// Flattened error description stored alongside scan log entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Short machine-friendly error kind, e.g. `permission_denied`
    pub error_type: String,
    /// Human-readable message
    pub message: String,
    /// Path affected by the error, if any
    pub path: Option<PathBuf>,
}

impl ErrorDetail {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl From<&ScanError> for ErrorDetail {
    fn from(error: &ScanError) -> Self {
        let (kind, path) = match error {
            ScanError::DirectoryNotFound { path } => ("directory_not_found", Some(path)),
            ScanError::PermissionDenied { path } => ("permission_denied", Some(path)),
            ScanError::ReadEntry { path, .. } => ("read_entry", Some(path)),
            ScanError::Loop { path } => ("filesystem_loop", Some(path)),
            ScanError::InvalidPattern { .. } => ("invalid_pattern", None),
        };
        Self {
            error_type: kind.to_string(),
            message: error.to_string(),
            path: path.cloned(),
        }
    }
}

impl From<&ExtractError> for ErrorDetail {
    fn from(error: &ExtractError) -> Self {
        let (kind, path) = match error {
            ExtractError::Unreadable { path, .. } => ("unreadable", path),
            ExtractError::NoMetadata { path } => ("no_metadata", path),
            ExtractError::UnsupportedFormat { path, .. } => ("unsupported_format", path),
            ExtractError::Malformed { path, .. } => ("malformed", path),
            ExtractError::Timeout { path, .. } => ("timeout", path),
            ExtractError::WorkerLost { path } => ("worker_lost", path),
            ExtractError::Saturated { path, .. } => ("saturated", path),
        };
        Self {
            error_type: kind.to_string(),
            message: error.to_string(),
            path: Some(path.clone()),
        }
    }
}

impl From<&StoreError> for ErrorDetail {
    fn from(error: &StoreError) -> Self {
        let kind = match error {
            StoreError::OpenFailed { .. } => "open_failed",
            StoreError::Unavailable(_) => "unavailable",
            StoreError::QueryFailed(_) => "query_failed",
            StoreError::Constraint(_) => "constraint",
            StoreError::SerializationFailed(_) => "serialization",
            StoreError::UnknownSession { .. } => "unknown_session",
        };
        Self::new(kind, error.to_string())
    }
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, CatalogError>;
