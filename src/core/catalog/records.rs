//! Record types stored in the catalog.

use crate::core::comparator::MatchClass;
use crate::core::metadata::PhotoMetadata;
use crate::core::scanner::PhotoFormat;
use crate::error::ErrorDetail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Review category for files and directories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Personal,
    Work,
}

impl Category {
    /// Parse a category label, case-insensitively. Unknown labels are unassigned.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "personal" => Some(Self::Personal),
            "work" => Some(Self::Work),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Personal => "Personal",
            Self::Work => "Work",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One catalogued photo file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub filename: String,
    /// Absolute path
    pub path: PathBuf,
    /// Containing directory
    pub directory: PathBuf,
    pub format: PhotoFormat,
    pub size: u64,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    /// Possibly empty
    pub metadata: PhotoMetadata,
    /// Extraction tier that produced `metadata`
    pub metadata_source: Option<String>,
    pub category: Option<Category>,
    pub session_id: String,
}

/// One catalogued directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    /// Assigned by the store on insert
    pub id: Option<i64>,
    pub path: PathBuf,
    /// `None` for a root of the observed forest
    pub parent_id: Option<i64>,
    /// Distance from the scan target it was found under
    pub depth: usize,
    pub category: Option<Category>,
    pub session_id: String,
}

impl DirectoryRecord {
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }
}

/// Lifecycle of a stored scan session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Terminal sessions are never updated again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters flushed to the session record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCounts {
    pub files_processed: u64,
    pub files_succeeded: u64,
    pub files_failed: u64,
    /// Enumerated but not a supported photo format
    pub files_skipped: u64,
    pub directories_processed: u64,
    pub directories_succeeded: u64,
    pub directories_failed: u64,
    pub enumeration_errors: u64,
    pub bytes_processed: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub duration_ms: u64,
    /// Over the whole session
    pub files_per_second: f64,
    /// Best sampled rate
    pub peak_files_per_second: f64,
    pub throughput_samples: u64,
    pub concurrency: usize,
    /// Files whose metadata came from a fallback tier
    pub extraction_fallbacks: u64,
    /// Files catalogued with an empty metadata body
    pub extraction_failures: u64,
}

/// One scan run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSession {
    pub id: String,
    /// `full` or `group:<name>`
    pub scan_type: String,
    pub targets: Vec<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub counts: SessionCounts,
    pub metrics: PerformanceMetrics,
    /// Set when `status` is `Failed`
    pub failure_cause: Option<String>,
}

impl ScanSession {
    pub fn new(id: impl Into<String>, scan_type: impl Into<String>, targets: Vec<PathBuf>) -> Self {
        Self {
            id: id.into(),
            scan_type: scan_type.into(),
            targets,
            started_at: Utc::now(),
            ended_at: None,
            status: SessionStatus::Running,
            counts: SessionCounts::default(),
            metrics: PerformanceMetrics::default(),
            failure_cause: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Component that raised a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    TreeWalker,
    MetadataExtractor,
    ScanOrchestrator,
    CatalogStore,
    DirectoryComparator,
}

impl Component {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TreeWalker => "tree_walker",
            Self::MetadataExtractor => "metadata_extractor",
            Self::ScanOrchestrator => "scan_orchestrator",
            Self::CatalogStore => "catalog_store",
            Self::DirectoryComparator => "directory_comparator",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tree_walker" => Some(Self::TreeWalker),
            "metadata_extractor" => Some(Self::MetadataExtractor),
            "scan_orchestrator" => Some(Self::ScanOrchestrator),
            "catalog_store" => Some(Self::CatalogStore),
            "directory_comparator" => Some(Self::DirectoryComparator),
            _ => None,
        }
    }
}

/// Append-only scan log row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanLogEntry {
    pub session_id: String,
    pub logged_at: DateTime<Utc>,
    pub level: LogLevel,
    pub component: Component,
    pub message: String,
    pub path: Option<PathBuf>,
    pub detail: Option<ErrorDetail>,
}

impl ScanLogEntry {
    pub fn new(
        session_id: impl Into<String>,
        level: LogLevel,
        component: Component,
        message: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            logged_at: Utc::now(),
            level,
            component,
            message: message.into(),
            path: None,
            detail: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_detail(mut self, detail: ErrorDetail) -> Self {
        if self.path.is_none() {
            self.path = detail.path.clone();
        }
        self.detail = Some(detail);
        self
    }
}

/// Derived duplicate relation between two directories
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateRelation {
    pub reference_id: i64,
    pub candidate_id: i64,
    /// Filled in when read back from the store
    #[serde(default)]
    pub reference_path: Option<PathBuf>,
    #[serde(default)]
    pub candidate_path: Option<PathBuf>,
    /// Never `Unrelated`
    pub match_type: MatchClass,
    pub match_percentage: u32,
    pub comparison_run: String,
}

/// Which snapshot of the catalog a query reads
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionSelector {
    /// Per directory, the most recent session that catalogued it
    #[default]
    Latest,
    Session(String),
}
