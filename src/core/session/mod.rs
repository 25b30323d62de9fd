//! # Session Module
//!
//! Runs one scan session: walks every target, extracts metadata for each
//! supported photo, and records files, directories and log entries in the
//! catalog under a fresh session id.
//!
//! ## States
//! `initializing` -> `running` -> `finalizing` -> `completed` | `failed`
//!
//! Per-file and per-directory failures are logged and counted; they never
//! fail the session. Only session-level faults (empty or invalid targets,
//! an unreachable catalog, an interrupt) end in `failed`, and even then the
//! counters gathered so far are written out.

mod cancel;
mod counters;
mod logger;
mod orchestrator;

pub use cancel::CancellationToken;
pub use counters::{SessionCounters, ThroughputMeter};
pub use logger::SessionLogger;
pub use orchestrator::{ScanOrchestrator, ScanOrchestratorBuilder, INTERRUPTED};

use crate::config::DEFAULT_EXCLUDE_PATTERNS;
use crate::core::catalog::{Category, ScanSession, SessionStatus};
use crate::events::SessionSummary;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// One directory to scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanTarget {
    pub path: PathBuf,
    pub description: String,
    /// Applied to every record found under this target
    pub category: Option<Category>,
    /// Configuration group the target came from
    pub group: String,
}

impl ScanTarget {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            description: String::new(),
            category: None,
            group: "default".to_string(),
        }
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }
}

/// Everything a scan session needs to know
#[derive(Debug, Clone)]
pub struct ScanRequest {
    /// `full` or `group:<name>`
    pub scan_type: String,
    pub targets: Vec<ScanTarget>,
    /// Basename globs pruned from the walk
    pub exclude_patterns: Vec<String>,
    pub recursive: bool,
    /// Worker threads
    pub concurrency: usize,
    /// Per extractor call; `None` disables the limit
    pub extraction_timeout: Option<Duration>,
    /// Throughput sample interval, in processed files
    pub sample_every: u64,
}

impl ScanRequest {
    pub fn new(targets: Vec<ScanTarget>) -> Self {
        Self {
            scan_type: "full".to_string(),
            targets,
            exclude_patterns: DEFAULT_EXCLUDE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            recursive: true,
            concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            extraction_timeout: Some(Duration::from_secs(30)),
            sample_every: 100,
        }
    }

    pub fn scan_type(mut self, scan_type: impl Into<String>) -> Self {
        self.scan_type = scan_type.into();
        self
    }

    pub fn exclude_patterns(mut self, patterns: Vec<String>) -> Self {
        self.exclude_patterns = patterns;
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn concurrency(mut self, workers: usize) -> Self {
        self.concurrency = workers;
        self
    }

    pub fn extraction_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.extraction_timeout = timeout;
        self
    }

    pub fn sample_every(mut self, files: u64) -> Self {
        self.sample_every = files;
        self
    }
}

/// Per-target slice of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSummary {
    pub path: PathBuf,
    pub group: String,
    pub files_processed: u64,
    pub files_failed: u64,
    pub directories: u64,
}

/// Outcome of a session that could be established
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    /// As persisted at the end of the run
    pub session: ScanSession,
    pub targets: Vec<TargetSummary>,
}

impl SessionReport {
    pub fn is_completed(&self) -> bool {
        self.session.status == SessionStatus::Completed
    }

    pub fn failure_cause(&self) -> Option<&str> {
        self.session.failure_cause.as_deref()
    }

    pub fn summary(&self) -> SessionSummary {
        let counts = &self.session.counts;
        SessionSummary {
            session_id: self.session.id.clone(),
            files_processed: counts.files_processed,
            files_succeeded: counts.files_succeeded,
            files_failed: counts.files_failed,
            directories_processed: counts.directories_processed,
            bytes_processed: counts.bytes_processed,
            duration_ms: self.session.metrics.duration_ms,
        }
    }
}
