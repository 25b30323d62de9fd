//! Event type definitions for progress reporting.

use crate::core::comparator::MatchClass;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// All events emitted by the catalog engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Session lifecycle events
    Session(SessionEvent),
    /// Tree walking and per-file events
    Scan(ScanEvent),
    /// Directory comparison events
    Compare(CompareEvent),
}

/// Lifecycle of a scan session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    /// Session record created
    Started {
        session_id: String,
        targets: Vec<PathBuf>,
    },
    /// Session moved to a new state
    StateChanged { state: SessionPhase },
    /// Session finished successfully
    Completed { summary: SessionSummary },
    /// Session ended on a session-level fault or interruption
    Failed {
        summary: SessionSummary,
        cause: String,
    },
}

/// States of the scan state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    Initializing,
    Running,
    Finalizing,
    Completed,
    Failed,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Initializing => write!(f, "Initializing"),
            SessionPhase::Running => write!(f, "Running"),
            SessionPhase::Finalizing => write!(f, "Finalizing"),
            SessionPhase::Completed => write!(f, "Completed"),
            SessionPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Counts reported when a session ends
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub files_processed: u64,
    pub files_succeeded: u64,
    pub files_failed: u64,
    pub directories_processed: u64,
    pub bytes_processed: u64,
    pub duration_ms: u64,
}

/// Events during the walk of one target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScanEvent {
    /// Started walking a target directory
    TargetStarted { path: PathBuf, group: String },
    /// Periodic progress update
    Progress(ScanProgress),
    /// A file could not be catalogued; the session continues
    FileFailed { path: PathBuf, message: String },
    /// An entry could not be enumerated; the walk continues
    EntryFailed { path: PathBuf, message: String },
    /// Finished walking a target directory
    TargetCompleted { path: PathBuf, files: u64 },
}

/// Progress information during a scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanProgress {
    /// Supported files processed so far
    pub files_processed: u64,
    /// Files that failed so far
    pub files_failed: u64,
    /// Directories discovered so far
    pub directories_seen: u64,
    /// Most recent files/second sample
    pub files_per_second: f64,
    /// File just processed
    pub current_path: PathBuf,
}

/// Events during directory comparison
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CompareEvent {
    /// A comparison run has started
    Started { run_id: String, pairs: usize },
    /// One reference/candidate pair was classified
    PairClassified {
        reference: PathBuf,
        candidate: PathBuf,
        class: MatchClass,
        match_percentage: u32,
    },
    /// Comparison run completed
    Completed {
        run_id: String,
        relations: usize,
        unique_directories: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_serializable() {
        let event = Event::Scan(ScanEvent::Progress(ScanProgress {
            files_processed: 50,
            files_failed: 1,
            directories_seen: 10,
            files_per_second: 12.5,
            current_path: PathBuf::from("/photos"),
        }));

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: Event = serde_json::from_str(&json).unwrap();

        match deserialized {
            Event::Scan(ScanEvent::Progress(p)) => {
                assert_eq!(p.files_processed, 50);
                assert_eq!(p.files_failed, 1);
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn session_summary_is_serializable() {
        let summary = SessionSummary {
            session_id: "abc".into(),
            files_processed: 1000,
            files_succeeded: 998,
            files_failed: 2,
            directories_processed: 40,
            bytes_processed: 500_000_000,
            duration_ms: 5000,
        };

        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("500000000"));
    }
}
