//! # Comparator Module
//!
//! Classifies the relationship between two catalogued directory trees.
//!
//! ## How It Works
//! 1. Load each directory's files from its latest scan session
//! 2. Drop files that live under an export folder (e.g. `3StarQ70`)
//! 3. Pair files by identity (see [`MatchPolicy`])
//! 4. Classify by containment
//!
//! ## Classifications
//! | Matched                        | Class           | Percentage                 |
//! |--------------------------------|-----------------|----------------------------|
//! | all of both sides              | `exact`         | 0                          |
//! | all reference, some candidate  | `partial_plus`  | extra / reference × 100    |
//! | all candidate, some reference  | `partial_minus` | missing / reference × 100  |
//! | anything else, or a side empty | `unrelated`     | 0                          |

mod directory;
mod matcher;
mod run;

pub use directory::{DirectoryComparator, DirectoryComparison};
pub use matcher::{classify, count_matches, MatchPolicy};
pub use run::{ClassificationReport, ClassificationRun, PairResult};

use crate::core::catalog::FileRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Relationship of a candidate directory to a reference directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchClass {
    Exact,
    PartialPlus,
    PartialMinus,
    Unrelated,
}

impl MatchClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchClass::Exact => "exact",
            MatchClass::PartialPlus => "partial_plus",
            MatchClass::PartialMinus => "partial_minus",
            MatchClass::Unrelated => "unrelated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "exact" => Some(MatchClass::Exact),
            "partial_plus" => Some(MatchClass::PartialPlus),
            "partial_minus" => Some(MatchClass::PartialMinus),
            "unrelated" => Some(MatchClass::Unrelated),
            _ => None,
        }
    }

    /// Whether this class is stored as a duplicate relation
    pub fn is_duplicate(&self) -> bool {
        !matches!(self, MatchClass::Unrelated)
    }
}

impl std::fmt::Display for MatchClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The parts of a file record that identity matching looks at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparableFile {
    /// Relative to the directory being compared
    pub relative_path: PathBuf,
    pub filename: String,
    pub size: u64,
    pub captured: Option<DateTime<Utc>>,
}

impl ComparableFile {
    /// Project a catalogued file relative to `root`
    pub fn from_record(record: &FileRecord, root: &Path) -> Self {
        Self {
            relative_path: record
                .path
                .strip_prefix(root)
                .unwrap_or(&record.path)
                .to_path_buf(),
            filename: record.filename.clone(),
            size: record.size,
            captured: record.metadata.date_taken,
        }
    }
}

/// Outcome of comparing two file sets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comparison {
    pub class: MatchClass,
    pub match_percentage: u32,
    /// Comparable reference files after exclusion
    pub reference_count: usize,
    /// Comparable candidate files after exclusion
    pub candidate_count: usize,
    pub matched: usize,
    /// Candidate files with no reference match
    pub extra: usize,
    /// Reference files with no candidate match
    pub missing: usize,
    /// Files dropped from either side by export patterns
    pub excluded: usize,
}
