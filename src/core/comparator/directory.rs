//! Comparison of two catalogued directories.

use super::{classify, count_matches, ComparableFile, Comparison, MatchPolicy};
use crate::config::DEFAULT_EXPORT_PATTERNS;
use crate::core::catalog::{CatalogStore, DirectoryRecord, DuplicateRelation, SessionSelector};
use crate::core::scanner::ExclusionFilter;
use crate::error::{CompareError, ScanError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

/// A classified directory pair, with the relation row it produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryComparison {
    pub reference: DirectoryRecord,
    pub candidate: DirectoryRecord,
    pub comparison: Comparison,
    /// `None` for unrelated pairs
    pub relation: Option<DuplicateRelation>,
    pub comparison_run: String,
}

/// Compares directory file sets under a match policy
#[derive(Debug, Clone)]
pub struct DirectoryComparator {
    policy: MatchPolicy,
    export_filter: ExclusionFilter,
}

impl DirectoryComparator {
    /// Name-and-size matching, default export patterns
    pub fn new() -> Self {
        let patterns: Vec<String> = DEFAULT_EXPORT_PATTERNS.iter().map(|p| p.to_string()).collect();
        Self {
            policy: MatchPolicy::default(),
            export_filter: ExclusionFilter::new(&patterns).unwrap_or_default(),
        }
    }

    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the export-folder patterns
    pub fn with_export_patterns(mut self, patterns: &[String]) -> Result<Self, CompareError> {
        self.export_filter = ExclusionFilter::new(patterns).map_err(|e| match e {
            ScanError::InvalidPattern { pattern, reason } => {
                CompareError::InvalidPattern { pattern, reason }
            }
            other => CompareError::InvalidPattern {
                pattern: String::new(),
                reason: other.to_string(),
            },
        })?;
        Ok(self)
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    /// Files under an export folder, relative to the compared directory
    fn is_exported(&self, file: &ComparableFile) -> bool {
        file.relative_path
            .parent()
            .map(|dir| self.export_filter.matches_any_segment(dir))
            .unwrap_or(false)
    }

    fn comparable(&self, files: &[ComparableFile]) -> (Vec<ComparableFile>, usize) {
        let kept: Vec<_> = files
            .iter()
            .filter(|f| !self.is_exported(f))
            .cloned()
            .collect();
        let excluded = files.len() - kept.len();
        (kept, excluded)
    }

    /// Classify a candidate file set against a reference file set
    pub fn compare_sets(
        &self,
        reference: &[ComparableFile],
        candidate: &[ComparableFile],
    ) -> Comparison {
        let (reference, reference_excluded) = self.comparable(reference);
        let (candidate, candidate_excluded) = self.comparable(candidate);

        let matched = count_matches(&reference, &candidate, self.policy);
        let (class, match_percentage) = classify(reference.len(), candidate.len(), matched);

        Comparison {
            class,
            match_percentage,
            reference_count: reference.len(),
            candidate_count: candidate.len(),
            matched,
            extra: candidate.len() - matched,
            missing: reference.len() - matched,
            excluded: reference_excluded + candidate_excluded,
        }
    }

    /// Whether a directory is itself an export folder
    pub fn is_export_directory(&self, path: &Path) -> bool {
        self.export_filter.is_excluded(path)
    }

    /// Files of a directory's subtree, taken from the session that recorded it
    pub fn files_of(
        &self,
        store: &dyn CatalogStore,
        directory: &DirectoryRecord,
    ) -> Result<Vec<ComparableFile>, CompareError> {
        Ok(store
            .query_files_by_directory(
                &directory.path,
                &SessionSelector::Session(directory.session_id.clone()),
            )?
            .iter()
            .map(|record| ComparableFile::from_record(record, &directory.path))
            .collect())
    }

    /// Load a directory record and its subtree's files from one snapshot
    pub fn load(
        &self,
        store: &dyn CatalogStore,
        path: &Path,
        selector: &SessionSelector,
    ) -> Result<(DirectoryRecord, Vec<ComparableFile>), CompareError> {
        let directory =
            store
                .get_directory(path, selector)?
                .ok_or_else(|| CompareError::NotCatalogued {
                    path: path.to_path_buf(),
                })?;
        let files = self.files_of(store, &directory)?;
        Ok((directory, files))
    }

    /// Compare two catalogued directories under a fresh comparison run
    pub fn compare_directories(
        &self,
        store: &dyn CatalogStore,
        reference: &Path,
        candidate: &Path,
        selector: &SessionSelector,
    ) -> Result<DirectoryComparison, CompareError> {
        let run_id = Uuid::new_v4().to_string();
        self.compare_in_run(store, reference, candidate, selector, &run_id)
    }

    /// Compare two catalogued directories and record a relation for any
    /// duplicate classification
    pub fn compare_in_run(
        &self,
        store: &dyn CatalogStore,
        reference: &Path,
        candidate: &Path,
        selector: &SessionSelector,
        run_id: &str,
    ) -> Result<DirectoryComparison, CompareError> {
        let (reference, reference_files) = self.load(store, reference, selector)?;
        let (candidate, candidate_files) = self.load(store, candidate, selector)?;
        self.compare_loaded(
            store,
            (reference, &reference_files),
            (candidate, &candidate_files),
            run_id,
        )
    }

    /// Classify already loaded directories and record the relation
    pub(crate) fn compare_loaded(
        &self,
        store: &dyn CatalogStore,
        (reference, reference_files): (DirectoryRecord, &[ComparableFile]),
        (candidate, candidate_files): (DirectoryRecord, &[ComparableFile]),
        run_id: &str,
    ) -> Result<DirectoryComparison, CompareError> {
        let comparison = self.compare_sets(reference_files, candidate_files);
        debug!(
            reference = %reference.path.display(),
            candidate = %candidate.path.display(),
            class = comparison.class.as_str(),
            percentage = comparison.match_percentage,
            matched = comparison.matched,
            "Directories compared"
        );

        let relation = match (comparison.class.is_duplicate(), reference.id, candidate.id) {
            (true, Some(reference_id), Some(candidate_id)) => {
                let relation = DuplicateRelation {
                    reference_id,
                    candidate_id,
                    reference_path: Some(reference.path.clone()),
                    candidate_path: Some(candidate.path.clone()),
                    match_type: comparison.class,
                    match_percentage: comparison.match_percentage,
                    comparison_run: run_id.to_string(),
                };
                store.insert_duplicate_relation(&relation)?;
                Some(relation)
            }
            _ => None,
        };

        Ok(DirectoryComparison {
            reference,
            candidate,
            comparison,
            relation,
            comparison_run: run_id.to_string(),
        })
    }
}

impl Default for DirectoryComparator {
    fn default() -> Self {
        Self::new()
    }
}
