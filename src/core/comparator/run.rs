//! Classification of every directory under a reference root against
//! same-named directories under one or more candidate roots.

use super::{ComparableFile, Comparison, DirectoryComparator};
use crate::core::catalog::{CatalogStore, DirectoryRecord, SessionSelector};
use crate::error::CompareError;
use crate::events::{null_sender, CompareEvent, Event, EventSender};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// One classified reference/candidate pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairResult {
    pub reference: PathBuf,
    pub candidate: PathBuf,
    pub comparison: Comparison,
}

/// Outcome of a classification run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub run_id: String,
    pub reference_root: PathBuf,
    pub candidate_roots: Vec<PathBuf>,
    /// Exact and partial duplicates, recorded in the catalog
    pub relations: Vec<PairResult>,
    /// Same-named pairs that turned out unrelated
    pub unrelated: Vec<PairResult>,
    /// Reference directories with no same-named candidate
    pub unique_directories: Vec<PathBuf>,
}

impl ClassificationReport {
    pub fn pairs_compared(&self) -> usize {
        self.relations.len() + self.unrelated.len()
    }
}

/// A single comparison run over catalogued trees
pub struct ClassificationRun<'a> {
    store: &'a dyn CatalogStore,
    comparator: DirectoryComparator,
    selector: SessionSelector,
    run_id: String,
}

impl<'a> ClassificationRun<'a> {
    pub fn new(store: &'a dyn CatalogStore, comparator: DirectoryComparator) -> Self {
        Self {
            store,
            comparator,
            selector: SessionSelector::Latest,
            run_id: Uuid::new_v4().to_string(),
        }
    }

    /// Compare a specific snapshot instead of the latest one
    pub fn selector(mut self, selector: SessionSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn run(
        &self,
        reference_root: &Path,
        candidate_roots: &[PathBuf],
    ) -> Result<ClassificationReport, CompareError> {
        self.run_with_events(reference_root, candidate_roots, &null_sender())
    }

    pub fn run_with_events(
        &self,
        reference_root: &Path,
        candidate_roots: &[PathBuf],
        events: &EventSender,
    ) -> Result<ClassificationReport, CompareError> {
        let directories = self.store.query_directories(&self.selector)?;

        let comparable = |dir: &&DirectoryRecord| !self.comparator.is_export_directory(&dir.path);

        let references: Vec<&DirectoryRecord> = directories
            .iter()
            .filter(|d| d.path.starts_with(reference_root))
            .filter(comparable)
            .collect();

        // Basename -> candidate directories
        let mut index: HashMap<String, Vec<&DirectoryRecord>> = HashMap::new();
        for dir in directories
            .iter()
            .filter(|d| candidate_roots.iter().any(|root| d.path.starts_with(root)))
            .filter(comparable)
        {
            index.entry(dir.name()).or_default().push(dir);
        }

        let mut pairs = Vec::new();
        let mut unique_directories = Vec::new();
        for reference in &references {
            let counterparts: Vec<_> = index
                .get(&reference.name())
                .map(|dirs| {
                    dirs.iter()
                        .filter(|c| c.path != reference.path)
                        .copied()
                        .collect()
                })
                .unwrap_or_default();

            if counterparts.is_empty() {
                unique_directories.push(reference.path.clone());
            }
            pairs.extend(counterparts.into_iter().map(|c| (*reference, c)));
        }

        info!(
            run_id = %self.run_id,
            references = references.len(),
            pairs = pairs.len(),
            "Starting classification run"
        );
        events.send(Event::Compare(CompareEvent::Started {
            run_id: self.run_id.clone(),
            pairs: pairs.len(),
        }));

        let mut files: HashMap<&Path, Vec<ComparableFile>> = HashMap::new();
        let mut relations = Vec::new();
        let mut unrelated = Vec::new();

        for (reference, candidate) in pairs {
            self.ensure_loaded(&mut files, reference)?;
            self.ensure_loaded(&mut files, candidate)?;
            let reference_files = files.get(reference.path.as_path()).map(Vec::as_slice);
            let candidate_files = files.get(candidate.path.as_path()).map(Vec::as_slice);

            let result = self.comparator.compare_loaded(
                self.store,
                (reference.clone(), reference_files.unwrap_or(&[])),
                (candidate.clone(), candidate_files.unwrap_or(&[])),
                &self.run_id,
            )?;

            events.send(Event::Compare(CompareEvent::PairClassified {
                reference: reference.path.clone(),
                candidate: candidate.path.clone(),
                class: result.comparison.class,
                match_percentage: result.comparison.match_percentage,
            }));

            let pair = PairResult {
                reference: reference.path.clone(),
                candidate: candidate.path.clone(),
                comparison: result.comparison,
            };
            if pair.comparison.class.is_duplicate() {
                relations.push(pair);
            } else {
                unrelated.push(pair);
            }
        }

        info!(
            run_id = %self.run_id,
            relations = relations.len(),
            unrelated = unrelated.len(),
            unique = unique_directories.len(),
            "Classification run complete"
        );
        events.send(Event::Compare(CompareEvent::Completed {
            run_id: self.run_id.clone(),
            relations: relations.len(),
            unique_directories: unique_directories.len(),
        }));

        Ok(ClassificationReport {
            run_id: self.run_id.clone(),
            reference_root: reference_root.to_path_buf(),
            candidate_roots: candidate_roots.to_vec(),
            relations,
            unrelated,
            unique_directories,
        })
    }

    fn ensure_loaded<'d>(
        &self,
        cache: &mut HashMap<&'d Path, Vec<ComparableFile>>,
        directory: &'d DirectoryRecord,
    ) -> Result<(), CompareError> {
        if !cache.contains_key(directory.path.as_path()) {
            let files = self.comparator.files_of(self.store, directory)?;
            debug!(path = %directory.path.display(), files = files.len(), "Loaded directory files");
            cache.insert(directory.path.as_path(), files);
        }
        Ok(())
    }
}
