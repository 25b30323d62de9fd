//! Integration tests for directory classification.
//!
//! Each test scans a small library and backup into a real catalog, then
//! classifies directories from what the catalog holds:
//! - Exact, partial_plus and partial_minus classification
//! - Asymmetry of reference and candidate
//! - Export folder exclusion
//! - Whole-tree classification runs

use chrono::{TimeZone, Utc};
use photo_catalog::core::catalog::{CatalogStore, SessionSelector, SqliteCatalog};
use photo_catalog::core::comparator::{
    ClassificationRun, DirectoryComparator, MatchClass, MatchPolicy,
};
use photo_catalog::core::metadata::{ExtractorChain, MetadataExtractor, PhotoMetadata};
use photo_catalog::core::scanner::PhotoFormat;
use photo_catalog::core::session::{ScanOrchestrator, ScanRequest, ScanTarget};
use photo_catalog::error::{CompareError, ExtractError};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

fn write(path: &Path, size: usize) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    File::create(path).unwrap().write_all(&vec![1u8; size]).unwrap();
}

fn scan_with(store: &Arc<SqliteCatalog>, roots: &[PathBuf], request: ScanRequest, chain: ExtractorChain) {
    let request = ScanRequest {
        targets: roots.iter().map(ScanTarget::new).collect(),
        ..request
    };
    let report = ScanOrchestrator::builder(store.clone())
        .extractor(chain)
        .build()
        .run(&request)
        .unwrap();
    assert!(report.is_completed());
}

fn scan(store: &Arc<SqliteCatalog>, roots: &[PathBuf]) {
    scan_with(
        store,
        roots,
        ScanRequest::new(Vec::new()).extraction_timeout(None),
        ExtractorChain::standard(),
    );
}

struct Fixture {
    _temp_dir: TempDir,
    lib: PathBuf,
    backup: PathBuf,
    store: Arc<SqliteCatalog>,
}

impl Fixture {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let lib = temp_dir.path().join("lib");
        let backup = temp_dir.path().join("backup");
        fs::create_dir_all(&lib).unwrap();
        fs::create_dir_all(&backup).unwrap();
        Self {
            _temp_dir: temp_dir,
            lib,
            backup,
            store: Arc::new(SqliteCatalog::open_in_memory().unwrap()),
        }
    }

    fn roots(&self) -> Vec<PathBuf> {
        vec![self.lib.clone(), self.backup.clone()]
    }
}

#[test]
fn backup_with_an_extra_file_is_partial_plus_50() {
    let f = Fixture::new();
    write(&f.lib.join("EventA/img001.dng"), 2_000);
    write(&f.lib.join("EventA/img002.dng"), 1_500);
    write(&f.backup.join("EventA/img001.dng"), 2_000);
    write(&f.backup.join("EventA/img002.dng"), 1_500);
    write(&f.backup.join("EventA/img003.jpg"), 800);
    scan(&f.store, &f.roots());

    let result = DirectoryComparator::new()
        .compare_directories(
            f.store.as_ref(),
            &f.lib.join("EventA"),
            &f.backup.join("EventA"),
            &SessionSelector::Latest,
        )
        .unwrap();

    assert_eq!(result.comparison.class, MatchClass::PartialPlus);
    assert_eq!(result.comparison.match_percentage, 50);

    let relation = result.relation.unwrap();
    let stored = f
        .store
        .list_relations(Some(&result.comparison_run))
        .unwrap();
    assert_eq!(stored, vec![relation]);
}

#[test]
fn backup_missing_two_of_ten_is_partial_minus_20() {
    let f = Fixture::new();
    for i in 1..=10 {
        write(&f.lib.join(format!("Wedding/img{:03}.nef", i)), 100 + i);
        if i <= 8 {
            write(&f.backup.join(format!("Wedding/img{:03}.nef", i)), 100 + i);
        }
    }
    scan(&f.store, &f.roots());

    let result = DirectoryComparator::new()
        .compare_directories(
            f.store.as_ref(),
            &f.lib.join("Wedding"),
            &f.backup.join("Wedding"),
            &SessionSelector::Latest,
        )
        .unwrap();

    assert_eq!(result.comparison.class, MatchClass::PartialMinus);
    assert_eq!(result.comparison.match_percentage, 20);
}

#[test]
fn swapping_reference_and_candidate_changes_the_answer() {
    let f = Fixture::new();
    for i in 1..=4 {
        write(&f.lib.join(format!("Trip/img{}.dng", i)), 10);
    }
    for i in 1..=3 {
        write(&f.backup.join(format!("Trip/img{}.dng", i)), 10);
    }
    scan(&f.store, &f.roots());

    let comparator = DirectoryComparator::new();
    let lib_trip = f.lib.join("Trip");
    let backup_trip = f.backup.join("Trip");

    let forward = comparator
        .compare_directories(f.store.as_ref(), &lib_trip, &backup_trip, &SessionSelector::Latest)
        .unwrap();
    let backward = comparator
        .compare_directories(f.store.as_ref(), &backup_trip, &lib_trip, &SessionSelector::Latest)
        .unwrap();

    assert_eq!(forward.comparison.class, MatchClass::PartialMinus);
    assert_eq!(forward.comparison.match_percentage, 25);
    assert_eq!(backward.comparison.class, MatchClass::PartialPlus);
    assert_eq!(backward.comparison.match_percentage, 33);
}

/// Dates every library file 2020 and every other file 2023
struct DatedByLocation {
    library: PathBuf,
}

impl MetadataExtractor for DatedByLocation {
    fn name(&self) -> &'static str {
        "dated"
    }

    fn extract(&self, path: &Path, _format: PhotoFormat) -> Result<PhotoMetadata, ExtractError> {
        let year = if path.starts_with(&self.library) { 2020 } else { 2023 };
        Ok(PhotoMetadata {
            date_taken: Some(Utc.with_ymd_and_hms(year, 6, 1, 12, 0, 0).unwrap()),
            ..Default::default()
        })
    }
}

#[test]
fn same_names_and_sizes_are_exact_despite_capture_times() {
    let f = Fixture::new();
    for name in ["a.dng", "b.dng", "c.jpg"] {
        write(&f.lib.join("Shoot").join(name), 64);
        write(&f.backup.join("Shoot").join(name), 64);
    }
    scan_with(
        &f.store,
        &f.roots(),
        ScanRequest::new(Vec::new()).extraction_timeout(None),
        ExtractorChain::new().with(DatedByLocation {
            library: f.lib.clone(),
        }),
    );

    let lib_shoot = f.lib.join("Shoot");
    let backup_shoot = f.backup.join("Shoot");

    let result = DirectoryComparator::new()
        .compare_directories(f.store.as_ref(), &lib_shoot, &backup_shoot, &SessionSelector::Latest)
        .unwrap();
    assert_eq!(result.comparison.class, MatchClass::Exact);
    assert_eq!(result.comparison.match_percentage, 0);

    let strict = DirectoryComparator::new()
        .with_policy(MatchPolicy::CorroborateCaptureTime)
        .compare_directories(f.store.as_ref(), &lib_shoot, &backup_shoot, &SessionSelector::Latest)
        .unwrap();
    assert_eq!(strict.comparison.class, MatchClass::Unrelated);
    assert!(strict.relation.is_none());
}

#[test]
fn export_folder_contents_do_not_count() {
    let f = Fixture::new();
    write(&f.lib.join("EventC/img001.dng"), 10);
    write(&f.lib.join("EventC/img002.dng"), 20);
    write(&f.lib.join("EventC/3StarQ70/img001.jpg"), 5);
    write(&f.lib.join("EventC/3StarQ70/img002.jpg"), 5);
    write(&f.backup.join("EventC/img001.dng"), 10);
    write(&f.backup.join("EventC/img002.dng"), 20);
    // Catalogue the export folders too, so only the comparator filters them
    scan_with(
        &f.store,
        &f.roots(),
        ScanRequest::new(Vec::new())
            .exclude_patterns(Vec::new())
            .extraction_timeout(None),
        ExtractorChain::standard(),
    );

    let result = DirectoryComparator::new()
        .compare_directories(
            f.store.as_ref(),
            &f.lib.join("EventC"),
            &f.backup.join("EventC"),
            &SessionSelector::Latest,
        )
        .unwrap();

    assert_eq!(result.comparison.class, MatchClass::Exact);
    assert_eq!(result.comparison.excluded, 2);
}

#[test]
fn uncatalogued_directory_is_reported() {
    let f = Fixture::new();
    write(&f.lib.join("EventA/img001.dng"), 10);
    scan(&f.store, &[f.lib.clone()]);

    let err = DirectoryComparator::new()
        .compare_directories(
            f.store.as_ref(),
            &f.lib.join("EventA"),
            &f.backup.join("EventA"),
            &SessionSelector::Latest,
        )
        .unwrap_err();

    assert!(matches!(err, CompareError::NotCatalogued { path } if path == f.backup.join("EventA")));
}

#[test]
fn classification_run_covers_the_whole_tree() {
    let f = Fixture::new();
    write(&f.lib.join("2022/italy/beach.jpg"), 20);
    write(&f.lib.join("2022/italy/sunset.dng"), 40);
    write(&f.lib.join("2022/family/portrait.jpg"), 30);
    write(&f.lib.join("2023/france/paris.jpg"), 20);
    write(&f.backup.join("old/italy/beach.jpg"), 20);
    write(&f.backup.join("old/italy/sunset.dng"), 40);
    write(&f.backup.join("old/family/portrait.jpg"), 30);
    write(&f.backup.join("old/family/kids.dng"), 50);
    scan(&f.store, &f.roots());

    let run = ClassificationRun::new(f.store.as_ref(), DirectoryComparator::new());
    let report = run.run(&f.lib, &[f.backup.clone()]).unwrap();

    let classes: Vec<_> = report
        .relations
        .iter()
        .map(|p| (p.reference.file_name().unwrap().to_owned(), p.comparison.class))
        .collect();
    assert!(classes.contains(&("italy".into(), MatchClass::Exact)));
    assert!(classes.contains(&("family".into(), MatchClass::PartialPlus)));

    assert!(report.unique_directories.contains(&f.lib.join("2023/france")));
    assert!(!report.unique_directories.contains(&f.lib.join("2022/italy")));

    let stored = f.store.list_relations(Some(run.run_id())).unwrap();
    assert_eq!(stored.len(), report.relations.len());
}
