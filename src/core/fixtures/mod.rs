//! # Fixtures Module
//!
//! Generates a small, deterministic photo library for trying out scans and
//! comparisons without touching real data.
//!
//! The tree has `personal`, `work` and `backup` groups. Two Lightroom export
//! folders (`3StarQ70`, `2StarQ60`) are included so exclusion can be seen at
//! work. A `scan_targets.yaml` pointing at the three groups is written next
//! to them.

use crate::error::CatalogError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// (directory relative to the library root, files with their sizes)
const SAMPLE_TREE: &[(&str, &[(&str, u64)])] = &[
    (
        "personal/2022/vacation_italy",
        &[
            ("italy_beach.jpg", 2048),
            ("italy_sunset.dng", 4096),
            ("italy_food.jpg", 1536),
        ],
    ),
    (
        "personal/2022/family",
        &[("family_portrait.jpg", 3072), ("kids_playing.dng", 5120)],
    ),
    (
        "personal/2022/3StarQ70",
        &[("export1.jpg", 1024), ("export2.jpg", 1024)],
    ),
    (
        "personal/2023/vacation_france",
        &[
            ("paris.jpg", 2048),
            ("eiffel_tower.dng", 4096),
            ("louvre.jpg", 1536),
        ],
    ),
    (
        "work/products/electronics",
        &[("phone.dng", 6144), ("laptop.dng", 7168)],
    ),
    (
        "work/products/2StarQ60",
        &[("export_phone.jpg", 1024), ("export_laptop.jpg", 1024)],
    ),
    (
        "work/clients/client_a",
        &[("portrait.jpg", 3072), ("group.dng", 5120)],
    ),
    (
        "work/clients/client_b",
        &[("event.jpg", 2560), ("conference.dng", 4608)],
    ),
    (
        "backup/old_library",
        &[("old_photo1.jpg", 1024), ("old_photo2.dng", 2048)],
    ),
    (
        "backup/imports/camera_a",
        &[("import1.arw", 8192), ("import2.arw", 8192)],
    ),
    (
        "backup/imports/camera_b",
        &[("import1.cr2", 7680), ("import2.cr2", 7680)],
    ),
    // Partial backups of library folders
    (
        "backup/2022/vacation_italy",
        &[
            ("italy_beach.jpg", 2048),
            ("italy_sunset.dng", 4096),
            ("italy_food.jpg", 1536),
            ("italy_extra.jpg", 1024),
        ],
    ),
    ("backup/2022/family", &[("family_portrait.jpg", 3072)]),
];

/// What [`generate_sample_library`] wrote
#[derive(Debug, Clone)]
pub struct SampleLibrary {
    pub root: PathBuf,
    /// Scan targets for the generated groups
    pub config_path: PathBuf,
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
}

/// Build the sample library under `dir`.
///
/// An existing `dir` is an error unless `clean` is set, in which case it is
/// removed first.
pub fn generate_sample_library(dir: &Path, clean: bool) -> Result<SampleLibrary, CatalogError> {
    if dir.exists() {
        if !clean {
            return Err(CatalogError::Fixture(format!(
                "{} already exists; use clean to replace it",
                dir.display()
            )));
        }
        info!(path = %dir.display(), "Removing existing test data");
        fs::remove_dir_all(dir)?;
    }

    fs::create_dir_all(dir)?;
    info!(path = %dir.display(), "Creating test data");

    let mut library = SampleLibrary {
        root: dir.to_path_buf(),
        config_path: dir.join("scan_targets.yaml"),
        files: 0,
        directories: 0,
        bytes: 0,
    };

    for (relative, files) in SAMPLE_TREE {
        let directory = dir.join(relative);
        fs::create_dir_all(&directory)?;
        library.directories += 1;

        for (name, size) in files.iter() {
            let path = directory.join(name);
            fs::write(&path, sample_content(name, *size))?;
            debug!(path = %path.display(), size, "Created file");
            library.files += 1;
            library.bytes += size;
        }
    }

    fs::write(&library.config_path, sample_config(dir))?;

    info!(
        files = library.files,
        directories = library.directories,
        "Test data created"
    );
    Ok(library)
}

/// Deterministic bytes, different per file name
fn sample_content(name: &str, size: u64) -> Vec<u8> {
    let seed = xxhash_rust::xxh3::xxh3_64(name.as_bytes());
    (0..size)
        .map(|i| (seed.rotate_left((i % 64) as u32) ^ i) as u8)
        .collect()
}

fn sample_config(root: &Path) -> String {
    let group = |name: &str, description: &str, category: Option<&str>| {
        let category = category
            .map(|c| format!("\n      category: {}", c))
            .unwrap_or_default();
        format!(
            "  {name}:\n    - path: {path:?}\n      description: {description}{category}\n",
            path = root.join(name).display().to_string(),
        )
    };

    format!(
        "target_directories:\n{}{}{}settings:\n  recursive: true\n",
        group("personal", "Sample personal library", Some("Personal")),
        group("work", "Sample work library", Some("Work")),
        group("backup", "Sample backup drive", None),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanTargetsConfig;
    use crate::core::catalog::Category;
    use tempfile::TempDir;

    #[test]
    fn generates_the_sample_tree() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("test_data");

        let library = generate_sample_library(&root, false).unwrap();

        assert_eq!(library.directories, SAMPLE_TREE.len());
        assert!(root.join("personal/2022/3StarQ70/export1.jpg").exists());
        assert!(root.join("work/products/2StarQ60").is_dir());
        assert_eq!(
            fs::metadata(root.join("backup/imports/camera_a/import1.arw"))
                .unwrap()
                .len(),
            8192
        );
    }

    #[test]
    fn content_is_deterministic() {
        assert_eq!(sample_content("a.jpg", 64), sample_content("a.jpg", 64));
        assert_ne!(sample_content("a.jpg", 64), sample_content("b.jpg", 64));
    }

    #[test]
    fn existing_directory_needs_clean() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("test_data");
        generate_sample_library(&root, false).unwrap();
        fs::write(root.join("stray.txt"), b"left over").unwrap();

        let err = generate_sample_library(&root, false).unwrap_err();
        assert!(matches!(err, CatalogError::Fixture(_)));

        generate_sample_library(&root, true).unwrap();
        assert!(!root.join("stray.txt").exists());
    }

    #[test]
    fn generated_config_loads() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("test_data");
        let library = generate_sample_library(&root, false).unwrap();

        let config = ScanTargetsConfig::load(&library.config_path).unwrap();
        let targets = config.targets();

        assert_eq!(targets.len(), 3);
        let work = targets.iter().find(|t| t.group == "work").unwrap();
        assert_eq!(work.path, root.join("work"));
        assert_eq!(work.category, Some(Category::Work));
    }
}
