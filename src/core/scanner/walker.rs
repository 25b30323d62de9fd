//! Directory walking implementation using walkdir.

use super::filter::ExclusionFilter;
use crate::error::ScanError;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// One enumerated filesystem entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    pub path: PathBuf,
    pub is_dir: bool,
    /// 0 for the walk root
    pub depth: usize,
    /// Size from the entry's own metadata, when it could be read
    pub size: Option<u64>,
}

/// Walks one root directory.
///
/// The walker holds only configuration; every call to [`TreeWalker::walk`]
/// starts a fresh traversal, so a walk can be restarted from scratch.
#[derive(Debug, Clone)]
pub struct TreeWalker {
    root: PathBuf,
    recursive: bool,
    filter: ExclusionFilter,
}

impl TreeWalker {
    pub fn new(root: impl Into<PathBuf>, recursive: bool, filter: ExclusionFilter) -> Self {
        Self {
            root: root.into(),
            recursive,
            filter,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn filter(&self) -> &ExclusionFilter {
        &self.filter
    }

    /// Start a new lazy traversal.
    ///
    /// Yields the root first, then its contents depth-first with each
    /// directory's entries in lexical order. Excluded directories are pruned
    /// with everything beneath them. Errors are yielded in place and the walk
    /// continues with the next sibling.
    pub fn walk(&self) -> Walk {
        let mut walker = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name();

        if !self.recursive {
            walker = walker.max_depth(1);
        }

        let filter = self.filter.clone();
        let prune: Box<dyn FnMut(&DirEntry) -> bool + Send> = Box::new(move |entry| {
            entry.depth() == 0 || !filter.matches_name(&entry.file_name().to_string_lossy())
        });

        Walk {
            inner: walker.into_iter().filter_entry(prune),
            root: self.root.clone(),
        }
    }
}

/// A lazy, in-progress traversal
pub struct Walk {
    inner: walkdir::FilterEntry<walkdir::IntoIter, Box<dyn FnMut(&DirEntry) -> bool + Send>>,
    root: PathBuf,
}

impl Iterator for Walk {
    type Item = Result<WalkEntry, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(self.convert_error(e))),
            };

            let file_type = entry.file_type();
            if file_type.is_symlink() {
                debug!(path = %entry.path().display(), "Skipping symbolic link");
                continue;
            }

            let is_dir = file_type.is_dir();
            let size = if is_dir {
                None
            } else {
                entry.metadata().ok().map(|m| m.len())
            };
            let depth = entry.depth();

            return Some(Ok(WalkEntry {
                path: entry.into_path(),
                is_dir,
                depth,
                size,
            }));
        }
    }
}

impl Walk {
    fn convert_error(&self, error: walkdir::Error) -> ScanError {
        let path = error
            .path()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| self.root.clone());

        if error.loop_ancestor().is_some() {
            return ScanError::Loop { path };
        }

        match error.io_error().map(|e| e.kind()) {
            Some(std::io::ErrorKind::PermissionDenied) => ScanError::PermissionDenied { path },
            Some(std::io::ErrorKind::NotFound) if path == self.root => {
                ScanError::DirectoryNotFound { path }
            }
            _ => ScanError::ReadEntry {
                path,
                source: std::io::Error::new(std::io::ErrorKind::Other, error.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        let mut file = File::create(path).unwrap();
        file.write_all(&[0xFF, 0xD8, 0xFF, 0xE0]).unwrap();
    }

    fn sample_tree() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("b_event")).unwrap();
        fs::create_dir_all(root.join("a_event/nested")).unwrap();
        fs::create_dir_all(root.join("3StarQ70")).unwrap();
        touch(&root.join("z.jpg"));
        touch(&root.join("a_event/img2.dng"));
        touch(&root.join("a_event/img1.dng"));
        touch(&root.join("a_event/nested/deep.jpg"));
        touch(&root.join("b_event/photo.nef"));
        touch(&root.join("3StarQ70/export1.jpg"));
        temp_dir
    }

    fn export_filter() -> ExclusionFilter {
        ExclusionFilter::new(&["*StarQ*".to_string()]).unwrap()
    }

    fn relative(root: &Path, entries: &[WalkEntry]) -> Vec<String> {
        entries
            .iter()
            .map(|e| {
                e.path
                    .strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }

    #[test]
    fn walk_is_depth_first_and_lexical() {
        let temp_dir = sample_tree();
        let walker = TreeWalker::new(temp_dir.path(), true, export_filter());

        let entries: Vec<_> = walker.walk().map(|e| e.unwrap()).collect();

        assert_eq!(
            relative(temp_dir.path(), &entries),
            vec![
                "",
                "a_event",
                "a_event/img1.dng",
                "a_event/img2.dng",
                "a_event/nested",
                "a_event/nested/deep.jpg",
                "b_event",
                "b_event/photo.nef",
                "z.jpg",
            ]
        );
        assert_eq!(entries[0].depth, 0);
        assert!(entries[0].is_dir);
        assert_eq!(entries[5].depth, 3);
    }

    #[test]
    fn excluded_directory_is_pruned_entirely() {
        let temp_dir = sample_tree();
        let walker = TreeWalker::new(temp_dir.path(), true, export_filter());

        let found: Vec<_> = walker.walk().map(|e| e.unwrap().path).collect();

        assert!(found.iter().all(|p| !p.to_string_lossy().contains("StarQ")));
    }

    #[test]
    fn non_recursive_yields_immediate_children_only() {
        let temp_dir = sample_tree();
        let walker = TreeWalker::new(temp_dir.path(), false, export_filter());

        let entries: Vec<_> = walker.walk().map(|e| e.unwrap()).collect();

        assert_eq!(
            relative(temp_dir.path(), &entries),
            vec!["", "a_event", "b_event", "z.jpg"]
        );
    }

    #[test]
    fn walk_can_be_restarted() {
        let temp_dir = sample_tree();
        let walker = TreeWalker::new(temp_dir.path(), true, export_filter());

        let first: Vec<_> = walker.walk().take(3).map(|e| e.unwrap()).collect();
        let second: Vec<_> = walker.walk().take(3).map(|e| e.unwrap()).collect();

        assert_eq!(first, second);
    }

    #[test]
    fn file_sizes_are_reported() {
        let temp_dir = sample_tree();
        let walker = TreeWalker::new(temp_dir.path(), true, ExclusionFilter::none());

        let jpg = walker
            .walk()
            .map(|e| e.unwrap())
            .find(|e| e.path.ends_with("z.jpg"))
            .unwrap();

        assert_eq!(jpg.size, Some(4));
        assert!(!jpg.is_dir);
    }

    #[test]
    fn missing_root_yields_error() {
        let walker = TreeWalker::new("/nonexistent/path/12345", true, ExclusionFilter::none());

        let results: Vec<_> = walker.walk().collect();

        assert_eq!(results.len(), 1);
        assert!(matches!(
            results[0],
            Err(ScanError::DirectoryNotFound { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_directory_is_reported_and_siblings_still_walked() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let locked = root.join("a_locked");
        fs::create_dir_all(&locked).unwrap();
        fs::create_dir_all(root.join("b_open")).unwrap();
        touch(&locked.join("hidden.jpg"));
        touch(&root.join("b_open/visible.jpg"));

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read_dir(&locked).is_ok() {
            // Running as root; permission bits are not enforced
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let results: Vec<_> = TreeWalker::new(root, true, ExclusionFilter::none())
            .walk()
            .collect();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let error_at = results.iter().position(|r| r.is_err()).unwrap();
        assert!(matches!(
            &results[error_at],
            Err(ScanError::PermissionDenied { path }) if path == &locked
        ));
        assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);

        let found: Vec<_> = results
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .map(|e| e.path.clone())
            .collect();
        assert!(found.contains(&locked));
        assert!(found.contains(&root.join("b_open/visible.jpg")));
        assert!(!found.iter().any(|p| p.ends_with("hidden.jpg")));

        let sibling_at = results
            .iter()
            .position(|r| matches!(r, Ok(e) if e.path.ends_with("b_open")))
            .unwrap();
        assert!(sibling_at > error_at);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_not_followed() {
        let temp_dir = sample_tree();
        std::os::unix::fs::symlink(temp_dir.path(), temp_dir.path().join("loop")).unwrap();
        let walker = TreeWalker::new(temp_dir.path(), true, export_filter());

        let found: Vec<_> = walker.walk().map(|e| e.unwrap().path).collect();

        assert!(!found.iter().any(|p| p.ends_with("loop")));
        assert_eq!(found.len(), 9);
    }
}
