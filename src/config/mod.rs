//! # Config Module
//!
//! Loads scan targets and scan settings from a YAML file.
//!
//! ```yaml
//! target_directories:
//!   personal:
//!     - path: /photos/lib
//!       description: Primary library
//!       category: Personal
//! settings:
//!   recursive: true
//!   exclude_patterns: ["*StarQ*", ".git*"]
//! ```

use crate::core::catalog::Category;
use crate::core::session::{ScanRequest, ScanTarget};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directories the walker never descends into, matched against basenames
pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &[
    "*StarQ*",
    "$RECYCLE.BIN*",
    "System Volume Information*",
    "RECYCLER*",
    ".Trash*",
    ".DS_Store*",
    "Thumbs.db*",
    "desktop.ini*",
    ".git*",
    "__pycache__*",
    "node_modules*",
    ".svn*",
    ".hg*",
];

/// Lightroom export folders, ignored when comparing directories
pub const DEFAULT_EXPORT_PATTERNS: &[&str] = &["*StarQ*"];

/// One configured target directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetDirectory {
    pub path: PathBuf,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
}

/// Global scan settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSettings {
    #[serde(default = "default_recursive")]
    pub recursive: bool,

    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    #[serde(default = "default_export_patterns")]
    pub export_patterns: Vec<String>,

    /// Worker threads for extraction and catalog writes
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Timeout for each extraction tier call on a file; 0 disables it
    #[serde(default = "default_extraction_timeout")]
    pub extraction_timeout_secs: u64,

    /// Take a throughput sample every N processed files
    #[serde(default = "default_sample_every")]
    pub sample_every: u64,

    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

fn default_recursive() -> bool {
    true
}

fn default_exclude_patterns() -> Vec<String> {
    DEFAULT_EXCLUDE_PATTERNS.iter().map(|p| p.to_string()).collect()
}

fn default_export_patterns() -> Vec<String> {
    DEFAULT_EXPORT_PATTERNS.iter().map(|p| p.to_string()).collect()
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(4)
}

fn default_extraction_timeout() -> u64 {
    30
}

fn default_sample_every() -> u64 {
    100
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            recursive: default_recursive(),
            exclude_patterns: default_exclude_patterns(),
            export_patterns: default_export_patterns(),
            workers: default_workers(),
            extraction_timeout_secs: default_extraction_timeout(),
            sample_every: default_sample_every(),
            database_path: None,
        }
    }
}

impl ScanSettings {
    pub fn extraction_timeout(&self) -> Option<Duration> {
        match self.extraction_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// Contents of a scan-targets YAML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanTargetsConfig {
    /// Group name (personal, work, backup, ...) to directories
    #[serde(default)]
    pub target_directories: BTreeMap<String, Vec<TargetDirectory>>,

    #[serde(default)]
    pub settings: ScanSettings,
}

impl ScanTargetsConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_yaml(&content, path)
    }

    /// Parse configuration text; `origin` is only used in error messages
    pub fn from_yaml(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Names of all configured groups
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.target_directories.keys().map(String::as_str)
    }

    /// Flatten all groups into one target list, each tagged with its group
    pub fn targets(&self) -> Vec<ScanTarget> {
        self.target_directories
            .iter()
            .flat_map(|(group, dirs)| {
                dirs.iter().map(move |dir| ScanTarget {
                    path: dir.path.clone(),
                    description: dir.description.clone(),
                    category: dir.category.as_deref().and_then(Category::parse),
                    group: group.clone(),
                })
            })
            .collect()
    }

    /// Targets for one group, or all targets when `group` is `None`
    pub fn targets_for_group(&self, group: Option<&str>) -> Result<Vec<ScanTarget>, ConfigError> {
        let targets = self.targets();
        match group {
            None => Ok(targets),
            Some(name) => {
                let selected: Vec<_> = targets.into_iter().filter(|t| t.group == name).collect();
                if selected.is_empty() {
                    Err(ConfigError::UnknownGroup {
                        group: name.to_string(),
                    })
                } else {
                    Ok(selected)
                }
            }
        }
    }

    /// Build a scan request for a group selection
    pub fn scan_request(&self, group: Option<&str>) -> Result<ScanRequest, ConfigError> {
        let targets = self.targets_for_group(group)?;
        let scan_type = match group {
            Some(name) => format!("group:{}", name),
            None => "full".to_string(),
        };

        Ok(ScanRequest {
            scan_type,
            targets,
            exclude_patterns: self.settings.exclude_patterns.clone(),
            recursive: self.settings.recursive,
            concurrency: self.settings.workers.max(1),
            extraction_timeout: self.settings.extraction_timeout(),
            sample_every: self.settings.sample_every.max(1),
        })
    }

    /// Configured catalog path, or the per-user default
    pub fn database_path(&self) -> PathBuf {
        self.settings
            .database_path
            .clone()
            .unwrap_or_else(default_database_path)
    }
}

/// `<data dir>/photo-catalog/catalog.db`
pub fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("photo-catalog")
        .join("catalog.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
target_directories:
  personal:
    - path: /photos/lib
      description: Primary library
      category: Personal
  backup:
    - path: /mnt/old
      description: Old backup
    - path: /mnt/older
settings:
  recursive: false
  workers: 3
"#;

    fn sample() -> ScanTargetsConfig {
        ScanTargetsConfig::from_yaml(SAMPLE, Path::new("test.yaml")).unwrap()
    }

    #[test]
    fn flattens_groups_and_tags_targets() {
        let targets = sample().targets();
        assert_eq!(targets.len(), 3);

        let lib = targets.iter().find(|t| t.path == Path::new("/photos/lib")).unwrap();
        assert_eq!(lib.group, "personal");
        assert_eq!(lib.category, Some(Category::Personal));

        let old = targets.iter().find(|t| t.path == Path::new("/mnt/old")).unwrap();
        assert_eq!(old.group, "backup");
        assert_eq!(old.category, None);
    }

    #[test]
    fn missing_settings_fall_back_to_defaults() {
        let config = sample();
        assert!(!config.settings.recursive);
        assert_eq!(config.settings.workers, 3);
        assert!(config
            .settings
            .exclude_patterns
            .contains(&"*StarQ*".to_string()));
        assert_eq!(config.settings.extraction_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn group_selection_filters_targets() {
        let request = sample().scan_request(Some("backup")).unwrap();
        assert_eq!(request.targets.len(), 2);
        assert_eq!(request.scan_type, "group:backup");
        assert!(!request.recursive);
    }

    #[test]
    fn unknown_group_is_an_error() {
        let err = sample().targets_for_group(Some("archive")).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownGroup { .. }));
    }

    #[test]
    fn malformed_yaml_reports_origin() {
        let err = ScanTargetsConfig::from_yaml("target_directories: [", Path::new("bad.yaml"))
            .unwrap_err();
        assert!(err.to_string().contains("bad.yaml"));
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = ScanTargetsConfig::load(Path::new("/nonexistent/targets.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }
}
