//! Basename exclusion rules for the walker and the comparator.

use crate::error::ScanError;
use glob::Pattern;
use std::path::{Component, Path};

/// Glob patterns matched against a single path component
#[derive(Debug, Clone, Default)]
pub struct ExclusionFilter {
    patterns: Vec<Pattern>,
}

impl ExclusionFilter {
    /// Compile exclusion globs. An invalid pattern is an error, not a silent skip.
    pub fn new(patterns: &[String]) -> Result<Self, ScanError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| ScanError::InvalidPattern {
                    pattern: p.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { patterns })
    }

    /// A filter that excludes nothing
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Check a bare file or directory name
    pub fn matches_name(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(name))
    }

    /// Check the basename of a path
    pub fn is_excluded(&self, path: &Path) -> bool {
        path.file_name()
            .map(|name| self.matches_name(&name.to_string_lossy()))
            .unwrap_or(false)
    }

    /// Check every normal component of a (usually relative) path
    pub fn matches_any_segment(&self, path: &Path) -> bool {
        path.components().any(|c| match c {
            Component::Normal(name) => self.matches_name(&name.to_string_lossy()),
            _ => false,
        })
    }
}
