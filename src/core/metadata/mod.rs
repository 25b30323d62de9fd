//! # Metadata Module
//!
//! Best-effort metadata extraction with ordered fallback.
//!
//! ## Tiers
//! 1. [`ExifExtractor`] - embedded EXIF tags (capture time, camera, lens,
//!    exposure, unique image id) from JPEG/TIFF-based containers
//! 2. [`HeaderExtractor`] - raster header dimensions, a prefix fingerprint
//!    and filesystem timestamps; works on anything readable
//!
//! [`ExtractorChain`] tries each tier in turn and always returns a record.
//! A file neither tier understands still gets catalogued, just with an
//! empty metadata body.

mod chain;
mod embedded;
mod header;

pub use chain::{ExtractFailure, Extraction, ExtractorChain};
pub use embedded::ExifExtractor;
pub use header::HeaderExtractor;

use crate::core::scanner::PhotoFormat;
use crate::error::ExtractError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Extracted photo metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhotoMetadata {
    /// Original capture date/time
    pub date_taken: Option<DateTime<Utc>>,
    /// Image width in pixels
    pub width: Option<u32>,
    /// Image height in pixels
    pub height: Option<u32>,
    /// Camera make (e.g., "Canon")
    pub camera_make: Option<String>,
    /// Camera model (e.g., "EOS R5")
    pub camera_model: Option<String>,
    pub lens_model: Option<String>,
    /// Image orientation (1-8, where 1 is normal)
    pub orientation: Option<u16>,
    pub iso: Option<u32>,
    pub f_number: Option<f64>,
    /// Exposure time as displayed, e.g. "1/250 s"
    pub exposure_time: Option<String>,
    /// EXIF ImageUniqueID, when the camera writes one
    pub unique_id: Option<String>,
    /// xxh3 of the first 64 KiB, hex encoded
    pub prefix_fingerprint: Option<String>,
    /// Every readable tag, rendered as text
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl PhotoMetadata {
    /// Check if any metadata was extracted
    pub fn has_data(&self) -> bool {
        self.date_taken.is_some()
            || self.width.is_some()
            || self.height.is_some()
            || self.camera_make.is_some()
            || self.camera_model.is_some()
            || self.unique_id.is_some()
            || self.prefix_fingerprint.is_some()
            || !self.tags.is_empty()
    }

    /// Get a display string for the camera
    pub fn camera_display(&self) -> Option<String> {
        match (&self.camera_make, &self.camera_model) {
            (Some(make), Some(model)) => {
                if model.starts_with(make) {
                    Some(model.clone())
                } else {
                    Some(format!("{} {}", make, model))
                }
            }
            (None, Some(model)) => Some(model.clone()),
            (Some(make), None) => Some(make.clone()),
            (None, None) => None,
        }
    }

    /// Get dimensions as a formatted string
    pub fn dimensions_display(&self) -> Option<String> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some(format!("{}x{}", w, h)),
            _ => None,
        }
    }
}

/// One extraction tier.
///
/// Implementations report failure through `Err`; they must not panic on
/// malformed input.
pub trait MetadataExtractor: Send + Sync {
    /// Short name recorded as the metadata source
    fn name(&self) -> &'static str;

    /// Extract metadata for a file of the given format
    fn extract(&self, path: &Path, format: PhotoFormat) -> Result<PhotoMetadata, ExtractError>;
}
