//! # Scanner Module
//!
//! The tree walker: enumerates a target directory lazily, depth-first and
//! in lexical order, pruning excluded directories and never following
//! symbolic links.
//!
//! ## Supported Formats
//! - Camera RAW: DNG, CR2, CR3, NEF, ARW, RAF, ORF, RW2, SRW, X3F
//! - Raster: JPEG, TIFF, PNG, BMP
//!
//! Other files are still enumerated (they count towards directory
//! accounting) but are never handed to the metadata extractor.
//!
//! ## Example
//! ```rust,ignore
//! use photo_catalog::core::scanner::{ExclusionFilter, TreeWalker};
//!
//! let filter = ExclusionFilter::new(&["*StarQ*".to_string()])?;
//! let walker = TreeWalker::new("/photos/lib", true, filter);
//! for entry in walker.walk() {
//!     println!("{:?}", entry?);
//! }
//! ```

mod filter;
mod walker;

pub use filter::ExclusionFilter;
pub use walker::{TreeWalker, Walk, WalkEntry};

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Photographic formats recognised by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhotoFormat {
    Dng,
    Cr2,
    Cr3,
    Nef,
    Arw,
    Raf,
    Orf,
    Rw2,
    Srw,
    X3f,
    Jpeg,
    Tiff,
    Png,
    Bmp,
    Unsupported,
}

impl PhotoFormat {
    /// Detect format from a file extension, case-insensitively
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "dng" => PhotoFormat::Dng,
            "cr2" => PhotoFormat::Cr2,
            "cr3" => PhotoFormat::Cr3,
            "nef" => PhotoFormat::Nef,
            "arw" => PhotoFormat::Arw,
            "raf" => PhotoFormat::Raf,
            "orf" => PhotoFormat::Orf,
            "rw2" => PhotoFormat::Rw2,
            "srw" => PhotoFormat::Srw,
            "x3f" => PhotoFormat::X3f,
            "jpg" | "jpeg" => PhotoFormat::Jpeg,
            "tif" | "tiff" => PhotoFormat::Tiff,
            "png" => PhotoFormat::Png,
            "bmp" => PhotoFormat::Bmp,
            _ => PhotoFormat::Unsupported,
        }
    }

    /// Detect format from a path's extension
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(PhotoFormat::from_extension)
            .unwrap_or(PhotoFormat::Unsupported)
    }

    /// Lowercase name, accepted back by [`PhotoFormat::from_extension`]
    pub fn as_str(&self) -> &'static str {
        match self {
            PhotoFormat::Dng => "dng",
            PhotoFormat::Cr2 => "cr2",
            PhotoFormat::Cr3 => "cr3",
            PhotoFormat::Nef => "nef",
            PhotoFormat::Arw => "arw",
            PhotoFormat::Raf => "raf",
            PhotoFormat::Orf => "orf",
            PhotoFormat::Rw2 => "rw2",
            PhotoFormat::Srw => "srw",
            PhotoFormat::X3f => "x3f",
            PhotoFormat::Jpeg => "jpeg",
            PhotoFormat::Tiff => "tiff",
            PhotoFormat::Png => "png",
            PhotoFormat::Bmp => "bmp",
            PhotoFormat::Unsupported => "unsupported",
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, PhotoFormat::Unsupported)
    }

    pub fn is_raw(&self) -> bool {
        matches!(
            self,
            PhotoFormat::Dng
                | PhotoFormat::Cr2
                | PhotoFormat::Cr3
                | PhotoFormat::Nef
                | PhotoFormat::Arw
                | PhotoFormat::Raf
                | PhotoFormat::Orf
                | PhotoFormat::Rw2
                | PhotoFormat::Srw
                | PhotoFormat::X3f
        )
    }

    pub fn is_raster(&self) -> bool {
        matches!(
            self,
            PhotoFormat::Jpeg | PhotoFormat::Tiff | PhotoFormat::Png | PhotoFormat::Bmp
        )
    }

    /// Whether EXIF lives in a TIFF or JPEG container kamadak-exif can parse
    pub fn has_exif_container(&self) -> bool {
        matches!(
            self,
            PhotoFormat::Dng
                | PhotoFormat::Cr2
                | PhotoFormat::Nef
                | PhotoFormat::Arw
                | PhotoFormat::Orf
                | PhotoFormat::Rw2
                | PhotoFormat::Srw
                | PhotoFormat::Jpeg
                | PhotoFormat::Tiff
                | PhotoFormat::Png
        )
    }
}

impl std::fmt::Display for PhotoFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PhotoFormat::Dng => "DNG",
            PhotoFormat::Cr2 => "CR2",
            PhotoFormat::Cr3 => "CR3",
            PhotoFormat::Nef => "NEF",
            PhotoFormat::Arw => "ARW",
            PhotoFormat::Raf => "RAF",
            PhotoFormat::Orf => "ORF",
            PhotoFormat::Rw2 => "RW2",
            PhotoFormat::Srw => "SRW",
            PhotoFormat::X3f => "X3F",
            PhotoFormat::Jpeg => "JPEG",
            PhotoFormat::Tiff => "TIFF",
            PhotoFormat::Png => "PNG",
            PhotoFormat::Bmp => "BMP",
            PhotoFormat::Unsupported => "unsupported",
        };
        write!(f, "{}", name)
    }
}
