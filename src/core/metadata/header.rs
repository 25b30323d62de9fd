//! Lightweight tier: image header fields, prefix fingerprint, file times.

use super::{MetadataExtractor, PhotoMetadata};
use crate::core::scanner::PhotoFormat;
use crate::error::ExtractError;
use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use tracing::debug;
use xxhash_rust::xxh3::xxh3_64;

/// Bytes hashed for the prefix fingerprint
const PREFIX_SIZE: u64 = 64 * 1024;

/// Fallback extractor for anything the EXIF tier cannot read
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderExtractor;

impl HeaderExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl MetadataExtractor for HeaderExtractor {
    fn name(&self) -> &'static str {
        "image_header"
    }

    fn extract(&self, path: &Path, format: PhotoFormat) -> Result<PhotoMetadata, ExtractError> {
        let unreadable = |e: std::io::Error| ExtractError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        let fs_meta = fs::metadata(path).map_err(unreadable)?;
        let mut metadata = PhotoMetadata::default();

        if format.is_raster() {
            match image::image_dimensions(path) {
                Ok((width, height)) => {
                    metadata.width = Some(width);
                    metadata.height = Some(height);
                }
                Err(e) => debug!(path = %path.display(), error = %e, "No readable image header"),
            }
        }

        let mut prefix = Vec::with_capacity(PREFIX_SIZE.min(fs_meta.len()) as usize);
        File::open(path)
            .and_then(|f| f.take(PREFIX_SIZE).read_to_end(&mut prefix))
            .map_err(unreadable)?;
        if !prefix.is_empty() {
            metadata.prefix_fingerprint = Some(format!("{:016x}", xxh3_64(&prefix)));
        }

        metadata
            .tags
            .insert("File Size".to_string(), fs_meta.len().to_string());
        if let Ok(modified) = fs_meta.modified() {
            metadata.tags.insert(
                "File ModifyDate".to_string(),
                DateTime::<Utc>::from(modified).to_rfc3339(),
            );
        }
        if let Ok(created) = fs_meta.created() {
            metadata.tags.insert(
                "File CreateDate".to_string(),
                DateTime::<Utc>::from(created).to_rfc3339(),
            );
        }

        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    /// 1x1 RGB PNG
    const TINY_PNG: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x02, 0x00, 0x00, 0x00, 0x90,
        0x77, 0x53, 0xDE, 0x00, 0x00, 0x00, 0x0C, 0x49, 0x44, 0x41, 0x54, 0x08, 0xD7, 0x63, 0xF8,
        0xFF, 0xFF, 0x3F, 0x00, 0x05, 0xFE, 0x02, 0xFE, 0xDC, 0xCC, 0x59, 0xE7, 0x00, 0x00, 0x00,
        0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
    ];

    #[test]
    fn reads_png_dimensions() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tiny.png");
        File::create(&path).unwrap().write_all(TINY_PNG).unwrap();

        let meta = HeaderExtractor::new().extract(&path, PhotoFormat::Png).unwrap();

        assert_eq!(meta.dimensions_display(), Some("1x1".to_string()));
        assert!(meta.prefix_fingerprint.is_some());
    }

    #[test]
    fn raw_file_still_gets_fingerprint_and_times() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("img001.dng");
        File::create(&path).unwrap().write_all(&[7u8; 2048]).unwrap();

        let meta = HeaderExtractor::new().extract(&path, PhotoFormat::Dng).unwrap();

        assert!(meta.width.is_none());
        assert_eq!(meta.tags.get("File Size").map(String::as_str), Some("2048"));
        assert!(meta.tags.contains_key("File ModifyDate"));
        assert!(meta.has_data());
    }

    #[test]
    fn identical_prefixes_share_a_fingerprint() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a.jpg");
        let b = temp_dir.path().join("b.jpg");
        File::create(&a).unwrap().write_all(b"same bytes").unwrap();
        File::create(&b).unwrap().write_all(b"same bytes").unwrap();

        let extractor = HeaderExtractor::new();
        let fa = extractor.extract(&a, PhotoFormat::Jpeg).unwrap().prefix_fingerprint;
        let fb = extractor.extract(&b, PhotoFormat::Jpeg).unwrap().prefix_fingerprint;

        assert!(fa.is_some());
        assert_eq!(fa, fb);
    }

    #[test]
    fn missing_file_is_unreadable() {
        let err = HeaderExtractor::new()
            .extract(Path::new("/nonexistent/a.jpg"), PhotoFormat::Jpeg)
            .unwrap_err();
        assert!(matches!(err, ExtractError::Unreadable { .. }));
    }
}
