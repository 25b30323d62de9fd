//! Rich tier: embedded EXIF tags via kamadak-exif.

use super::{MetadataExtractor, PhotoMetadata};
use crate::core::scanner::PhotoFormat;
use crate::error::ExtractError;
use chrono::{DateTime, NaiveDateTime, Utc};
use exif::{Exif, In, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Undefined-typed values longer than this are binary blobs, not tags
const MAX_UNDEFINED_TAG_BYTES: usize = 64;

/// Reads embedded EXIF from JPEG and TIFF-based RAW containers
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifExtractor;

impl ExifExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl MetadataExtractor for ExifExtractor {
    fn name(&self) -> &'static str {
        "exif"
    }

    fn extract(&self, path: &Path, format: PhotoFormat) -> Result<PhotoMetadata, ExtractError> {
        if !format.has_exif_container() {
            return Err(ExtractError::UnsupportedFormat {
                extractor: self.name(),
                path: path.to_path_buf(),
            });
        }

        let file = File::open(path).map_err(|e| ExtractError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut bufreader = BufReader::new(file);
        let exif = Reader::new()
            .read_from_container(&mut bufreader)
            .map_err(|e| match e {
                exif::Error::NotFound(_) => ExtractError::NoMetadata {
                    path: path.to_path_buf(),
                },
                exif::Error::Io(io) => ExtractError::Unreadable {
                    path: path.to_path_buf(),
                    reason: io.to_string(),
                },
                other => ExtractError::Malformed {
                    path: path.to_path_buf(),
                    reason: other.to_string(),
                },
            })?;

        let metadata = read_fields(&exif);
        if !metadata.has_data() {
            return Err(ExtractError::NoMetadata {
                path: path.to_path_buf(),
            });
        }

        Ok(metadata)
    }
}

fn read_fields(exif: &Exif) -> PhotoMetadata {
    let mut metadata = PhotoMetadata::default();

    // DateTimeOriginal, then the digitized and file-change stamps
    metadata.date_taken = [Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime]
        .iter()
        .filter_map(|tag| exif.get_field(*tag, In::PRIMARY))
        .find_map(|field| get_string_value(&field.value).and_then(|s| parse_exif_datetime(&s)));

    if let Some(field) = exif.get_field(Tag::PixelXDimension, In::PRIMARY) {
        metadata.width = get_u32_value(&field.value);
    }
    if let Some(field) = exif.get_field(Tag::PixelYDimension, In::PRIMARY) {
        metadata.height = get_u32_value(&field.value);
    }
    if metadata.width.is_none() {
        if let Some(field) = exif.get_field(Tag::ImageWidth, In::PRIMARY) {
            metadata.width = get_u32_value(&field.value);
        }
    }
    if metadata.height.is_none() {
        if let Some(field) = exif.get_field(Tag::ImageLength, In::PRIMARY) {
            metadata.height = get_u32_value(&field.value);
        }
    }

    if let Some(field) = exif.get_field(Tag::Make, In::PRIMARY) {
        metadata.camera_make = get_string_value(&field.value);
    }
    if let Some(field) = exif.get_field(Tag::Model, In::PRIMARY) {
        metadata.camera_model = get_string_value(&field.value);
    }
    if let Some(field) = exif.get_field(Tag::LensModel, In::PRIMARY) {
        metadata.lens_model = get_string_value(&field.value);
    }
    if let Some(field) = exif.get_field(Tag::Orientation, In::PRIMARY) {
        if let Value::Short(ref vec) = field.value {
            metadata.orientation = vec.first().copied();
        }
    }
    if let Some(field) = exif.get_field(Tag::PhotographicSensitivity, In::PRIMARY) {
        metadata.iso = get_u32_value(&field.value);
    }
    if let Some(field) = exif.get_field(Tag::FNumber, In::PRIMARY) {
        if let Value::Rational(ref vec) = field.value {
            metadata.f_number = vec.first().map(|r| r.to_f64());
        }
    }
    if let Some(field) = exif.get_field(Tag::ExposureTime, In::PRIMARY) {
        metadata.exposure_time = Some(field.display_value().with_unit(exif).to_string());
    }
    if let Some(field) = exif.get_field(Tag::ImageUniqueID, In::PRIMARY) {
        metadata.unique_id = get_string_value(&field.value);
    }

    for field in exif.fields() {
        if field.tag == Tag::MakerNote {
            continue;
        }
        if let Value::Undefined(ref bytes, _) = field.value {
            if bytes.len() > MAX_UNDEFINED_TAG_BYTES {
                continue;
            }
        }

        let ifd = if field.ifd_num == In::PRIMARY {
            "Image"
        } else if field.ifd_num == In::THUMBNAIL {
            "Thumbnail"
        } else {
            "Other"
        };
        metadata.tags.insert(
            format!("{} {}", ifd, field.tag),
            field.display_value().with_unit(exif).to_string(),
        );
    }

    metadata
}

/// EXIF date format: "YYYY:MM:DD HH:MM:SS", no zone; read as UTC
fn parse_exif_datetime(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s.trim(), "%Y:%m:%d %H:%M:%S")
        .ok()
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
}

fn get_u32_value(value: &Value) -> Option<u32> {
    match value {
        Value::Long(vec) => vec.first().copied(),
        Value::Short(vec) => vec.first().map(|v| *v as u32),
        _ => None,
    }
}

fn get_string_value(value: &Value) -> Option<String> {
    if let Value::Ascii(ref vec) = value {
        if let Some(bytes) = vec.first() {
            if let Ok(s) = std::str::from_utf8(bytes) {
                let trimmed = s.trim_end_matches('\0').trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn parses_exif_datetime() {
        let parsed = parse_exif_datetime("2022:07:14 18:30:05").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2022-07-14T18:30:05+00:00");
        assert!(parse_exif_datetime("0000:00:00 00:00:00").is_none());
    }

    #[test]
    fn string_values_are_trimmed() {
        let value = Value::Ascii(vec![b"Canon  \0".to_vec()]);
        assert_eq!(get_string_value(&value), Some("Canon".to_string()));

        let blank = Value::Ascii(vec![b"   \0".to_vec()]);
        assert_eq!(get_string_value(&blank), None);
    }

    #[test]
    fn unsupported_container_is_rejected_without_io() {
        let err = ExifExtractor::new()
            .extract(Path::new("/nonexistent/img.cr3"), PhotoFormat::Cr3)
            .unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat { .. }));
    }

    #[test]
    fn missing_file_is_unreadable() {
        let err = ExifExtractor::new()
            .extract(Path::new("/nonexistent/img.jpg"), PhotoFormat::Jpeg)
            .unwrap_err();
        assert!(matches!(err, ExtractError::Unreadable { .. }));
    }

    #[test]
    fn garbage_file_is_a_typed_failure() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("corrupt.nef");
        File::create(&path)
            .unwrap()
            .write_all(b"this is not a raw file")
            .unwrap();

        let result = ExifExtractor::new().extract(&path, PhotoFormat::Nef);

        assert!(result.is_err());
    }
}
