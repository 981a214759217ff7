use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use ::exif::{Field, In, Reader, Tag, Value};

use super::{MetadataExtractor, MetadataRecord, TagValue};
use crate::error::ExtractionError;

/// In-process extractor over the EXIF block of JPEG, HEIF and TIFF-based RAW
/// containers.
#[derive(Debug, Clone)]
pub struct ExifExtractor {
    shutter_count_tags: Vec<String>,
}

impl ExifExtractor {
    pub fn new(shutter_count_tags: Vec<String>) -> Self {
        Self { shutter_count_tags }
    }
}

impl MetadataExtractor for ExifExtractor {
    fn extract(&self, path: &Path) -> Result<MetadataRecord, ExtractionError> {
        let file = File::open(path)?;
        let exif = Reader::new()
            .read_from_container(&mut BufReader::new(file))
            .map_err(map_exif_error)?;

        let mut tags = BTreeMap::new();
        for field in exif.fields().filter(|f| f.ifd_num == In::PRIMARY) {
            if let Some(value) = tag_value(field) {
                tags.insert(tag_name(field.tag), value);
            }
        }

        Ok(MetadataRecord::from_tags(tags, &self.shutter_count_tags))
    }
}

/// Map EXIF tags onto the names the rest of the crate looks up, so both
/// extractors produce the same vocabulary.
fn tag_name(tag: Tag) -> String {
    let canonical = if tag == Tag::DateTimeDigitized {
        "CreateDate"
    } else if tag == Tag::DateTime {
        "ModifyDate"
    } else if tag == Tag::PixelXDimension || tag == Tag::ImageWidth {
        "ImageWidth"
    } else if tag == Tag::PixelYDimension || tag == Tag::ImageLength {
        "ImageHeight"
    } else {
        return tag.to_string();
    };
    canonical.to_string()
}

fn tag_value(field: &Field) -> Option<TagValue> {
    match &field.value {
        Value::Ascii(parts) => {
            let bytes = parts.first()?;
            let text = String::from_utf8_lossy(bytes)
                .trim_end_matches('\0')
                .trim()
                .to_string();
            Some(TagValue::Text(text))
        }
        Value::Byte(_) | Value::Short(_) | Value::Long(_) => {
            field.value.get_uint(0).map(|n| TagValue::Integer(i64::from(n)))
        }
        _ => Some(TagValue::Text(field.display_value().to_string())),
    }
}

fn map_exif_error(err: ::exif::Error) -> ExtractionError {
    match err {
        ::exif::Error::Io(e) => ExtractionError::Io(e),
        ::exif::Error::NotFound(_) | ::exif::Error::NotSupported(_) => ExtractionError::Unsupported,
        other => ExtractionError::Corrupt(other.to_string()),
    }
}
