pub mod exif;
pub mod exiftool;

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::ExtractionError;

pub use self::exif::ExifExtractor;
pub use self::exiftool::ExiftoolExtractor;

/// Capture-time tags, best first.
const CAPTURE_TIME_TAGS: &[&str] = &["DateTimeOriginal", "CreateDate", "DateTimeDigitized"];

/// A single metadata value as reported by the extraction backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl TagValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            TagValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Numeric view. Text holding digits yields its last digit group, since
    /// counters are sometimes embedded in serial-number strings.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            TagValue::Integer(n) => Some(*n),
            TagValue::Float(f) if f.fract() == 0.0 && *f >= 0.0 => Some(*f as i64),
            TagValue::Float(_) => None,
            TagValue::Text(s) => s
                .split(|c: char| !c.is_ascii_digit())
                .filter(|group| !group.is_empty())
                .last()
                .and_then(|group| group.parse().ok()),
        }
    }
}

/// Immutable result of extracting one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub capture_time: Option<NaiveDateTime>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub shutter_count: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub software: Option<String>,
    /// Every tag the backend returned, for rules that need more than the
    /// typed fields.
    pub tags: BTreeMap<String, TagValue>,
}

impl MetadataRecord {
    /// Derive the typed fields from a raw tag map.
    pub fn from_tags(tags: BTreeMap<String, TagValue>, shutter_count_tags: &[String]) -> Self {
        let text = |name: &str| {
            tags.get(name)
                .and_then(TagValue::as_text)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let dimension = |name: &str| {
            tags.get(name)
                .and_then(TagValue::as_integer)
                .and_then(|n| u32::try_from(n).ok())
        };

        let capture_time = CAPTURE_TIME_TAGS
            .iter()
            .filter_map(|name| tags.get(*name).and_then(TagValue::as_text))
            .find_map(parse_exif_datetime);

        let shutter_count = shutter_count_tags
            .iter()
            .filter_map(|name| tags.get(name.as_str()))
            .find_map(|value| value.as_integer().and_then(|n| u64::try_from(n).ok()))
            .filter(|n| *n > 0);

        Self {
            capture_time,
            make: text("Make"),
            model: text("Model"),
            shutter_count,
            width: dimension("ImageWidth"),
            height: dimension("ImageHeight"),
            software: text("Software"),
            tags,
        }
    }

    /// Whether make or model identifies a camera body.
    pub fn has_camera_identity(&self) -> bool {
        self.make.is_some() || self.model.is_some()
    }
}

/// Boundary to whatever reads tags out of image files.
pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<MetadataRecord, ExtractionError>;
}

/// Extractor that never finds metadata; only the filename and filesystem
/// date tiers apply.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMetadata;

impl MetadataExtractor for NoMetadata {
    fn extract(&self, _path: &Path) -> Result<MetadataRecord, ExtractionError> {
        Err(ExtractionError::Unsupported)
    }
}

/// Parse an EXIF-style datetime (`YYYY:MM:DD HH:MM:SS`). Separators other
/// than `:` are tolerated, as are trailing sub-seconds and zone offsets.
pub fn parse_exif_datetime(s: &str) -> Option<NaiveDateTime> {
    let trimmed = s.trim();
    let head = trimmed.get(..19).unwrap_or(trimmed);
    let cleaned = head
        .replace('T', " ")
        .replace('-', ":")
        .replace('/', ":")
        .replace('\\', ":")
        .replace('.', ":");

    if cleaned.starts_with("0000") {
        return None;
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(&cleaned, "%Y:%m:%d %H:%M:%S") {
        return Some(dt);
    }

    if let Ok(d) = NaiveDate::parse_from_str(cleaned.split(' ').next()?, "%Y:%m:%d") {
        return d.and_hms_opt(0, 0, 0);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn record(pairs: &[(&str, TagValue)]) -> MetadataRecord {
        let tags = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        MetadataRecord::from_tags(tags, &Config::default().shutter_count_tags)
    }

    #[test]
    fn test_parse_exif_datetime() {
        let expected = NaiveDate::from_ymd_opt(2023, 12, 20)
            .unwrap()
            .and_hms_opt(15, 30, 0)
            .unwrap();
        assert_eq!(parse_exif_datetime("2023:12:20 15:30:00"), Some(expected));
        assert_eq!(parse_exif_datetime("2023-12-20T15:30:00"), Some(expected));
        assert_eq!(parse_exif_datetime("2023:12:20 15:30:00.25+01:00"), Some(expected));
        assert!(parse_exif_datetime("0000:00:00 00:00:00").is_none());
        assert!(parse_exif_datetime("not a date").is_none());
        assert_eq!(
            parse_exif_datetime("2023:12:20"),
            NaiveDate::from_ymd_opt(2023, 12, 20).unwrap().and_hms_opt(0, 0, 0)
        );
    }

    #[test]
    fn test_capture_time_prefers_original() {
        let rec = record(&[
            ("CreateDate", TagValue::Text("2020:01:01 00:00:00".into())),
            ("DateTimeOriginal", TagValue::Text("2019:05:06 07:08:09".into())),
        ]);
        assert_eq!(
            rec.capture_time.unwrap().format("%Y%m%d-%H%M%S").to_string(),
            "20190506-070809"
        );
    }

    #[test]
    fn test_shutter_count_tags_in_order() {
        let rec = record(&[
            ("ImageNumber", TagValue::Integer(7)),
            ("InternalSerialNumber", TagValue::Text("SN 0431 2201".into())),
        ]);
        assert_eq!(rec.shutter_count, Some(2201));

        let rec = record(&[("ShutterCount", TagValue::Float(12345.0))]);
        assert_eq!(rec.shutter_count, Some(12345));

        let rec = record(&[("ShutterCount", TagValue::Integer(0))]);
        assert_eq!(rec.shutter_count, None);
    }

    #[test]
    fn test_blank_camera_fields_are_absent() {
        let rec = record(&[
            ("Make", TagValue::Text("   ".into())),
            ("Model", TagValue::Text(" D5100 ".into())),
            ("ImageWidth", TagValue::Integer(6000)),
        ]);
        assert_eq!(rec.make, None);
        assert_eq!(rec.model.as_deref(), Some("D5100"));
        assert_eq!(rec.width, Some(6000));
        assert!(rec.has_camera_identity());
        assert!(!MetadataRecord::default().has_camera_identity());
    }

    #[test]
    fn test_tag_value_from_json() {
        let value: BTreeMap<String, TagValue> =
            serde_json::from_str(r#"{"Make": "NIKON", "ImageWidth": 4928, "FNumber": 5.6}"#)
                .unwrap();
        assert_eq!(value["Make"], TagValue::Text("NIKON".into()));
        assert_eq!(value["ImageWidth"], TagValue::Integer(4928));
        assert_eq!(value["FNumber"], TagValue::Float(5.6));
    }
}
