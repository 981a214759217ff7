use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::date::ResolvedDate;
use crate::metadata::MetadataRecord;

/// Exactly one per file, decided once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCategory {
    Jpeg,
    Raw,
    Screenshot,
    IconGraphic,
    VectorGraphic,
    OtherGraphic,
    Unprocessable,
}

impl FileCategory {
    /// Camera categories get date-partitioned directories and canonical names.
    pub fn is_camera(self) -> bool {
        matches!(self, Self::Jpeg | Self::Raw)
    }

    /// Short name used for camera top-level directories and report lines.
    pub fn label(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Raw => "raw",
            Self::Screenshot => "screenshot",
            Self::IconGraphic => "non_camera_icon",
            Self::VectorGraphic => "non_camera_vector",
            Self::OtherGraphic => "non_camera_graphic",
            Self::Unprocessable => "unprocessable",
        }
    }
}

/// Lowercased extension without the dot.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default()
}

/// Decides whether a file is a screen capture.
pub trait ScreenshotPredicate: Send + Sync {
    fn is_screenshot(&self, path: &Path, metadata: Option<&MetadataRecord>) -> bool;
}

impl<F> ScreenshotPredicate for F
where
    F: Fn(&Path, Option<&MetadataRecord>) -> bool + Send + Sync,
{
    fn is_screenshot(&self, path: &Path, metadata: Option<&MetadataRecord>) -> bool {
        self(path, metadata)
    }
}

/// Default screenshot detection: either a known capture naming convention,
/// a capture tool in `Software`, or a screen-sized capture-format image that
/// carries no camera identity.
#[derive(Debug, Clone)]
pub struct ScreenshotHeuristics {
    filename_patterns: Vec<Regex>,
    software_markers: Vec<String>,
    design_software: Vec<String>,
    capture_extensions: HashSet<String>,
    min_screen_width: u32,
}

impl ScreenshotHeuristics {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let rules = &config.screenshots;
        let filename_patterns = rules
            .filename_patterns
            .iter()
            .map(|p| Regex::new(p).with_context(|| format!("Invalid screenshot pattern: {p}")))
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            filename_patterns,
            software_markers: lowercase_all(&rules.software_markers),
            design_software: lowercase_all(&config.design_software),
            capture_extensions: lowercase_all(&rules.capture_extensions).into_iter().collect(),
            min_screen_width: rules.min_screen_width,
        })
    }

    pub fn matches_filename(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        self.filename_patterns.iter().any(|re| re.is_match(name))
    }

    pub fn matches_metadata(&self, path: &Path, metadata: &MetadataRecord) -> bool {
        let software = metadata.software.as_deref().unwrap_or("").to_lowercase();
        if self.software_markers.iter().any(|m| software.contains(m.as_str())) {
            return true;
        }
        if metadata.has_camera_identity() || self.design_software.iter().any(|d| software.contains(d.as_str())) {
            return false;
        }
        self.capture_extensions.contains(&extension_of(path))
            && metadata.width.is_some_and(|w| w >= self.min_screen_width)
    }
}

impl ScreenshotPredicate for ScreenshotHeuristics {
    fn is_screenshot(&self, path: &Path, metadata: Option<&MetadataRecord>) -> bool {
        self.matches_filename(path) || metadata.is_some_and(|m| self.matches_metadata(path, m))
    }
}

fn lowercase_all(values: &[String]) -> Vec<String> {
    values.iter().map(|v| v.to_lowercase()).collect()
}

/// Assigns a [`FileCategory`] from extension, metadata and the resolved date.
pub struct Classifier {
    jpeg: HashSet<String>,
    raw: HashSet<String>,
    vector: HashSet<String>,
    icon: HashSet<String>,
    graphic: HashSet<String>,
    design_software: Vec<String>,
    screenshot: Box<dyn ScreenshotPredicate>,
}

impl Classifier {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let table = |values: &[String]| -> HashSet<String> {
            values
                .iter()
                .map(|v| v.trim_start_matches('.').to_lowercase())
                .collect()
        };
        let ext = &config.extensions;
        Ok(Self {
            jpeg: table(&ext.jpeg),
            raw: table(&ext.raw),
            vector: table(&ext.vector),
            icon: table(&ext.icon),
            graphic: table(&ext.graphic),
            design_software: lowercase_all(&config.design_software),
            screenshot: Box::new(ScreenshotHeuristics::from_config(config)?),
        })
    }

    /// Replace the screenshot heuristic.
    pub fn with_screenshot_predicate(mut self, predicate: impl ScreenshotPredicate + 'static) -> Self {
        self.screenshot = Box::new(predicate);
        self
    }

    pub fn classify(&self, path: &Path, metadata: Option<&MetadataRecord>, date: &ResolvedDate) -> FileCategory {
        self.classify_explained(path, metadata, date).0
    }

    /// Category plus, for `Unprocessable`, the reason.
    pub fn classify_explained(
        &self,
        path: &Path,
        metadata: Option<&MetadataRecord>,
        date: &ResolvedDate,
    ) -> (FileCategory, Option<&'static str>) {
        if !date.valid {
            return (FileCategory::Unprocessable, Some("no plausible capture date"));
        }

        let ext = extension_of(path);
        let has_camera = metadata.is_some_and(MetadataRecord::has_camera_identity);

        // 1-2. Structural hints: the extension alone decides.
        if self.vector.contains(&ext) {
            return (FileCategory::VectorGraphic, None);
        }
        if self.icon.contains(&ext) {
            return (FileCategory::IconGraphic, None);
        }

        // 3. Soft signal, ahead of the camera checks.
        if self.screenshot.is_screenshot(path, metadata) {
            return (FileCategory::Screenshot, None);
        }

        // 4-5. Camera photos.
        if self.raw.contains(&ext) {
            return (FileCategory::Raw, None);
        }
        if self.jpeg.contains(&ext) {
            if has_camera {
                return (FileCategory::Jpeg, None);
            }
            if self.made_with_design_software(metadata) {
                return (FileCategory::OtherGraphic, None);
            }
            return (FileCategory::Unprocessable, Some("photo without camera metadata"));
        }

        // 6. Generic graphics.
        if self.graphic.contains(&ext) {
            if has_camera {
                return (FileCategory::Unprocessable, Some("graphic format with camera metadata"));
            }
            return (FileCategory::OtherGraphic, None);
        }

        (FileCategory::Unprocessable, Some("unsupported file type"))
    }

    fn made_with_design_software(&self, metadata: Option<&MetadataRecord>) -> bool {
        let Some(software) = metadata.and_then(|m| m.software.as_deref()) else {
            return false;
        };
        let software = software.to_lowercase();
        self.design_software.iter().any(|d| software.contains(d.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::DateProvenance;
    use chrono::NaiveDate;

    fn valid_date() -> ResolvedDate {
        ResolvedDate {
            timestamp: NaiveDate::from_ymd_opt(2023, 12, 20)
                .unwrap()
                .and_hms_opt(15, 30, 0)
                .unwrap(),
            provenance: DateProvenance::Metadata,
            valid: true,
        }
    }

    fn camera() -> MetadataRecord {
        MetadataRecord {
            make: Some("Nikon".into()),
            model: Some("D5100".into()),
            ..Default::default()
        }
    }

    fn classifier() -> Classifier {
        Classifier::new(&Config::default()).unwrap()
    }

    fn class(name: &str, metadata: Option<&MetadataRecord>) -> FileCategory {
        classifier().classify(Path::new(name), metadata, &valid_date())
    }

    #[test]
    fn test_vector_wins_over_metadata() {
        assert_eq!(class("logo.svg", Some(&camera())), FileCategory::VectorGraphic);
        assert_eq!(class("Screenshot_2020.svg", None), FileCategory::VectorGraphic);
        assert_eq!(class("app.ICNS", None), FileCategory::IconGraphic);
    }

    #[test]
    fn test_camera_photos() {
        assert_eq!(class("DSC_0001.JPG", Some(&camera())), FileCategory::Jpeg);
        assert_eq!(class("IMG_0001.heic", Some(&camera())), FileCategory::Jpeg);
        assert_eq!(class("DSC_0001.nef", Some(&camera())), FileCategory::Raw);
        // RAW is structural: no metadata needed.
        assert_eq!(class("DSC_0001.cr2", None), FileCategory::Raw);
    }

    #[test]
    fn test_jpeg_without_camera_identity() {
        assert_eq!(class("download.jpg", None), FileCategory::Unprocessable);
        let edited = MetadataRecord {
            software: Some("Adobe Photoshop 24.0".into()),
            ..Default::default()
        };
        assert_eq!(class("banner.jpg", Some(&edited)), FileCategory::OtherGraphic);
    }

    #[test]
    fn test_screenshot_by_filename() {
        assert_eq!(class("Screenshot 2023-01-02 at 10.11.12.png", None), FileCategory::Screenshot);
        assert_eq!(class("Screen Shot 2019-01-01.jpg", Some(&camera())), FileCategory::Screenshot);
        assert_eq!(class("Bildschirmfoto 2020.png", None), FileCategory::Screenshot);
    }

    #[test]
    fn test_screenshot_by_metadata() {
        let captured = MetadataRecord {
            width: Some(2532),
            height: Some(1170),
            ..Default::default()
        };
        assert_eq!(class("IMG_4411.png", Some(&captured)), FileCategory::Screenshot);

        let tool = MetadataRecord {
            software: Some("macOS Screenshot".into()),
            ..Default::default()
        };
        assert_eq!(class("capture.jpg", Some(&tool)), FileCategory::Screenshot);

        let small = MetadataRecord {
            width: Some(64),
            ..Default::default()
        };
        assert_eq!(class("sprite.png", Some(&small)), FileCategory::OtherGraphic);

        let designed = MetadataRecord {
            width: Some(1920),
            software: Some("GIMP 2.10".into()),
            ..Default::default()
        };
        assert_eq!(class("poster.png", Some(&designed)), FileCategory::OtherGraphic);
    }

    #[test]
    fn test_graphics_and_unknown() {
        assert_eq!(class("anim.gif", None), FileCategory::OtherGraphic);
        assert_eq!(class("scan.tiff", None), FileCategory::OtherGraphic);
        assert_eq!(class("notes.txt", None), FileCategory::Unprocessable);
        assert_eq!(class("no_extension", None), FileCategory::Unprocessable);
    }

    #[test]
    fn test_invalid_date_is_unprocessable() {
        let mut date = valid_date();
        date.valid = false;
        let (category, reason) =
            classifier().classify_explained(Path::new("logo.svg"), None, &date);
        assert_eq!(category, FileCategory::Unprocessable);
        assert_eq!(reason, Some("no plausible capture date"));
    }

    #[test]
    fn test_custom_screenshot_predicate() {
        let classifier = classifier()
            .with_screenshot_predicate(|path: &Path, _: Option<&MetadataRecord>| {
                path.to_string_lossy().contains("capture")
            });
        let date = valid_date();
        assert_eq!(
            classifier.classify(Path::new("capture-01.png"), None, &date),
            FileCategory::Screenshot
        );
        assert_eq!(
            classifier.classify(Path::new("Screenshot_1.png"), None, &date),
            FileCategory::OtherGraphic
        );
    }

    #[test]
    fn test_invalid_pattern_is_error() {
        let mut config = Config::default();
        config.screenshots.filename_patterns.push("(unclosed".into());
        assert!(Classifier::new(&config).is_err());
    }
}
