use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

/// Tunables injected into the engine. Every field has a default, so a config
/// file only needs the keys it overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Quarantine directory, relative to the output root.
    pub unprocessed_dir: String,
    pub date_bounds: DateBounds,
    pub extensions: ExtensionTable,
    pub screenshots: ScreenshotRules,
    /// Editors whose `Software` tag marks a non-camera image.
    pub design_software: Vec<String>,
    /// Tags tried in order for a shutter count.
    pub shutter_count_tags: Vec<String>,
    /// Per-file limit for subprocess-based extraction.
    pub extraction_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            unprocessed_dir: "unprocessed".to_string(),
            date_bounds: DateBounds::default(),
            extensions: ExtensionTable::default(),
            screenshots: ScreenshotRules::default(),
            design_software: strings(&[
                "photoshop",
                "illustrator",
                "inkscape",
                "gimp",
                "paint",
                "sketch",
                "figma",
                "canva",
            ]),
            shutter_count_tags: strings(&[
                "ShutterCount",
                "ImageCount",
                "ShutterCountValue",
                "SonyImageCount",
                "ShutterCounter",
                "InternalSerialNumber",
                "ImageNumber",
            ]),
            extraction_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load a JSON config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DateBounds {
    /// Earliest plausible capture year.
    pub min_year: i32,
    /// `YYYY-MM-DD` placeholders written by cameras with an unset clock.
    pub rejected_dates: Vec<String>,
}

impl Default for DateBounds {
    fn default() -> Self {
        Self {
            min_year: 1985,
            rejected_dates: strings(&["1970-01-01", "1980-01-01"]),
        }
    }
}

/// Extension → category tables. Lowercase, without the leading dot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionTable {
    pub jpeg: Vec<String>,
    pub raw: Vec<String>,
    pub vector: Vec<String>,
    pub icon: Vec<String>,
    pub graphic: Vec<String>,
}

impl Default for ExtensionTable {
    fn default() -> Self {
        Self {
            jpeg: strings(&["jpg", "jpeg", "heic"]),
            raw: strings(&["arw", "cr2", "cr3", "nef", "dng"]),
            vector: strings(&["svg", "eps", "ai"]),
            icon: strings(&["ico", "icns"]),
            graphic: strings(&["gif", "png", "bmp", "tif", "tiff"]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenshotRules {
    /// Regexes matched against the file name.
    pub filename_patterns: Vec<String>,
    /// Case-insensitive substrings of the `Software` tag.
    pub software_markers: Vec<String>,
    /// Extensions devices use for screen captures.
    pub capture_extensions: Vec<String>,
    /// Minimum width for the "no camera metadata" heuristic.
    pub min_screen_width: u32,
}

impl Default for ScreenshotRules {
    fn default() -> Self {
        Self {
            filename_patterns: strings(&[
                r"(?i)^screen ?shot",
                r"(?i)^scr(een)?_\d",
                r"(?i)^bildschirmfoto",
                r"(?i)^capture d.(é|e)cran",
                r"^スクリーンショット",
                r"^截屏",
            ]),
            software_markers: strings(&["screenshot", "screen capture", "screencapture"]),
            capture_extensions: strings(&["png"]),
            min_screen_width: 800,
        }
    }
}
