use std::fs;
use std::path::{Path, PathBuf};

use crate::classify::FileCategory;
use crate::date::ResolvedDate;
use crate::error::OrganizeError;

pub const SCREENSHOT_DIR: &str = "screenshots";
pub const NON_CAMERA_DIR: &str = "non_camera_images";

/// Maps category and capture date onto the output tree.
#[derive(Debug, Clone)]
pub struct PathPlanner {
    output_root: PathBuf,
    unprocessed_dir: String,
}

impl PathPlanner {
    pub fn new(output_root: impl Into<PathBuf>, unprocessed_dir: impl Into<String>) -> Self {
        Self {
            output_root: output_root.into(),
            unprocessed_dir: unprocessed_dir.into(),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Quarantine directory under the output root.
    pub fn unprocessed_root(&self) -> PathBuf {
        self.output_root.join(&self.unprocessed_dir)
    }

    /// Destination directory as path segments relative to the output root.
    pub fn plan_path(&self, category: FileCategory, date: &ResolvedDate) -> Vec<String> {
        let ts = &date.timestamp;
        let dated = |top: &str| {
            vec![
                top.to_string(),
                ts.format("%Y").to_string(),
                ts.format("%Y-%m").to_string(),
                ts.format("%Y-%m-%d").to_string(),
            ]
        };
        match category {
            FileCategory::Jpeg | FileCategory::Raw => dated(category.label()),
            FileCategory::Screenshot => vec![SCREENSHOT_DIR.to_string()],
            FileCategory::IconGraphic => vec![NON_CAMERA_DIR.to_string(), "icons".to_string()],
            FileCategory::VectorGraphic => vec![NON_CAMERA_DIR.to_string(), "vector".to_string()],
            FileCategory::OtherGraphic => vec![NON_CAMERA_DIR.to_string(), "graphics".to_string()],
            FileCategory::Unprocessable => Path::new(&self.unprocessed_dir)
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect(),
        }
    }

    /// Absolute destination directory.
    pub fn directory(&self, segments: &[String]) -> PathBuf {
        segments
            .iter()
            .fold(self.output_root.clone(), |dir, segment| dir.join(segment))
    }

    /// Create a destination directory; existing directories are fine, and
    /// concurrent callers on a shared prefix do not race.
    pub fn ensure_dir(dir: &Path) -> Result<(), OrganizeError> {
        fs::create_dir_all(dir).map_err(|e| OrganizeError::io(dir, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::DateProvenance;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn date() -> ResolvedDate {
        ResolvedDate {
            timestamp: NaiveDate::from_ymd_opt(2023, 12, 20)
                .unwrap()
                .and_hms_opt(15, 30, 0)
                .unwrap(),
            provenance: DateProvenance::Metadata,
            valid: true,
        }
    }

    #[test]
    fn test_camera_paths_are_date_partitioned() {
        let planner = PathPlanner::new("/out", "unprocessed");
        assert_eq!(
            planner.plan_path(FileCategory::Jpeg, &date()),
            ["jpg", "2023", "2023-12", "2023-12-20"]
        );
        assert_eq!(
            planner.plan_path(FileCategory::Raw, &date()).join("/"),
            "raw/2023/2023-12/2023-12-20"
        );
    }

    #[test]
    fn test_flat_paths() {
        let planner = PathPlanner::new("/out", "holding/unprocessed");
        assert_eq!(planner.plan_path(FileCategory::Screenshot, &date()), ["screenshots"]);
        assert_eq!(
            planner.plan_path(FileCategory::VectorGraphic, &date()),
            ["non_camera_images", "vector"]
        );
        assert_eq!(
            planner.plan_path(FileCategory::IconGraphic, &date()),
            ["non_camera_images", "icons"]
        );
        assert_eq!(
            planner.plan_path(FileCategory::OtherGraphic, &date()),
            ["non_camera_images", "graphics"]
        );
        let segments = planner.plan_path(FileCategory::Unprocessable, &date());
        assert_eq!(segments, ["holding", "unprocessed"]);
        assert_eq!(planner.directory(&segments), planner.unprocessed_root());
    }

    #[test]
    fn test_ensure_dir_is_idempotent() {
        let out = tempdir().unwrap();
        let planner = PathPlanner::new(out.path(), "unprocessed");
        let dir = planner.directory(&planner.plan_path(FileCategory::Jpeg, &date()));
        PathPlanner::ensure_dir(&dir).unwrap();
        PathPlanner::ensure_dir(&dir).unwrap();
        assert!(dir.is_dir());
        assert!(dir.ends_with("jpg/2023/2023-12/2023-12-20"));
    }
}
