//! Duplicate sweep over a single directory, independent of an organize run.
//!
//! Files are grouped by size, then by SHA-256 within same-size buckets. Each
//! group keeps one file chosen by a [`KeepPolicy`]; the rest are extras that
//! [`remove_extras`] deletes.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::bail;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::dedup::hash_file;
use crate::scan;

static NUMBERED_SUFFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_\d+$").unwrap());

/// Which copy of a duplicate group survives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeepPolicy {
    #[default]
    Newest,
    Oldest,
    /// Prefer names without a `_N` suffix, then the longest name.
    LongestName,
}

#[derive(Debug, Clone, Default)]
pub struct SweepOptions {
    pub keep: KeepPolicy,
    /// Rename `.jpeg` files to `.jpg` before grouping.
    pub fix_extensions: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateFile {
    pub path: PathBuf,
    pub modified: Option<DateTime<Utc>>,
    pub numbered: bool,
}

/// Byte-identical files; `files[0]` is the one kept.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    pub hash: String,
    pub size: u64,
    pub files: Vec<DuplicateFile>,
}

impl DuplicateGroup {
    pub fn keeper(&self) -> &DuplicateFile {
        &self.files[0]
    }

    pub fn extras(&self) -> &[DuplicateFile] {
        &self.files[1..]
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub scanned: u64,
    pub renamed: u64,
    pub groups: Vec<DuplicateGroup>,
    pub removed: u64,
    pub failed: u64,
}

impl SweepReport {
    pub fn extra_count(&self) -> u64 {
        self.groups.iter().map(|g| g.extras().len() as u64).sum()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} files scanned, {} duplicate groups, {} extras, {} removed, {} failed",
            self.scanned,
            self.groups.len(),
            self.extra_count(),
            self.removed,
            self.failed
        )
    }
}

/// True for stems ending in `_<digits>`, like `beach_1.jpg` or `IMG_0001.jpg`.
pub fn has_numbered_suffix(file_name: &str) -> bool {
    let stem = file_name.rsplit_once('.').map_or(file_name, |(stem, _)| stem);
    NUMBERED_SUFFIX.is_match(stem)
}

/// Group every file under `root` with its byte-identical copies.
pub fn find_duplicates(root: &Path, options: &SweepOptions) -> anyhow::Result<SweepReport> {
    if !root.is_dir() {
        bail!("Directory does not exist: {}", root.display());
    }
    let mut report = SweepReport::default();
    let mut files = scan::discover(root, &[]);
    report.scanned = files.len() as u64;
    if options.fix_extensions {
        report.renamed = fix_jpeg_extensions(&mut files);
    }

    let mut by_size: HashMap<u64, Vec<PathBuf>> = HashMap::new();
    for path in files {
        match fs::metadata(&path) {
            Ok(meta) => by_size.entry(meta.len()).or_default().push(path),
            Err(e) => warn!("Skipping {}: {e}", path.display()),
        }
    }

    // Only same-size files are worth hashing.
    let candidates: Vec<(u64, PathBuf)> = by_size
        .into_iter()
        .filter(|(_, paths)| paths.len() > 1)
        .flat_map(|(size, paths)| paths.into_iter().map(move |p| (size, p)))
        .collect();
    let hashed: Vec<(u64, String, PathBuf)> = candidates
        .into_par_iter()
        .filter_map(|(size, path)| match hash_file(&path) {
            Ok(hash) => Some((size, hash, path)),
            Err(e) => {
                warn!("Could not hash {}: {e}", path.display());
                None
            }
        })
        .collect();

    let mut by_content: HashMap<(u64, String), Vec<PathBuf>> = HashMap::new();
    for (size, hash, path) in hashed {
        by_content.entry((size, hash)).or_default().push(path);
    }

    report.groups = by_content
        .into_iter()
        .filter(|(_, paths)| paths.len() > 1)
        .map(|((size, hash), paths)| {
            let mut files: Vec<DuplicateFile> = paths.into_iter().map(describe).collect();
            rank(&mut files, options.keep);
            DuplicateGroup { hash, size, files }
        })
        .collect();
    report.groups.sort_by(|a, b| a.keeper().path.cmp(&b.keeper().path));

    info!(
        "{} files scanned, {} duplicate groups under {}",
        report.scanned,
        report.groups.len(),
        root.display()
    );
    Ok(report)
}

/// Delete every extra, keeping each group's first file.
pub fn remove_extras(report: &mut SweepReport) {
    for group in &report.groups {
        debug!("Keeping {}", group.keeper().path.display());
        for extra in group.extras() {
            match fs::remove_file(&extra.path) {
                Ok(()) => {
                    info!("Removed duplicate {}", extra.path.display());
                    report.removed += 1;
                }
                Err(e) => {
                    warn!("Could not remove {}: {e}", extra.path.display());
                    report.failed += 1;
                }
            }
        }
    }
}

fn describe(path: PathBuf) -> DuplicateFile {
    let modified = fs::metadata(&path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from);
    let numbered = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(has_numbered_suffix);
    DuplicateFile { path, modified, numbered }
}

/// Sort so the keeper comes first. Ties fall back to path order.
fn rank(files: &mut [DuplicateFile], keep: KeepPolicy) {
    match keep {
        // Unknown times never win.
        KeepPolicy::Newest => files.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.path.cmp(&b.path))),
        KeepPolicy::Oldest => files.sort_by(|a, b| {
            (a.modified.is_none(), a.modified)
                .cmp(&(b.modified.is_none(), b.modified))
                .then_with(|| a.path.cmp(&b.path))
        }),
        KeepPolicy::LongestName => files.sort_by(|a, b| {
            let len = |f: &DuplicateFile| f.path.file_name().map_or(0, |n| n.len());
            a.numbered
                .cmp(&b.numbered)
                .then_with(|| len(b).cmp(&len(a)))
                .then_with(|| a.path.cmp(&b.path))
        }),
    }
}

/// Rename `*.jpeg` to `*.jpg` in place, unless the target name is taken.
fn fix_jpeg_extensions(files: &mut [PathBuf]) -> u64 {
    let mut renamed = 0;
    for path in files.iter_mut() {
        let is_jpeg = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("jpeg"));
        if !is_jpeg {
            continue;
        }
        let target = path.with_extension("jpg");
        if target.exists() {
            warn!("Not renaming {}: {} exists", path.display(), target.display());
            continue;
        }
        match fs::rename(&*path, &target) {
            Ok(()) => {
                debug!("Renamed {} to {}", path.display(), target.display());
                *path = target;
                renamed += 1;
            }
            Err(e) => warn!("Could not rename {}: {e}", path.display()),
        }
    }
    renamed
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use tempfile::tempdir;

    fn write(root: &Path, name: &str, bytes: &[u8], mtime: i64) -> PathBuf {
        let path = root.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, bytes).unwrap();
        filetime::set_file_mtime(&path, FileTime::from_unix_time(mtime, 0)).unwrap();
        path
    }

    fn file_names(group: &DuplicateGroup) -> Vec<String> {
        group
            .files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_numbered_suffix() {
        assert!(has_numbered_suffix("beach_1.jpg"));
        assert!(has_numbered_suffix("IMG_0001.JPG"));
        assert!(!has_numbered_suffix("beach.jpg"));
        assert!(!has_numbered_suffix("beach_v2.jpg"));
    }

    #[test]
    fn test_groups_only_identical_content() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.jpg", b"same bytes", 1_600_000_000);
        write(dir.path(), "nested/b.jpg", b"same bytes", 1_600_000_100);
        // Same size, different content.
        write(dir.path(), "c.jpg", b"diff bytes", 1_600_000_200);
        write(dir.path(), "d.jpg", b"unique", 1_600_000_300);

        let report = find_duplicates(dir.path(), &SweepOptions::default()).unwrap();
        assert_eq!(report.scanned, 4);
        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.groups[0].size, 10);
        // Newest is kept by default.
        assert_eq!(file_names(&report.groups[0]), ["b.jpg", "a.jpg"]);
        assert_eq!(report.extra_count(), 1);
    }

    #[test]
    fn test_keep_policies() {
        let dir = tempdir().unwrap();
        write(dir.path(), "beach_1.jpg", b"x", 1_600_000_300);
        write(dir.path(), "beach.jpg", b"x", 1_600_000_200);
        write(dir.path(), "beach-sunset_2.jpg", b"x", 1_600_000_100);

        let names = |keep| {
            let options = SweepOptions { keep, fix_extensions: false };
            file_names(&find_duplicates(dir.path(), &options).unwrap().groups[0])
        };
        assert_eq!(names(KeepPolicy::Newest), ["beach_1.jpg", "beach.jpg", "beach-sunset_2.jpg"]);
        assert_eq!(names(KeepPolicy::Oldest), ["beach-sunset_2.jpg", "beach.jpg", "beach_1.jpg"]);
        assert_eq!(names(KeepPolicy::LongestName), ["beach.jpg", "beach-sunset_2.jpg", "beach_1.jpg"]);
    }

    #[test]
    fn test_remove_extras_keeps_one() {
        let dir = tempdir().unwrap();
        let keep = write(dir.path(), "new.png", b"png", 1_600_000_100);
        let old = write(dir.path(), "old.png", b"png", 1_600_000_000);

        let mut report = find_duplicates(dir.path(), &SweepOptions::default()).unwrap();
        remove_extras(&mut report);
        assert_eq!((report.removed, report.failed), (1, 0));
        assert!(keep.exists());
        assert!(!old.exists());
        assert_eq!(
            report.summary(),
            "2 files scanned, 1 duplicate groups, 1 extras, 1 removed, 0 failed"
        );
    }

    #[test]
    fn test_fix_extensions() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.JPEG", b"one", 1_600_000_000);
        write(dir.path(), "b.jpeg", b"two", 1_600_000_000);
        write(dir.path(), "b.jpg", b"taken", 1_600_000_000);

        let options = SweepOptions { fix_extensions: true, ..Default::default() };
        let report = find_duplicates(dir.path(), &options).unwrap();
        assert_eq!(report.renamed, 1);
        assert!(dir.path().join("a.jpg").exists());
        assert!(dir.path().join("b.jpeg").exists());
    }

    #[test]
    fn test_missing_directory_is_error() {
        let dir = tempdir().unwrap();
        assert!(find_duplicates(&dir.path().join("nope"), &SweepOptions::default()).is_err());
    }
}
