use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use log::warn;
use walkdir::{DirEntry, WalkDir};

/// Hidden entries and Office lock files are never picked up.
pub(crate) fn is_ignored_name(name: &OsStr) -> bool {
    name.to_str()
        .is_some_and(|name| name.starts_with('.') || name.starts_with("~$"))
}

fn is_ignored(entry: &DirEntry) -> bool {
    entry.depth() > 0 && is_ignored_name(entry.file_name())
}

/// Every regular file under `root`, sorted by path. Entries inside any
/// `exclude` subtree are skipped.
pub fn discover(root: &Path, exclude: &[PathBuf]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| !is_ignored(e) && !exclude.iter().any(|ex| e.path().starts_with(ex)))
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(e) => {
                warn!("Skipping unreadable entry: {e}");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(DirEntry::into_path)
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_discover_sorted_and_filtered() {
        let root = tempdir().unwrap();
        let p = root.path();
        fs::create_dir_all(p.join("b/nested")).unwrap();
        fs::create_dir_all(p.join(".thumbnails")).unwrap();
        fs::create_dir_all(p.join("organized/jpg")).unwrap();
        for name in [
            "b/nested/z.jpg",
            "a.png",
            ".DS_Store",
            "~$report.docx",
            ".thumbnails/t.jpg",
            "organized/jpg/x.jpg",
        ] {
            fs::write(p.join(name), b"x").unwrap();
        }

        let found = discover(p, &[p.join("organized")]);
        let relative: Vec<_> = found
            .iter()
            .map(|f| f.strip_prefix(p).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(relative, ["a.png", "b/nested/z.jpg"]);
    }
}
