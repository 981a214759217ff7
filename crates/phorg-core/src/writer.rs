use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use filetime::FileTime;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::engine::{PlacementAction, PlacementDecision};
use crate::error::OrganizeError;
use crate::planner::PathPlanner;
use crate::scan;

/// How placed files leave the input tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    #[default]
    Move,
    Copy,
}

/// What happened to a duplicate's source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    SourceRemoved,
    SourceKept,
}

/// Carry out a move or quarantine decision. Never overwrites.
pub fn apply_transfer(
    decision: &PlacementDecision,
    output_root: &Path,
    mode: TransferMode,
) -> Result<PathBuf, OrganizeError> {
    let Some(target) = decision.destination(output_root) else {
        return Err(OrganizeError::io(
            &decision.source,
            io::Error::new(io::ErrorKind::InvalidInput, "decision has no destination"),
        ));
    };
    if let Some(dir) = target.parent() {
        PathPlanner::ensure_dir(dir)?;
    }
    transfer(&decision.source, &target, mode).map_err(|e| OrganizeError::io(&decision.source, e))?;
    Ok(target)
}

/// Discard a duplicate source, but only once its original is on disk.
pub fn apply_duplicate(
    decision: &PlacementDecision,
    mode: TransferMode,
    keep_duplicates: bool,
) -> Result<Applied, OrganizeError> {
    let PlacementAction::DuplicateSkip { original } = &decision.action else {
        return Ok(Applied::SourceKept);
    };
    if mode == TransferMode::Copy || keep_duplicates {
        return Ok(Applied::SourceKept);
    }
    if !original.is_file() {
        warn!(
            "Keeping {}: original {} is not on disk",
            decision.source.display(),
            original.display()
        );
        return Ok(Applied::SourceKept);
    }
    fs::remove_file(&decision.source).map_err(|e| OrganizeError::io(&decision.source, e))?;
    debug!("Removed duplicate {}", decision.source.display());
    Ok(Applied::SourceRemoved)
}

fn transfer(source: &Path, target: &Path, mode: TransferMode) -> io::Result<()> {
    if target.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", target.display()),
        ));
    }
    match mode {
        TransferMode::Copy => copy_new(source, target),
        TransferMode::Move => match fs::rename(source, target) {
            Ok(()) => Ok(()),
            // Cross-device moves fall back to copy + delete.
            Err(e) => {
                debug!("rename {} failed ({e}), copying", source.display());
                copy_new(source, target)?;
                fs::remove_file(source)
            }
        },
    }
}

/// Copy into a file that must not exist yet, carrying the source mtime over.
fn copy_new(source: &Path, target: &Path) -> io::Result<()> {
    let meta = fs::metadata(source)?;
    let mut reader = BufReader::new(File::open(source)?);
    let out = OpenOptions::new().write(true).create_new(true).open(target)?;
    let mut writer = BufWriter::new(out);
    if let Err(e) = io::copy(&mut reader, &mut writer).and_then(|_| writer.flush()) {
        drop(writer);
        let _ = fs::remove_file(target);
        return Err(e);
    }
    drop(writer);
    filetime::set_file_mtime(target, FileTime::from_last_modification_time(&meta))?;
    Ok(())
}

/// What the move-mode cleanup removed from the input tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneStats {
    pub dirs: usize,
    pub junk_files: usize,
}

/// Remove directories under `root` left empty by a move run. Hidden and
/// `~$` lock files are deleted first so they do not pin their directory.
/// `root` itself and the `exclude` subtrees are never touched.
pub fn prune_empty_dirs(root: &Path, exclude: &[PathBuf]) -> PruneStats {
    let mut stats = PruneStats::default();
    // Children come before their directory, so a directory is tried only
    // after its junk is gone. Excluded subtrees are skipped per entry.
    let entries = WalkDir::new(root).min_depth(1).contents_first(true).into_iter().flatten();
    for entry in entries {
        let path = entry.path();
        if exclude.iter().any(|ex| path.starts_with(ex)) {
            continue;
        }
        if entry.file_type().is_dir() {
            // Fails on non-empty directories, which is the filter we want.
            if fs::remove_dir(path).is_ok() {
                debug!("Pruned {}", path.display());
                stats.dirs += 1;
            }
        } else if scan::is_ignored_name(entry.file_name()) {
            match fs::remove_file(path) {
                Ok(()) => {
                    debug!("Removed {}", path.display());
                    stats.junk_files += 1;
                }
                Err(e) => warn!("Could not remove {}: {e}", path.display()),
            }
        }
    }
    stats
}
