use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::classify::FileCategory;
use crate::date::DateProvenance;
use crate::writer::TransferMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Placed,
    DuplicateSkip,
    Quarantined,
    /// Could not be written anywhere; the source is untouched.
    Failed,
}

/// Per-file line of the run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileOutcome {
    pub source: PathBuf,
    pub destination: Option<PathBuf>,
    pub kind: OutcomeKind,
    pub category: FileCategory,
    pub provenance: DateProvenance,
    pub reason: Option<String>,
    /// A duplicate whose source was deleted from the input tree.
    #[serde(default)]
    pub discarded: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub mode: TransferMode,
    pub dry_run: bool,
    pub total_files: u64,
    pub placed: u64,
    pub duplicates: u64,
    pub quarantined: u64,
    pub failed: u64,
    /// Output files registered before the run started.
    pub seeded: u64,
    /// Duplicate sources deleted once their original was in place.
    pub discarded: u64,
    pub pruned_dirs: u64,
    /// Hidden and lock files deleted so their directories could be pruned.
    pub removed_junk: u64,
    pub by_category: BTreeMap<FileCategory, u64>,
    pub outcomes: Vec<FileOutcome>,
}

impl RunReport {
    pub fn new(mode: TransferMode, dry_run: bool) -> Self {
        Self {
            mode,
            dry_run,
            ..Default::default()
        }
    }

    pub fn record(&mut self, outcome: FileOutcome) {
        self.total_files += 1;
        match outcome.kind {
            OutcomeKind::Placed => self.placed += 1,
            OutcomeKind::DuplicateSkip => self.duplicates += 1,
            OutcomeKind::Quarantined => self.quarantined += 1,
            OutcomeKind::Failed => self.failed += 1,
        }
        if outcome.discarded {
            self.discarded += 1;
        }
        *self.by_category.entry(outcome.category).or_default() += 1;
        self.outcomes.push(outcome);
    }

    /// Files that ended up in quarantine or failed, with their reasons.
    pub fn problems(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.kind, OutcomeKind::Quarantined | OutcomeKind::Failed))
    }

    pub fn summary(&self) -> String {
        let verb = match (self.dry_run, self.mode) {
            (true, _) => "planned",
            (false, TransferMode::Move) => "moved",
            (false, TransferMode::Copy) => "copied",
        };
        format!(
            "{} files: {} {}, {} duplicates, {} quarantined, {} failed",
            self.total_files, self.placed, verb, self.duplicates, self.quarantined, self.failed
        )
    }

    /// `jpg=3, screenshot=1, ...` in category order, zero counts left out.
    pub fn category_breakdown(&self) -> String {
        self.by_category
            .iter()
            .map(|(category, count)| format!("{}={count}", category.label()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn write_json(&self, path: &Path) -> anyhow::Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create report {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .map_err(anyhow::Error::from)
            .and_then(|_| writer.flush().map_err(anyhow::Error::from))
            .with_context(|| format!("Failed to write report {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn outcome(kind: OutcomeKind, category: FileCategory) -> FileOutcome {
        FileOutcome {
            source: PathBuf::from("in/a.jpg"),
            destination: None,
            kind,
            category,
            provenance: DateProvenance::Metadata,
            reason: None,
            discarded: false,
        }
    }

    #[test]
    fn test_counters() {
        let mut report = RunReport::new(TransferMode::Copy, false);
        report.record(outcome(OutcomeKind::Placed, FileCategory::Jpeg));
        report.record(outcome(OutcomeKind::DuplicateSkip, FileCategory::Jpeg));
        report.record(outcome(OutcomeKind::Quarantined, FileCategory::Unprocessable));

        assert_eq!(report.total_files, 3);
        assert_eq!(report.by_category[&FileCategory::Jpeg], 2);
        assert_eq!(report.problems().count(), 1);
        assert_eq!(report.summary(), "3 files: 1 copied, 1 duplicates, 1 quarantined, 0 failed");
        assert_eq!(report.category_breakdown(), "jpg=2, unprocessable=1");
        assert_eq!(report.discarded, 0);

        report.record(FileOutcome {
            discarded: true,
            ..outcome(OutcomeKind::DuplicateSkip, FileCategory::Raw)
        });
        assert_eq!(report.discarded, 1);
        assert_eq!(report.category_breakdown(), "jpg=2, raw=1, unprocessable=1");
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");
        let mut report = RunReport::new(TransferMode::Move, true);
        report.record(outcome(OutcomeKind::Placed, FileCategory::VectorGraphic));
        report.write_json(&path).unwrap();

        let value: serde_json::Value = serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(value["mode"], "move");
        assert_eq!(value["by_category"]["vector_graphic"], 1);
        assert_eq!(value["outcomes"][0]["kind"], "placed");
    }
}
