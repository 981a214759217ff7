pub mod cancel;
pub mod classify;
pub mod config;
pub mod date;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod metadata;
pub mod naming;
pub mod planner;
pub mod progress;
pub mod report;
pub mod scan;
pub mod sweep;
pub mod writer;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context};
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::progress::ThrottledProgress;
use crate::writer::Applied;

pub use cancel::{CancellationToken, CancelledError};
pub use classify::{Classifier, FileCategory, ScreenshotHeuristics, ScreenshotPredicate};
pub use config::Config;
pub use date::{DateProvenance, DateResolver, ResolvedDate};
pub use dedup::{ContentFingerprint, DuplicateDecision, DuplicateRegistry};
pub use engine::{Analysis, OrganizerEngine, PlacementAction, PlacementDecision};
pub use error::{ExtractionError, OrganizeError};
pub use metadata::{ExifExtractor, ExiftoolExtractor, MetadataExtractor, MetadataRecord, NoMetadata, TagValue};
pub use progress::{Progress, ProgressCallback, Stage};
pub use report::{FileOutcome, OutcomeKind, RunReport};
pub use sweep::{DuplicateGroup, KeepPolicy, SweepOptions, SweepReport};
pub use writer::TransferMode;

const WRITE_CHECK_FILENAME: &str = ".phorg-write-check";

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizeOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    #[serde(default)]
    pub mode: TransferMode,
    /// Decide everything, touch nothing.
    #[serde(default)]
    pub dry_run: bool,
    /// Leave duplicate sources in the input tree instead of deleting them.
    #[serde(default)]
    pub keep_duplicates: bool,
    /// Register files already in the output so reruns see them as duplicates.
    #[serde(default = "default_true")]
    pub seed_from_output: bool,
    #[serde(default = "default_true")]
    pub prune_empty_dirs: bool,
    #[serde(default)]
    pub config: Config,
}

impl OrganizeOptions {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            mode: TransferMode::default(),
            dry_run: false,
            keep_duplicates: false,
            seed_from_output: true,
            prune_empty_dirs: true,
            config: Config::default(),
        }
    }

    pub fn with_mode(mut self, mode: TransferMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }
}

/// Organize every file under `options.input` into `options.output`.
///
/// Per-file problems end up in the report; only unusable roots and
/// cancellation are errors.
pub fn organize(
    options: &OrganizeOptions,
    extractor: Arc<dyn MetadataExtractor>,
    progress: &ProgressCallback<'_>,
    cancel: Option<&CancellationToken>,
) -> anyhow::Result<RunReport> {
    let tp = ThrottledProgress::new(progress);
    let cancelled = || cancel.is_some_and(CancellationToken::is_cancelled);
    let check = |stage: Stage| -> anyhow::Result<()> {
        if let Some(token) = cancel {
            token.check(stage)?;
        }
        Ok(())
    };

    // 1. Roots
    if !options.input.is_dir() {
        bail!("Input directory does not exist: {}", options.input.display());
    }
    let input = options
        .input
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", options.input.display()))?;
    let output = prepare_output(&options.output, options.dry_run)?;
    if input == output {
        bail!("Input and output must be different directories");
    }
    let input_inside_output = input.starts_with(&output);
    let scan_exclude = if input_inside_output { Vec::new() } else { vec![output.clone()] };

    let engine = OrganizerEngine::new(&options.config, &output, extractor)?;
    let mut report = RunReport::new(options.mode, options.dry_run);

    // 2. Registry, optionally seeded with what is already placed
    if options.seed_from_output && output.is_dir() {
        let exclude = if input_inside_output { vec![input.clone()] } else { Vec::new() };
        report.seeded = engine.seed_from_output(&exclude) as u64;
        info!("Registered {} existing output files", report.seeded);
    }

    // 3. Discovery
    let files = scan::discover(&input, &scan_exclude);
    let total = files.len() as u64;
    info!("Found {} files under {}", total, input.display());
    tp.report(Stage::Scan, total, total);
    check(Stage::Scan)?;

    // 4. Analyze (parallel)
    let counter = AtomicU64::new(0);
    let analyses: Vec<Option<Analysis>> = files
        .par_iter()
        .map(|path| {
            if cancelled() {
                return None;
            }
            let analysis = engine.analyze(path);
            let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
            tp.report(Stage::Analyze, done, total);
            Some(analysis)
        })
        .collect();
    check(Stage::Analyze)?;

    // 5. Place (discovery order)
    let mut decisions = Vec::with_capacity(files.len());
    for (i, analysis) in analyses.into_iter().flatten().enumerate() {
        check(Stage::Place)?;
        decisions.push(engine.place(analysis));
        tp.report(Stage::Place, i as u64 + 1, total);
    }

    if options.dry_run {
        for decision in &decisions {
            report.record(planned_outcome(decision, &output));
        }
        info!("Dry run: {}", report.summary());
        return Ok(report);
    }

    // 6. Apply: transfers first, then duplicates whose originals now exist
    let duplicate_total = decisions
        .iter()
        .filter(|d| matches!(d.action, PlacementAction::DuplicateSkip { .. }))
        .count() as u64;
    let transfer_total = decisions.len() as u64 - duplicate_total;
    let counter = AtomicU64::new(0);
    let mut outcomes: Vec<Option<FileOutcome>> = decisions
        .par_iter()
        .map(|decision| {
            if cancelled() || matches!(decision.action, PlacementAction::DuplicateSkip { .. }) {
                return None;
            }
            let outcome = apply_transfer(&engine, decision, &output, options.mode);
            let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
            tp.report(Stage::Apply, done, transfer_total);
            Some(outcome)
        })
        .collect();
    check(Stage::Apply)?;

    let counter = AtomicU64::new(0);
    let duplicate_outcomes: Vec<Option<FileOutcome>> = decisions
        .par_iter()
        .map(|decision| match decision.action {
            PlacementAction::DuplicateSkip { .. } => {
                let outcome = apply_duplicate(decision, options.mode, options.keep_duplicates);
                let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
                tp.report(Stage::Duplicates, done, duplicate_total);
                Some(outcome)
            }
            _ => None,
        })
        .collect();
    for (slot, duplicate) in outcomes.iter_mut().zip(duplicate_outcomes) {
        if slot.is_none() {
            *slot = duplicate;
        }
    }
    for outcome in outcomes.into_iter().flatten() {
        report.record(outcome);
    }

    // 7. Prune
    if options.mode == TransferMode::Move && options.prune_empty_dirs {
        let pruned = writer::prune_empty_dirs(&input, &scan_exclude);
        report.pruned_dirs = pruned.dirs as u64;
        report.removed_junk = pruned.junk_files as u64;
    }

    info!("{}", report.summary());
    Ok(report)
}

/// Create the output root if needed and make sure it is writable.
fn prepare_output(output: &Path, dry_run: bool) -> anyhow::Result<PathBuf> {
    if dry_run {
        if output.exists() {
            return output
                .canonicalize()
                .with_context(|| format!("Failed to resolve {}", output.display()));
        }
        return std::path::absolute(output)
            .with_context(|| format!("Failed to resolve {}", output.display()));
    }

    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory {}", output.display()))?;
    let output = output
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", output.display()))?;
    let marker = output.join(WRITE_CHECK_FILENAME);
    fs::write(&marker, b"")
        .with_context(|| format!("Output directory is not writable: {}", output.display()))?;
    fs::remove_file(&marker).ok();
    Ok(output)
}

fn outcome(decision: &PlacementDecision, destination: Option<PathBuf>, kind: OutcomeKind, reason: Option<String>) -> FileOutcome {
    FileOutcome {
        source: decision.source.clone(),
        destination,
        kind,
        category: decision.category,
        provenance: decision.date.provenance,
        reason,
        discarded: false,
    }
}

fn kind_of(action: &PlacementAction) -> OutcomeKind {
    match action {
        PlacementAction::Move => OutcomeKind::Placed,
        PlacementAction::DuplicateSkip { .. } => OutcomeKind::DuplicateSkip,
        PlacementAction::Quarantine { .. } => OutcomeKind::Quarantined,
    }
}

fn duplicate_reason(decision: &PlacementDecision) -> Option<String> {
    match &decision.action {
        PlacementAction::DuplicateSkip { original } => Some(format!("duplicate of {}", original.display())),
        _ => decision.reason().map(str::to_string),
    }
}

fn planned_outcome(decision: &PlacementDecision, output: &Path) -> FileOutcome {
    outcome(
        decision,
        decision.destination(output),
        kind_of(&decision.action),
        duplicate_reason(decision),
    )
}

/// Transfer one file; if its destination cannot be written, reroute it to
/// quarantine before giving up.
fn apply_transfer(engine: &OrganizerEngine, decision: &PlacementDecision, output: &Path, mode: TransferMode) -> FileOutcome {
    let err = match writer::apply_transfer(decision, output, mode) {
        Ok(target) => {
            return outcome(
                decision,
                Some(target),
                kind_of(&decision.action),
                decision.reason().map(str::to_string),
            )
        }
        Err(e) => e,
    };
    warn!("{err}");

    if decision.action == PlacementAction::Move {
        let rerouted = engine.quarantine(decision.source.clone(), decision.category, decision.date, err.to_string());
        match writer::apply_transfer(&rerouted, output, mode) {
            Ok(target) => {
                return outcome(&rerouted, Some(target), OutcomeKind::Quarantined, Some(err.to_string()))
            }
            Err(e) => warn!("{e}"),
        }
    }
    outcome(decision, None, OutcomeKind::Failed, Some(err.to_string()))
}

fn apply_duplicate(decision: &PlacementDecision, mode: TransferMode, keep_duplicates: bool) -> FileOutcome {
    let mut reason = duplicate_reason(decision);
    let discarded = match writer::apply_duplicate(decision, mode, keep_duplicates) {
        Ok(applied) => applied == Applied::SourceRemoved,
        Err(e) => {
            warn!("{e}");
            reason = Some(format!("{}; not removed: {e}", reason.unwrap_or_default()));
            false
        }
    };
    FileOutcome {
        discarded,
        ..outcome(decision, None, OutcomeKind::DuplicateSkip, reason)
    }
}
