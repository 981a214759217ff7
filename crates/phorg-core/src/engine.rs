use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::classify::{Classifier, FileCategory};
use crate::config::Config;
use crate::date::{DateResolver, ResolvedDate};
use crate::dedup::{hash_file, DuplicateDecision, DuplicateRegistry};
use crate::error::OrganizeError;
use crate::metadata::{MetadataExtractor, MetadataRecord};
use crate::naming::{self, DestinationIndex};
use crate::planner::PathPlanner;

/// What the mutation layer should do with a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlacementAction {
    Move,
    DuplicateSkip { original: PathBuf },
    Quarantine { reason: String },
}

/// One decision per input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementDecision {
    pub source: PathBuf,
    pub category: FileCategory,
    pub date: ResolvedDate,
    /// Destination directory relative to the output root. Empty for duplicates.
    pub directory: Vec<String>,
    pub file_name: String,
    pub action: PlacementAction,
}

impl PlacementDecision {
    /// Absolute target path; duplicates have none.
    pub fn destination(&self, output_root: &Path) -> Option<PathBuf> {
        if matches!(self.action, PlacementAction::DuplicateSkip { .. }) {
            return None;
        }
        let dir = self
            .directory
            .iter()
            .fold(output_root.to_path_buf(), |dir, segment| dir.join(segment));
        Some(dir.join(&self.file_name))
    }

    pub fn reason(&self) -> Option<&str> {
        match &self.action {
            PlacementAction::Quarantine { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Everything known about a file before any shared state is touched.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub source: PathBuf,
    pub size: u64,
    pub metadata: Option<MetadataRecord>,
    pub date: ResolvedDate,
    pub category: FileCategory,
    /// Why the file cannot be placed normally, if it cannot.
    pub problem: Option<String>,
}

/// Per-file pipeline: extract, resolve date, classify, dedup, plan, name.
///
/// [`analyze`](Self::analyze) is free of shared state and may run on any
/// number of threads. [`place`](Self::place) registers fingerprints and
/// reserves names; call it in a fixed order for a reproducible tree.
pub struct OrganizerEngine {
    extractor: Arc<dyn MetadataExtractor>,
    resolver: DateResolver,
    classifier: Classifier,
    planner: PathPlanner,
    registry: DuplicateRegistry,
    /// Files quarantined by earlier runs.
    quarantined: DuplicateRegistry,
    names: DestinationIndex,
}

impl OrganizerEngine {
    pub fn new(config: &Config, output_root: &Path, extractor: Arc<dyn MetadataExtractor>) -> anyhow::Result<Self> {
        Ok(Self {
            extractor,
            resolver: DateResolver::new(&config.date_bounds)?,
            classifier: Classifier::new(config)?,
            planner: PathPlanner::new(output_root, config.unprocessed_dir.clone()),
            registry: DuplicateRegistry::new(),
            quarantined: DuplicateRegistry::new(),
            names: DestinationIndex::new(),
        })
    }

    pub fn with_resolver(mut self, resolver: DateResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Register what an earlier run left in the output root, skipping the
    /// `exclude` subtrees. Returns the number of files registered.
    pub fn seed_from_output(&self, exclude: &[PathBuf]) -> usize {
        let unprocessed = self.planner.unprocessed_root();
        let mut placed_exclude = exclude.to_vec();
        placed_exclude.push(unprocessed.clone());

        let placed = self
            .registry
            .seed_from_dir(self.planner.output_root(), &placed_exclude);
        let quarantined = if unprocessed.is_dir() {
            self.quarantined.seed_from_dir(&unprocessed, exclude)
        } else {
            0
        };
        placed + quarantined
    }

    pub fn process(&self, path: &Path) -> PlacementDecision {
        self.place(self.analyze(path))
    }

    pub fn analyze(&self, path: &Path) -> Analysis {
        let size = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                let err = OrganizeError::io(path, e);
                warn!("{err}");
                return Analysis {
                    source: path.to_path_buf(),
                    size: 0,
                    metadata: None,
                    date: self.resolver.resolve(path, None),
                    category: FileCategory::Unprocessable,
                    problem: Some(err.to_string()),
                };
            }
        };

        // 1. Metadata; failure only means the later tiers decide.
        let metadata = match self.extractor.extract(path) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!("{}: {}", path.display(), OrganizeError::from(e));
                None
            }
        };

        // 2. Date
        let date = self.resolver.resolve(path, metadata.as_ref());

        // 3. Category
        let (category, reason) = self
            .classifier
            .classify_explained(path, metadata.as_ref(), &date);
        let problem = if !date.valid {
            Some(OrganizeError::InvalidDate.to_string())
        } else {
            reason.map(str::to_string)
        };

        Analysis {
            source: path.to_path_buf(),
            size,
            metadata,
            date,
            category,
            problem,
        }
    }

    pub fn place(&self, analysis: Analysis) -> PlacementDecision {
        let Analysis {
            source,
            size,
            metadata,
            date,
            category,
            problem,
        } = analysis;

        if category == FileCategory::Unprocessable {
            let reason = problem.unwrap_or_else(|| "unclassified".to_string());
            return self.quarantine(source, category, date, reason);
        }

        let ticket = match self.registry.check_duplicate(&source, size) {
            Ok(DuplicateDecision::Duplicate { original }) => {
                debug!("{} duplicates {}", source.display(), original.display());
                return PlacementDecision {
                    file_name: original_name(&source),
                    source,
                    category,
                    date,
                    directory: Vec::new(),
                    action: PlacementAction::DuplicateSkip { original },
                };
            }
            Ok(DuplicateDecision::Unique(ticket)) => ticket,
            Err(e) => {
                warn!("{e}");
                return self.quarantine(source, category, date, e.to_string());
            }
        };

        let directory = self.planner.plan_path(category, &date);
        let dir = self.planner.directory(&directory);
        let base = naming::build_name(category, &date, metadata.as_ref(), &original_name(&source));
        let token = || self.registry.fingerprint(ticket).map(|fp| fp.token());

        match self.names.reserve(&dir, &base, token) {
            Ok(file_name) => {
                self.registry.mark_placed(ticket, &dir.join(&file_name));
                PlacementDecision {
                    source,
                    category,
                    date,
                    directory,
                    file_name,
                    action: PlacementAction::Move,
                }
            }
            Err(e) => {
                warn!("{e}");
                self.quarantine(source, category, date, e.to_string())
            }
        }
    }

    /// Route a file to the unprocessed directory under a free name, unless an
    /// earlier run already quarantined the same bytes.
    pub fn quarantine(
        &self,
        source: PathBuf,
        category: FileCategory,
        date: ResolvedDate,
        reason: String,
    ) -> PlacementDecision {
        if let Ok(meta) = fs::metadata(&source) {
            if let Ok(Some(original)) = self.quarantined.lookup(&source, meta.len()) {
                debug!("{} already quarantined as {}", source.display(), original.display());
                return PlacementDecision {
                    file_name: original_name(&source),
                    source,
                    category,
                    date,
                    directory: Vec::new(),
                    action: PlacementAction::DuplicateSkip { original },
                };
            }
        }

        let directory = self.planner.plan_path(FileCategory::Unprocessable, &date);
        let dir = self.planner.directory(&directory);
        let base = naming::quarantine_name(&original_name(&source));
        let token = || hash_file(&source).ok().map(|h| h.chars().take(8).collect());
        let (file_name, reason) = match self.names.reserve(&dir, &base, token) {
            Ok(file_name) => (file_name, reason),
            Err(e) => {
                // The write will refuse to overwrite; keep the collision in
                // the reason so the failure is explained.
                warn!("{e}");
                (base, format!("{reason}; {e}"))
            }
        };

        debug!("{} quarantined: {}", source.display(), reason);
        PlacementDecision {
            source,
            category,
            date,
            directory,
            file_name,
            action: PlacementAction::Quarantine { reason },
        }
    }
}

fn original_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
