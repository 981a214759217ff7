use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

const MIN_INTERVAL: Duration = Duration::from_millis(200);

/// Phases of a run, in the order they happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Scan,
    Analyze,
    Place,
    Apply,
    Duplicates,
}

impl Stage {
    /// Human-readable description for progress displays.
    pub fn describe(self) -> &'static str {
        match self {
            Stage::Scan => "Scanning input",
            Stage::Analyze => "Reading metadata",
            Stage::Place => "Planning destinations",
            Stage::Apply => "Writing files",
            Stage::Duplicates => "Discarding duplicates",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Scan => "scan",
            Stage::Analyze => "analyze",
            Stage::Place => "place",
            Stage::Apply => "apply",
            Stage::Duplicates => "duplicates",
        };
        f.write_str(name)
    }
}

/// `done` of `total` files have finished `stage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub stage: Stage,
    pub done: u64,
    pub total: u64,
}

impl Progress {
    pub fn is_complete(&self) -> bool {
        self.done >= self.total
    }
}

pub type ProgressCallback<'a> = dyn Fn(Progress) + Send + Sync + 'a;

/// Forwards progress at most every 200ms, except that the first update of
/// a stage and its completion always get through.
pub struct ThrottledProgress<'a> {
    inner: &'a ProgressCallback<'a>,
    last: Mutex<Option<(Stage, Instant)>>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: &'a ProgressCallback<'a>) -> Self {
        Self {
            inner,
            last: Mutex::new(None),
        }
    }

    pub fn report(&self, stage: Stage, done: u64, total: u64) {
        let progress = Progress { stage, done, total };
        {
            let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
            let due = match *last {
                Some((prev, at)) => prev != stage || progress.is_complete() || at.elapsed() >= MIN_INTERVAL,
                None => true,
            };
            if !due {
                return;
            }
            *last = Some((stage, Instant::now()));
        }
        (self.inner)(progress);
    }
}
