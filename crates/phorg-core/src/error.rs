use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Why metadata could not be read for a file.
///
/// Never fatal: the engine falls back to the filename and filesystem tiers.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("unsupported format")]
    Unsupported,
    #[error("corrupt metadata: {0}")]
    Corrupt(String),
    #[error("extraction tool unavailable: {0}")]
    ToolUnavailable(String),
    #[error("extraction timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Per-file failures surfaced in the run report.
#[derive(Debug, Error)]
pub enum OrganizeError {
    #[error("metadata unavailable: {0}")]
    Extraction(#[from] ExtractionError),
    #[error("no plausible capture date (metadata, filename and filesystem all rejected)")]
    InvalidDate,
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no free name for {name} in {}", dir.display())]
    NameCollisionUnresolved { dir: PathBuf, name: String },
}

impl OrganizeError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
