pub mod guess;

use std::fs;
use std::path::Path;
use std::time::SystemTime;

use anyhow::Context;
use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::DateBounds;
use crate::metadata::MetadataRecord;

/// Which fallback tier produced a date. Ordered best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateProvenance {
    Metadata,
    Filename,
    Filesystem,
}

impl DateProvenance {
    pub const TIERS: [DateProvenance; 3] = [Self::Metadata, Self::Filename, Self::Filesystem];

    /// Dates this tier proposes for a file, best first.
    fn candidates(self, path: &Path, metadata: Option<&MetadataRecord>) -> Vec<NaiveDateTime> {
        match self {
            Self::Metadata => metadata.and_then(|m| m.capture_time).into_iter().collect(),
            Self::Filename => path
                .file_name()
                .and_then(|n| n.to_str())
                .map(guess::dates_in_filename)
                .unwrap_or_default(),
            Self::Filesystem => filesystem_times(path),
        }
    }
}

/// A capture date and where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDate {
    pub timestamp: NaiveDateTime,
    pub provenance: DateProvenance,
    /// False when every tier was exhausted without a plausible date; the
    /// file must then be quarantined rather than filed under this timestamp.
    pub valid: bool,
}

/// Derives a capture date by walking the provenance tiers in order.
#[derive(Debug, Clone)]
pub struct DateResolver {
    min_year: i32,
    rejected: Vec<NaiveDate>,
    today: NaiveDate,
}

impl DateResolver {
    pub fn new(bounds: &DateBounds) -> anyhow::Result<Self> {
        let rejected = bounds
            .rejected_dates
            .iter()
            .map(|s| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .with_context(|| format!("Invalid rejected date in config: {s}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            min_year: bounds.min_year,
            rejected,
            today: Local::now().date_naive(),
        })
    }

    /// Pin the "current date" used for the future-date check.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// A date is plausible when its year is not before `min_year`, it is not a
    /// known placeholder date, and it is not later than today.
    pub fn is_plausible(&self, dt: &NaiveDateTime) -> bool {
        let day = dt.date();
        dt.year() >= self.min_year && day <= self.today && !self.rejected.contains(&day)
    }

    pub fn resolve(&self, path: &Path, metadata: Option<&MetadataRecord>) -> ResolvedDate {
        let mut first_seen: Option<(NaiveDateTime, DateProvenance)> = None;

        for tier in DateProvenance::TIERS {
            for candidate in tier.candidates(path, metadata) {
                if self.is_plausible(&candidate) {
                    debug!("{}: date {} from {:?}", path.display(), candidate, tier);
                    return ResolvedDate {
                        timestamp: candidate,
                        provenance: tier,
                        valid: true,
                    };
                }
                debug!("{}: rejected {:?} date {}", path.display(), tier, candidate);
                first_seen.get_or_insert((candidate, tier));
            }
        }

        let (timestamp, provenance) = first_seen.unwrap_or((
            DateTime::<Utc>::UNIX_EPOCH.naive_utc(),
            DateProvenance::Filesystem,
        ));
        ResolvedDate {
            timestamp,
            provenance,
            valid: false,
        }
    }
}

/// Last-modified then creation time, as local wall-clock time.
fn filesystem_times(path: &Path) -> Vec<NaiveDateTime> {
    let Ok(meta) = fs::metadata(path) else {
        return Vec::new();
    };
    [meta.modified().ok(), meta.created().ok()]
        .into_iter()
        .flatten()
        .map(to_local)
        .collect()
}

pub(crate) fn to_local(time: SystemTime) -> NaiveDateTime {
    DateTime::<Local>::from(time).naive_local()
}
