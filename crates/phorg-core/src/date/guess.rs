use chrono::{NaiveDate, NaiveDateTime};
use regex::{Captures, Regex};
use std::path::Path;
use std::sync::LazyLock;

// Each pattern names its groups y/m/d and optionally hh/mm/ss. Full datetime
// layouts come before date-only ones so the most precise reading wins.
static PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // YYYY-MM-DD-HH-MM-SS, YYYY-MM-DD_HH-MM-SS, YYYY-MM-DD HH.MM.SS
        r"(?P<y>\d{4})-(?P<m>\d{2})-(?P<d>\d{2})[-_ ](?P<hh>\d{2})[-.](?P<mm>\d{2})[-.](?P<ss>\d{2})",
        // DD-MM-YYYY-HH-MM-SS
        r"(?P<d>\d{2})-(?P<m>\d{2})-(?P<y>\d{4})-(?P<hh>\d{2})-(?P<mm>\d{2})-(?P<ss>\d{2})",
        // YYYYMMDD_HHMMSS, YYYYMMDD-HHMMSS
        r"(?P<y>\d{4})(?P<m>\d{2})(?P<d>\d{2})[-_](?P<hh>\d{2})(?P<mm>\d{2})(?P<ss>\d{2})",
        // YYYY-MM-DD-HHMMSS (signal-2020-10-26-163832)
        r"(?P<y>\d{4})-(?P<m>\d{2})-(?P<d>\d{2})[-_](?P<hh>\d{2})(?P<mm>\d{2})(?P<ss>\d{2})",
        // YYYY_MM_DD_HH_MM_SS
        r"(?P<y>\d{4})_(?P<m>\d{2})_(?P<d>\d{2})_(?P<hh>\d{2})_(?P<mm>\d{2})_(?P<ss>\d{2})",
        // DD-MM-YYYY_HHMMSS
        r"(?P<d>\d{2})-(?P<m>\d{2})-(?P<y>\d{4})_(?P<hh>\d{2})(?P<mm>\d{2})(?P<ss>\d{2})",
        // YYYYMMDDHHMMSS
        r"(?:^|\D)(?P<y>\d{4})(?P<m>\d{2})(?P<d>\d{2})(?P<hh>\d{2})(?P<mm>\d{2})(?P<ss>\d{2})(?:\D|$)",
        // YYYY-MM-DD, YYYY_MM_DD
        r"(?P<y>\d{4})[-_](?P<m>\d{2})[-_](?P<d>\d{2})",
        // DD-MM-YYYY
        r"(?P<d>\d{2})-(?P<m>\d{2})-(?P<y>\d{4})",
        // YYYYMMDD
        r"(?:^|\D)(?P<y>\d{4})(?P<m>\d{2})(?P<d>\d{2})(?:\D|$)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// All datetimes embedded in a file's base name, in pattern priority order.
///
/// Calendar-impossible matches are skipped here; plausibility is left to the
/// caller so an implausible first match does not hide a later good one.
pub fn dates_in_filename(filename: &str) -> Vec<NaiveDateTime> {
    let basename = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);

    let mut found = Vec::new();
    for re in PATTERNS.iter() {
        for caps in re.captures_iter(basename) {
            if let Some(dt) = to_datetime(&caps) {
                if !found.contains(&dt) {
                    found.push(dt);
                }
            }
        }
    }
    found
}

fn to_datetime(caps: &Captures) -> Option<NaiveDateTime> {
    let num = |name: &str| -> Option<u32> {
        match caps.name(name) {
            Some(m) => m.as_str().parse().ok(),
            None => Some(0),
        }
    };
    let year: i32 = caps.name("y")?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year, num("m")?, num("d")?)?.and_hms_opt(num("hh")?, num("mm")?, num("ss")?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first(name: &str) -> Option<String> {
        dates_in_filename(name)
            .first()
            .map(|dt| dt.format("%Y%m%d-%H%M%S").to_string())
    }

    #[test]
    fn test_guess_patterns() {
        assert_eq!(first("Screenshot_20190919-053857.jpg").as_deref(), Some("20190919-053857"));
        assert_eq!(first("IMG_20190509_154733.jpg").as_deref(), Some("20190509-154733"));
        assert_eq!(first("signal-2020-10-26-163832.jpg").as_deref(), Some("20201026-163832"));
        assert_eq!(first("2016_01_30_11_49_15.png").as_deref(), Some("20160130-114915"));
        assert_eq!(first("PXL20211231235959.jpg").as_deref(), Some("20211231-235959"));
        assert_eq!(first("holiday 2014-07-02.png").as_deref(), Some("20140702-000000"));
        assert_eq!(first("scan 02-07-2014.bmp").as_deref(), Some("20140702-000000"));
        assert_eq!(first("IMG-20180101-WA0003.jpg").as_deref(), Some("20180101-000000"));
        assert!(first("random_photo.jpg").is_none());
    }

    #[test]
    fn test_impossible_calendar_values_skipped() {
        assert!(first("IMG_20211341_101500.jpg").is_none());
        assert_eq!(first("DSC_12345678.jpg"), None);
    }

    #[test]
    fn test_only_basename_is_scanned() {
        assert!(first("/photos/2019-05-06/untitled.png").is_none());
    }

    #[test]
    fn test_all_candidates_reported() {
        let dates = dates_in_filename("19700101_000000 copy of 2021-06-04.jpg");
        assert_eq!(dates.len(), 2);
        assert_eq!(dates[1].format("%Y-%m-%d").to_string(), "2021-06-04");
    }
}
