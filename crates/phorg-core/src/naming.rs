use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use unicode_normalization::UnicodeNormalization;

use crate::classify::{extension_of, FileCategory};
use crate::date::ResolvedDate;
use crate::error::OrganizeError;
use crate::metadata::MetadataRecord;

/// Numeric suffixes tried before falling back to a fingerprint token.
pub const MAX_SUFFIX: u32 = 999;

const UNKNOWN_CAMERA: &str = "UnknownCamera";
const NO_SHUTTER_COUNT: &str = "NA";

/// Canonical file name for a placed file, before collision handling.
///
/// Camera files: `YYYYMMDD-HHMMSS_<shutter|NA>_<Make><Model>.<ext>`.
/// Quarantined files: lowercased, whitespace replaced with `-`.
/// Everything else: the original name, sanitized.
pub fn build_name(
    category: FileCategory,
    date: &ResolvedDate,
    metadata: Option<&MetadataRecord>,
    original_name: &str,
) -> String {
    match category {
        c if c.is_camera() => {
            let shutter = metadata
                .and_then(|m| m.shutter_count)
                .map(|n| n.to_string())
                .unwrap_or_else(|| NO_SHUTTER_COUNT.to_string());
            let ext = canonical_extension(Path::new(original_name));
            let mut name = format!(
                "{}_{}_{}",
                date.timestamp.format("%Y%m%d-%H%M%S"),
                shutter,
                camera_label(metadata)
            );
            if !ext.is_empty() {
                name.push('.');
                name.push_str(&ext);
            }
            name
        }
        FileCategory::Unprocessable => quarantine_name(original_name),
        _ => sanitize(original_name),
    }
}

/// `<Make><Model>` with both parts reduced to alphanumerics.
pub fn camera_label(metadata: Option<&MetadataRecord>) -> String {
    let raw_make = metadata.and_then(|m| m.make.as_deref()).unwrap_or("");
    let raw_model = metadata.and_then(|m| m.model.as_deref()).unwrap_or("");

    let make = normalize_make(raw_make);
    let model = normalize_model(raw_make, &make, raw_model);
    let label = format!("{make}{model}");
    if label.is_empty() {
        UNKNOWN_CAMERA.to_string()
    } else {
        label
    }
}

/// Collapse vendor spellings (`NIKON CORPORATION`, `PENTAX Corporation`) to
/// one capitalized brand token.
pub fn normalize_make(make: &str) -> String {
    let lowered = make.trim().to_lowercase();
    let compact: String = lowered.chars().filter(|c| c.is_alphanumeric()).collect();
    match compact.as_str() {
        "" => return String::new(),
        "nikon" | "nikoncorporation" => return "Nikon".to_string(),
        "pentax" | "pentaxcorporation" => return "Pentax".to_string(),
        "sonyericsson" => return "SonyEricsson".to_string(),
        _ => {}
    }

    let without_corp = lowered.replace("corporation", "");
    split_alnum_groups(&without_corp)
        .into_iter()
        .map(|group| {
            let mut chars = group.chars();
            match chars.next() {
                Some(first) if first.is_alphabetic() => {
                    first.to_uppercase().chain(chars).collect::<String>()
                }
                _ => group,
            }
        })
        .collect()
}

/// Model with a repeated make prefix removed (`Canon EOS 80D` → `EOS80D`).
pub fn normalize_model(raw_make: &str, make: &str, model: &str) -> String {
    let mut rest = model.trim();
    for prefix in [raw_make.trim(), make] {
        if prefix.is_empty() {
            continue;
        }
        if rest.len() >= prefix.len()
            && rest.is_char_boundary(prefix.len())
            && rest[..prefix.len()].eq_ignore_ascii_case(prefix)
        {
            rest = &rest[prefix.len()..];
            break;
        }
    }
    rest.chars().filter(|c| c.is_alphanumeric()).collect()
}

fn split_alnum_groups(s: &str) -> Vec<String> {
    let mut groups: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_digit = false;
    for c in s.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                groups.push(std::mem::take(&mut current));
            }
            continue;
        }
        let digit = c.is_ascii_digit();
        if !current.is_empty() && digit != current_digit {
            groups.push(std::mem::take(&mut current));
        }
        current_digit = digit;
        current.push(c);
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

/// Lowercased extension with `jpeg` folded into `jpg`.
pub fn canonical_extension(path: &Path) -> String {
    match extension_of(path).as_str() {
        "jpeg" => "jpg".to_string(),
        other => other.to_string(),
    }
}

/// NFC-normalize and replace characters that are unsafe in a path component.
pub fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .nfc()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "." {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Quarantine naming: sanitized, lowercased, whitespace to `-`, no `--` runs.
pub fn quarantine_name(name: &str) -> String {
    let lowered = sanitize(name).to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    for c in lowered.chars() {
        let c = if c.is_whitespace() { '-' } else { c };
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }
    out
}

/// `stem_<suffix>.ext`, keeping the extension last.
pub fn with_suffix(name: &str, suffix: &str) -> String {
    let path = Path::new(name);
    match (path.file_stem().and_then(|s| s.to_str()), path.extension().and_then(|e| e.to_str())) {
        (Some(stem), Some(ext)) if !stem.is_empty() => format!("{stem}_{suffix}.{ext}"),
        _ => format!("{name}_{suffix}"),
    }
}

/// Names taken per destination directory: what is already on disk plus what
/// this run has reserved. Loaded lazily per directory.
#[derive(Debug, Default)]
pub struct DestinationIndex {
    taken: Mutex<HashMap<PathBuf, HashSet<String>>>,
}

impl DestinationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `name` in `dir`, or the lowest free `_N` variant. When all
    /// numeric suffixes are taken, `token` supplies a synthetic one.
    pub fn reserve(
        &self,
        dir: &Path,
        name: &str,
        token: impl FnOnce() -> Option<String>,
    ) -> Result<String, OrganizeError> {
        let mut taken = self.taken.lock().unwrap_or_else(|e| e.into_inner());
        let names = taken
            .entry(dir.to_path_buf())
            .or_insert_with(|| existing_names(dir));

        if names.insert(name.to_string()) {
            return Ok(name.to_string());
        }
        for n in 1..=MAX_SUFFIX {
            let candidate = with_suffix(name, &n.to_string());
            if names.insert(candidate.clone()) {
                return Ok(candidate);
            }
        }
        if let Some(token) = token() {
            let candidate = with_suffix(name, &token);
            if names.insert(candidate.clone()) {
                return Ok(candidate);
            }
        }
        Err(OrganizeError::NameCollisionUnresolved {
            dir: dir.to_path_buf(),
            name: name.to_string(),
        })
    }
}

fn existing_names(dir: &Path) -> HashSet<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return HashSet::new();
    };
    entries
        .flatten()
        .filter_map(|e| e.file_name().into_string().ok())
        .collect()
}
