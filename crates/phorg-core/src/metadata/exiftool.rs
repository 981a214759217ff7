use std::collections::BTreeMap;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::debug;

use super::{MetadataExtractor, MetadataRecord, TagValue};
use crate::error::ExtractionError;

const BASE_TAGS: &[&str] = &[
    "DateTimeOriginal",
    "CreateDate",
    "DateTimeDigitized",
    "Make",
    "Model",
    "Software",
    "ImageWidth",
    "ImageHeight",
];

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Runs the `exiftool` binary once per file and parses its JSON output.
#[derive(Debug, Clone)]
pub struct ExiftoolExtractor {
    program: PathBuf,
    shutter_count_tags: Vec<String>,
    timeout: Duration,
}

impl ExiftoolExtractor {
    pub fn new(shutter_count_tags: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: PathBuf::from("exiftool"),
            shutter_count_tags,
            timeout,
        }
    }

    /// Use a specific exiftool binary instead of the one on `PATH`.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    fn command(&self, path: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-j").arg("-n");
        for tag in BASE_TAGS
            .iter()
            .copied()
            .chain(self.shutter_count_tags.iter().map(String::as_str))
        {
            cmd.arg(format!("-{tag}"));
        }
        cmd.arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        cmd
    }
}

impl MetadataExtractor for ExiftoolExtractor {
    fn extract(&self, path: &Path) -> Result<MetadataRecord, ExtractionError> {
        let mut child = self.command(path).spawn().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                ExtractionError::ToolUnavailable(self.program.display().to_string())
            }
            _ => ExtractionError::Io(e),
        })?;

        // Drain stdout on its own thread so a chatty child never blocks on a
        // full pipe while we poll for exit.
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExtractionError::Corrupt("exiftool stdout not captured".into()))?;
        let reader = thread::spawn(move || {
            let mut buf = String::new();
            stdout.read_to_string(&mut buf).map(|_| buf)
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                debug!("exiftool timed out on {}", path.display());
                return Err(ExtractionError::Timeout(self.timeout));
            }
            thread::sleep(POLL_INTERVAL);
        };

        let output = reader
            .join()
            .map_err(|_| ExtractionError::Corrupt("exiftool reader panicked".into()))??;

        if !status.success() && output.trim().is_empty() {
            return Err(ExtractionError::Unsupported);
        }

        let tags = parse_exiftool_json(&output)?;
        Ok(MetadataRecord::from_tags(tags, &self.shutter_count_tags))
    }
}

/// Parse `exiftool -j` output: an array with one object per file. Values that
/// are neither numbers nor strings (lists, structs) are dropped.
fn parse_exiftool_json(output: &str) -> Result<BTreeMap<String, TagValue>, ExtractionError> {
    let data: Vec<BTreeMap<String, serde_json::Value>> =
        serde_json::from_str(output).map_err(|e| ExtractionError::Corrupt(e.to_string()))?;
    let first = data.into_iter().next().ok_or(ExtractionError::Unsupported)?;

    Ok(first
        .into_iter()
        .filter(|(name, _)| name != "SourceFile")
        .filter_map(|(name, value)| serde_json::from_value::<TagValue>(value).ok().map(|v| (name, v)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exiftool_json() {
        let output = r#"[{
            "SourceFile": "a.jpg",
            "DateTimeOriginal": "2023:12:20 15:30:00",
            "Make": "NIKON CORPORATION",
            "ImageWidth": 4928,
            "Keywords": ["a", "b"]
        }]"#;
        let tags = parse_exiftool_json(output).unwrap();
        assert_eq!(tags.get("Make"), Some(&TagValue::Text("NIKON CORPORATION".into())));
        assert_eq!(tags.get("ImageWidth"), Some(&TagValue::Integer(4928)));
        assert!(!tags.contains_key("SourceFile"));
        assert!(!tags.contains_key("Keywords"));
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(matches!(parse_exiftool_json("[]"), Err(ExtractionError::Unsupported)));
        assert!(matches!(parse_exiftool_json("garbage"), Err(ExtractionError::Corrupt(_))));
    }

    #[test]
    fn test_missing_binary_is_tool_unavailable() {
        let extractor = ExiftoolExtractor::new(Vec::new(), Duration::from_secs(1))
            .with_program("/nonexistent/bin/exiftool");
        let err = extractor.extract(Path::new("img.jpg")).unwrap_err();
        assert!(matches!(err, ExtractionError::ToolUnavailable(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_slow_tool_is_killed_after_timeout() {
        use std::fs;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("exiftool");
        fs::write(&tool, "#!/bin/sh\nexec sleep 5\n").unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();

        let timeout = Duration::from_millis(300);
        let extractor = ExiftoolExtractor::new(Vec::new(), timeout).with_program(&tool);
        let started = Instant::now();
        let err = extractor.extract(Path::new("img.jpg")).unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(3));
        match err {
            ExtractionError::Timeout(after) => assert_eq!(after, timeout),
            other => panic!("expected a timeout, got {other:?}"),
        }
        assert_eq!(
            ExtractionError::Timeout(timeout).to_string(),
            "extraction timed out after 300ms"
        );
    }
}
