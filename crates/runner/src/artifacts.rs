//! Persists a run's summary, raw output, and event log.
//!
//! `out_path` may be an existing directory, a path ending in `.json`
//! (the summary file itself, with siblings written next to it), or a
//! directory that does not exist yet.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

pub const SUMMARY_FILE: &str = "summary.json";
pub const STREAM_FILE: &str = "stream.txt";
pub const EVENTS_FILE: &str = "events.json";

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Failed to write artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode artifact: {0}")]
    Encode(#[from] serde_json::Error),
}

/// What gets written.
#[derive(Debug, Clone)]
pub struct ArtifactInput {
    pub summary: Value,
    pub output_text: String,
    pub events: Option<Vec<Value>>,
}

/// Concrete paths that were written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactPaths {
    pub summary: PathBuf,
    pub stream: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<PathBuf>,
}

fn is_json_file(path: &Path) -> bool {
    !path.is_dir()
        && path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Work out the three target paths for `out_path`.
pub fn artifact_paths(out_path: &Path) -> ArtifactPaths {
    if is_json_file(out_path) {
        let stem = out_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "summary".to_string());
        let sibling = |suffix: &str| out_path.with_file_name(format!("{stem}.{suffix}"));
        ArtifactPaths {
            summary: out_path.to_path_buf(),
            stream: sibling("stream.txt"),
            events: Some(sibling("events.json")),
        }
    } else {
        ArtifactPaths {
            summary: out_path.join(SUMMARY_FILE),
            stream: out_path.join(STREAM_FILE),
            events: Some(out_path.join(EVENTS_FILE)),
        }
    }
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), ArtifactError> {
    std::fs::write(path, contents).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Write the summary and raw text, plus the events when there are any.
pub fn write_artifacts(out_path: &Path, input: &ArtifactInput) -> Result<ArtifactPaths, ArtifactError> {
    let mut paths = artifact_paths(out_path);

    if let Some(dir) = paths.summary.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| ArtifactError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    write_file(
        &paths.summary,
        serde_json::to_string_pretty(&input.summary)?.as_bytes(),
    )?;
    write_file(&paths.stream, input.output_text.as_bytes())?;

    match input.events.as_deref() {
        Some(events) if !events.is_empty() => {
            if let Some(path) = &paths.events {
                write_file(path, serde_json::to_string_pretty(events)?.as_bytes())?;
            }
        }
        _ => paths.events = None,
    }

    tracing::debug!(summary = %paths.summary.display(), "Artifacts written");
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn input(events: Option<Vec<Value>>) -> ArtifactInput {
        ArtifactInput {
            summary: json!({ "success": true, "executionId": "77" }),
            output_text: "line 1\nline 2\n".to_string(),
            events,
        }
    }

    #[test]
    fn writes_into_new_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("runs/77");

        let paths = write_artifacts(&out, &input(Some(vec![json!({ "event": "x" })]))).unwrap();

        assert_eq!(paths.summary, out.join("summary.json"));
        assert_eq!(paths.stream, out.join("stream.txt"));
        assert_eq!(paths.events, Some(out.join("events.json")));

        let summary: Value =
            serde_json::from_str(&std::fs::read_to_string(&paths.summary).unwrap()).unwrap();
        assert_eq!(summary["executionId"], "77");
        assert_eq!(
            std::fs::read_to_string(&paths.stream).unwrap(),
            "line 1\nline 2\n"
        );
        let events: Value =
            serde_json::from_str(&std::fs::read_to_string(out.join("events.json")).unwrap())
                .unwrap();
        assert_eq!(events[0]["event"], "x");
    }

    #[test]
    fn writes_into_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_artifacts(dir.path(), &input(None)).unwrap();

        assert_eq!(paths.summary, dir.path().join(SUMMARY_FILE));
        assert!(paths.stream.exists());
        assert_eq!(paths.events, None);
        assert!(!dir.path().join(EVENTS_FILE).exists());
    }

    #[test]
    fn json_path_gets_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("reports/run-77.json");

        let paths = write_artifacts(&out, &input(Some(vec![json!({ "event": "x" })]))).unwrap();

        assert_eq!(paths.summary, out);
        assert_eq!(paths.stream, dir.path().join("reports/run-77.stream.txt"));
        assert_eq!(
            paths.events,
            Some(dir.path().join("reports/run-77.events.json"))
        );
        assert!(paths.summary.is_file());
        assert!(paths.stream.is_file());
    }

    #[test]
    fn empty_events_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_artifacts(dir.path(), &input(Some(Vec::new()))).unwrap();
        assert_eq!(paths.events, None);
    }

    #[test]
    fn blocked_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let result = write_artifacts(&blocker.join("out"), &input(None));
        assert!(matches!(result, Err(ArtifactError::Io { .. })));
    }
}
