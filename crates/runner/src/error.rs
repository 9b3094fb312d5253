use migrun_core::execution::CleanupResult;
use migrun_core::output::ParsedOutput;
use migrun_core::profile::{MigrationProfile, ProfileSource};
use migrun_core::report::ReportSummary;
use serde::Serialize;

use crate::artifacts::ArtifactPaths;

/// Shown with `StreamEmpty`: the tool's frontend makes assumptions a
/// headless client may not satisfy.
pub const STREAM_EMPTY_HINT: &str = "The tool accepted the execution but streamed no output. \
     It may expect browser-only behaviour, a proxy may be dropping WebSocket frames, \
     or the session cookie may not be accepted on the streaming channel.";

/// Everything known about a run at the point it failed.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDiagnostics {
    pub execution_id: String,
    pub close_code: Option<u16>,
    pub close_reason: Option<String>,
    pub frame_count: usize,
    pub parsed: Option<ParsedOutput>,
    pub report_summary: Option<ReportSummary>,
    pub cleanup: Option<CleanupResult>,
    pub artifacts: Option<ArtifactPaths>,
}

/// Errors that fail a run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Profile {profile} is not available (profiles from {source_tier}: {available})")]
    ProfileUnavailable {
        profile: MigrationProfile,
        source_tier: ProfileSource,
        available: String,
    },

    /// Non-2xx start response, or the request never got an answer.
    #[error("Execution start failed: {message}")]
    StartFailed {
        status: Option<u16>,
        message: String,
    },

    #[error("Execution start returned no execution id (status {status})")]
    ExecutionIdMissing { status: u16, body: String },

    #[error("{message}")]
    StreamTimeout {
        message: String,
        cancelled: bool,
        diagnostics: Box<RunDiagnostics>,
    },

    #[error("Stream error for execution {}: {message}", .diagnostics.execution_id)]
    StreamError {
        message: String,
        diagnostics: Box<RunDiagnostics>,
    },

    #[error("Failed to send handshake for execution {}: {message}", .diagnostics.execution_id)]
    StreamSendFailed {
        message: String,
        diagnostics: Box<RunDiagnostics>,
    },

    #[error("Execution {} produced no output. {hint}", .diagnostics.execution_id)]
    StreamEmpty {
        hint: &'static str,
        diagnostics: Box<RunDiagnostics>,
    },

    #[error(
        "Execution {} did not succeed (hints: {})",
        .diagnostics.execution_id,
        failure_hints(.diagnostics)
    )]
    RunFailed { diagnostics: Box<RunDiagnostics> },

    #[error("Run cancelled before launch")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

fn failure_hints(diagnostics: &RunDiagnostics) -> String {
    match &diagnostics.parsed {
        Some(parsed) if !parsed.failure_hints.is_empty() => parsed.failure_hints.join(", "),
        _ => "none".to_string(),
    }
}

impl RunError {
    /// Post-launch diagnostics, if the run got that far.
    pub fn diagnostics(&self) -> Option<&RunDiagnostics> {
        match self {
            Self::StreamTimeout { diagnostics, .. }
            | Self::StreamError { diagnostics, .. }
            | Self::StreamSendFailed { diagnostics, .. }
            | Self::StreamEmpty { diagnostics, .. }
            | Self::RunFailed { diagnostics } => Some(&**diagnostics),
            _ => None,
        }
    }

    pub(crate) fn diagnostics_mut(&mut self) -> Option<&mut RunDiagnostics> {
        match self {
            Self::StreamTimeout { diagnostics, .. }
            | Self::StreamError { diagnostics, .. }
            | Self::StreamSendFailed { diagnostics, .. }
            | Self::StreamEmpty { diagnostics, .. }
            | Self::RunFailed { diagnostics } => Some(&mut **diagnostics),
            _ => None,
        }
    }

    /// Stable machine-readable name, used in the binary's JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProfileUnavailable { .. } => "ProfileUnavailable",
            Self::StartFailed { .. } => "StartFailed",
            Self::ExecutionIdMissing { .. } => "ExecutionIdMissing",
            Self::StreamTimeout { .. } => "StreamTimeout",
            Self::StreamError { .. } => "StreamError",
            Self::StreamSendFailed { .. } => "StreamSendFailed",
            Self::StreamEmpty { .. } => "StreamEmpty",
            Self::RunFailed { .. } => "RunFailed",
            Self::Cancelled => "Cancelled",
            Self::Config(_) => "Config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_failed_lists_hints() {
        let err = RunError::RunFailed {
            diagnostics: Box::new(RunDiagnostics {
                execution_id: "77".into(),
                parsed: Some(ParsedOutput {
                    failure_hints: vec!["ERROR".into(), "TRACEBACK".into()],
                    ..Default::default()
                }),
                ..Default::default()
            }),
        };
        assert_eq!(
            err.to_string(),
            "Execution 77 did not succeed (hints: ERROR, TRACEBACK)"
        );
        assert_eq!(err.kind(), "RunFailed");
        assert_eq!(err.diagnostics().unwrap().execution_id, "77");
    }

    #[test]
    fn pre_launch_errors_have_no_diagnostics() {
        assert!(RunError::Cancelled.diagnostics().is_none());
        let err = RunError::StartFailed {
            status: Some(500),
            message: "boom".into(),
        };
        assert!(err.diagnostics().is_none());
    }
}
