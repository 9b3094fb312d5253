//! Sequences one migration run end to end.
//!
//! Resolve profiles, launch the execution, stream its output, parse it,
//! clean up, write artifacts, decide. Once an execution id exists the
//! orchestrator always streams and always attempts cleanup (per policy),
//! whatever happens in between. It is the only component that fails the
//! caller's request.

use std::path::PathBuf;
use std::sync::Arc;

use migrun_core::execution::{CleanupResult, ExecutionHandle, ExecutionRequest};
use migrun_core::output::{self, ParsedOutput};
use migrun_core::profile::ProfileSource;
use migrun_core::stream::{StreamFrame, StreamOutcome};
use migrun_remote::api::{ToolApi, ToolApiError};
use migrun_remote::client::ToolStreamClient;
use migrun_remote::session::{run_session_until, StreamConfig, StreamSessionError};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::artifacts::{write_artifacts, ArtifactInput, ArtifactPaths};
use crate::cache::FileCacheStore;
use crate::config::{CleanupPolicy, RunnerConfig};
use crate::error::{RunDiagnostics, RunError, STREAM_EMPTY_HINT};
use crate::events::{EventRecorder, RunEvent, RunEventKind, EVENT_CHANNEL_CAPACITY};
use crate::resolver::{HttpProfileDiscovery, ProfileResolver};

/// Inputs for a single run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub request: ExecutionRequest,
    pub force_refresh: bool,
    pub cleanup: CleanupPolicy,
    /// Where to write artifacts, if anywhere.
    pub artifacts: Option<PathBuf>,
}

impl RunOptions {
    pub fn new(request: ExecutionRequest) -> Self {
        Self {
            request,
            force_refresh: false,
            cleanup: CleanupPolicy::Auto,
            artifacts: None,
        }
    }
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub success: bool,
    pub profile_source: ProfileSource,
    pub handle: ExecutionHandle,
    pub stream_outcome: StreamOutcome,
    pub parsed: ParsedOutput,
    pub cleanup: Option<CleanupResult>,
    pub artifacts: Option<ArtifactPaths>,
    pub events: Vec<RunEvent>,
}

impl RunOutcome {
    /// The JSON summary that is written as the summary artifact.
    pub fn summary(&self) -> Value {
        let summary = RunSummary {
            success: self.success,
            execution_id: &self.handle.execution_id,
            profile_source: self.profile_source,
            http_status: Some(self.handle.http_status),
            close_code: self.stream_outcome.close_code,
            close_reason: self.stream_outcome.close_reason.as_deref(),
            frame_count: self.stream_outcome.frames.len(),
            parsed: Some(&self.parsed),
            cleanup: self.cleanup.as_ref(),
            stream_events: self.stream_outcome.named_events().collect(),
            artifacts: self.artifacts.as_ref(),
        };
        serde_json::to_value(summary).unwrap_or(Value::Null)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunSummary<'a> {
    success: bool,
    execution_id: &'a str,
    profile_source: ProfileSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    http_status: Option<u16>,
    close_code: Option<u16>,
    close_reason: Option<&'a str>,
    frame_count: usize,
    parsed: Option<&'a ParsedOutput>,
    cleanup: Option<&'a CleanupResult>,
    stream_events: Vec<&'a StreamFrame>,
    #[serde(skip_serializing_if = "Option::is_none")]
    artifacts: Option<&'a ArtifactPaths>,
}

#[derive(Serialize)]
struct ErrorSummary {
    kind: &'static str,
    message: String,
}

/// How the stream ended when it did not close normally.
enum StreamFailure {
    Timeout { message: String, cancelled: bool },
    Transport(String),
    SendFailed(String),
}

impl StreamFailure {
    fn message(&self) -> &str {
        match self {
            Self::Timeout { message, .. } | Self::Transport(message) | Self::SendFailed(message) => {
                message
            }
        }
    }

    fn into_error(self, diagnostics: Box<RunDiagnostics>) -> RunError {
        match self {
            Self::Timeout { message, cancelled } => RunError::StreamTimeout {
                message,
                cancelled,
                diagnostics,
            },
            Self::Transport(message) => RunError::StreamError {
                message,
                diagnostics,
            },
            Self::SendFailed(message) => RunError::StreamSendFailed {
                message,
                diagnostics,
            },
        }
    }
}

impl From<StreamSessionError> for StreamFailure {
    fn from(err: StreamSessionError) -> Self {
        let message = err.to_string();
        match err {
            StreamSessionError::Timeout { cancelled, .. } => Self::Timeout { message, cancelled },
            StreamSessionError::Transport { message, .. } => Self::Transport(message),
            StreamSessionError::SendFailed { message, .. } => Self::SendFailed(message),
        }
    }
}

fn start_error(err: ToolApiError) -> RunError {
    let message = err.to_string();
    match err {
        ToolApiError::StartFailed { status, body } => RunError::StartFailed {
            status: Some(status),
            message: format!("HTTP {status}: {body}"),
        },
        ToolApiError::ExecutionIdMissing { status, body } => {
            RunError::ExecutionIdMissing { status, body }
        }
        ToolApiError::ApiError { status, .. } => RunError::StartFailed {
            status: Some(status),
            message,
        },
        _ => RunError::StartFailed {
            status: None,
            message,
        },
    }
}

/// Runs migrations against one remote tool instance.
pub struct Orchestrator {
    api: Arc<ToolApi>,
    stream_client: ToolStreamClient,
    resolver: ProfileResolver,
    stream_config: StreamConfig,
    events: broadcast::Sender<RunEvent>,
}

impl Orchestrator {
    pub fn new(api: Arc<ToolApi>, resolver: ProfileResolver, stream_config: StreamConfig) -> Self {
        let stream_client = ToolStreamClient::new(api.base_url().to_string());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            api,
            stream_client,
            resolver,
            stream_config,
            events,
        }
    }

    /// Wire up HTTP discovery, the file cache, and the stream settings
    /// from `config`.
    pub fn from_config(config: &RunnerConfig) -> Result<Self, RunError> {
        let client = config
            .http_client()
            .map_err(|e| RunError::Config(format!("HTTP client: {e}")))?;
        let api = Arc::new(ToolApi::with_client(client, config.tool_url.clone()));
        let discovery = Arc::new(HttpProfileDiscovery::new(
            Arc::clone(&api),
            config.discovery_url.clone(),
        ));
        let store = Arc::new(FileCacheStore::new(config.cache_path.clone()));
        Ok(Self::new(
            api,
            ProfileResolver::new(discovery, store),
            config.stream_config(),
        ))
    }

    /// Observe run events as they happen.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    /// Execute one run.
    ///
    /// `cancel` aborts with [`RunError::Cancelled`] up to the point the
    /// start request is sent. A start request in flight is always awaited,
    /// and if it yields an execution id the cancelled run still streams
    /// (ending at once with [`RunError::StreamTimeout`]) and is cleaned up.
    pub async fn run(
        &self,
        options: RunOptions,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, RunError> {
        let mut recorder = EventRecorder::new(Some(self.events.clone()));
        let request = &options.request;

        if cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }

        let resolution = self.resolver.resolve(options.force_refresh).await;
        recorder.record(RunEventKind::ProfilesResolved {
            source: resolution.source,
            count: resolution.profiles.len(),
        });
        for note in &resolution.diagnostics {
            tracing::warn!(source = %resolution.source, note = %note, "Profile resolution degraded");
        }
        if !resolution.contains(request.profile()) {
            return Err(RunError::ProfileUnavailable {
                profile: request.profile().clone(),
                source_tier: resolution.source,
                available: resolution
                    .profiles
                    .iter()
                    .map(|p| p.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }

        let jar = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RunError::Cancelled),
            jar = self.api.bootstrap_cookies() => jar,
        };
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }
        // Once sent, the tool may already be running the job.
        let handle = self
            .api
            .start_execution(request, jar)
            .await
            .map_err(start_error)?;
        recorder.record(RunEventKind::ExecutionStarted {
            execution_id: handle.execution_id.clone(),
            http_status: handle.http_status,
        });

        let streamed = self.stream(&handle, cancel).await;
        let (stream_outcome, failure) = match streamed {
            Ok(outcome) => (outcome, None),
            Err((failure, partial)) => (partial, Some(failure)),
        };
        recorder.record(RunEventKind::StreamClosed {
            execution_id: handle.execution_id.clone(),
            frames: stream_outcome.frames.len(),
            close_code: stream_outcome.close_code,
            error: failure.as_ref().map(|f| f.message().to_string()),
        });

        let parsed = output::parse(&stream_outcome.output_text);
        let cleanup = self.cleanup(&handle, options.cleanup, &mut recorder).await;

        let mut outcome = RunOutcome {
            success: failure.is_none() && parsed.is_success(),
            profile_source: resolution.source,
            handle,
            stream_outcome,
            parsed,
            cleanup,
            artifacts: None,
            events: Vec::new(),
        };

        let empty = outcome.stream_outcome.frames.is_empty() && outcome.parsed.clean_text.is_empty();
        let error = match failure {
            Some(failure) => Some(failure.into_error(diagnostics(&outcome))),
            None if empty => Some(RunError::StreamEmpty {
                hint: STREAM_EMPTY_HINT,
                diagnostics: diagnostics(&outcome),
            }),
            None if !outcome.success => Some(RunError::RunFailed {
                diagnostics: diagnostics(&outcome),
            }),
            None => None,
        };

        recorder.record(RunEventKind::RunCompleted {
            execution_id: outcome.handle.execution_id.clone(),
            success: outcome.success,
        });
        tracing::info!(
            execution_id = %outcome.handle.execution_id,
            success = outcome.success,
            frames = outcome.stream_outcome.frames.len(),
            error = ?error.as_ref().map(RunError::kind),
            "Run completed",
        );

        if let Some(out_path) = &options.artifacts {
            outcome.artifacts =
                self.write_artifacts(out_path, &outcome, error.as_ref(), recorder.events());
        }
        outcome.events = recorder.into_events();

        match error {
            Some(mut err) => {
                if let Some(diagnostics) = err.diagnostics_mut() {
                    diagnostics.artifacts = outcome.artifacts.clone();
                }
                Err(err)
            }
            None => Ok(outcome),
        }
    }

    /// Connect and drive the streaming session. Failures carry whatever
    /// output arrived before them.
    async fn stream(
        &self,
        handle: &ExecutionHandle,
        cancel: &CancellationToken,
    ) -> Result<StreamOutcome, (StreamFailure, StreamOutcome)> {
        let execution_id = handle.execution_id.as_str();
        let empty = || StreamOutcome::new(execution_id.to_string(), Vec::new(), None, None);
        let deadline = Instant::now() + self.stream_config.timeout;

        let connecting = self
            .stream_client
            .connect(execution_id, handle.correlation_cookie.as_deref());
        let connection = tokio::select! {
            _ = cancel.cancelled() => {
                let failure = StreamFailure::Timeout {
                    message: format!("Stream for execution {execution_id} cancelled before connecting"),
                    cancelled: true,
                };
                return Err((failure, empty()));
            }
            connected = tokio::time::timeout_at(deadline, connecting) => match connected {
                Ok(Ok(connection)) => connection,
                Ok(Err(e)) => {
                    tracing::error!(execution_id, error = %e, "Failed to open stream");
                    return Err((StreamFailure::Transport(e.to_string()), empty()));
                }
                Err(_) => {
                    let failure = StreamFailure::Timeout {
                        message: format!(
                            "Stream for execution {execution_id} timed out while connecting after {}s",
                            self.stream_config.timeout.as_secs()
                        ),
                        cancelled: false,
                    };
                    return Err((failure, empty()));
                }
            },
        };

        run_session_until(
            connection.ws_stream,
            execution_id,
            self.stream_config,
            deadline,
            cancel,
        )
            .await
            .map_err(|err| {
                let partial = err.partial().clone();
                (StreamFailure::from(err), partial)
            })
    }

    async fn cleanup(
        &self,
        handle: &ExecutionHandle,
        policy: CleanupPolicy,
        recorder: &mut EventRecorder,
    ) -> Option<CleanupResult> {
        if policy == CleanupPolicy::Never {
            tracing::debug!(execution_id = %handle.execution_id, "Cleanup disabled");
            return None;
        }

        let result = self
            .api
            .cleanup(&handle.execution_id, handle.correlation_cookie.as_deref())
            .await;
        if !result.ok {
            tracing::warn!(
                execution_id = %handle.execution_id,
                status = ?result.status,
                error = ?result.error,
                "Cleanup failed",
            );
        }
        recorder.record(RunEventKind::CleanupFinished {
            execution_id: handle.execution_id.clone(),
            result: result.clone(),
        });
        Some(result)
    }

    fn write_artifacts(
        &self,
        out_path: &std::path::Path,
        outcome: &RunOutcome,
        error: Option<&RunError>,
        events: &[RunEvent],
    ) -> Option<ArtifactPaths> {
        let mut summary = outcome.summary();
        if let (Some(err), Value::Object(map)) = (error, &mut summary) {
            let error = ErrorSummary {
                kind: err.kind(),
                message: err.to_string(),
            };
            if let Ok(value) = serde_json::to_value(error) {
                map.insert("error".to_string(), value);
            }
        }
        let input = ArtifactInput {
            summary,
            output_text: outcome.stream_outcome.output_text.clone(),
            events: Some(
                events
                    .iter()
                    .filter_map(|e| serde_json::to_value(e).ok())
                    .collect(),
            ),
        };

        match write_artifacts(out_path, &input) {
            Ok(paths) => {
                tracing::info!(
                    execution_id = %outcome.handle.execution_id,
                    summary = %paths.summary.display(),
                    "Artifacts written",
                );
                Some(paths)
            }
            Err(e) => {
                tracing::warn!(
                    execution_id = %outcome.handle.execution_id,
                    error = %e,
                    "Failed to write artifacts",
                );
                None
            }
        }
    }
}

fn diagnostics(outcome: &RunOutcome) -> Box<RunDiagnostics> {
    Box::new(RunDiagnostics {
        execution_id: outcome.handle.execution_id.clone(),
        close_code: outcome.stream_outcome.close_code,
        close_reason: outcome.stream_outcome.close_reason.clone(),
        frame_count: outcome.stream_outcome.frames.len(),
        parsed: Some(outcome.parsed.clone()),
        report_summary: outcome.parsed.report_summary.clone(),
        cleanup: outcome.cleanup.clone(),
        artifacts: None,
    })
}
