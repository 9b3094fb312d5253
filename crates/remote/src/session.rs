//! Async driver for an execution's streaming session.
//!
//! [`run_session`] owns the socket for the lifetime of one execution. It
//! waits on four triggers with `tokio::select!` (inbound frame, overall
//! deadline, handshake retry, caller cancellation) and feeds each into the
//! [`StreamMachine`]. Both timers live on this function's stack, so they
//! are dropped as soon as the first terminal event resolves the session.

use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use migrun_core::stream::StreamOutcome;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;

use crate::machine::{SessionState, StreamMachine};

/// Upper bound on the forced close after a timeout.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Timing parameters for one session.
#[derive(Debug, Clone, Copy)]
pub struct StreamConfig {
    /// Overall bound on the session.
    pub timeout: Duration,
    /// Delay before the one-shot handshake resend.
    pub handshake_retry: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            handshake_retry: Duration::from_secs(1),
        }
    }
}

/// Failures of a streaming session. Each carries whatever was received
/// before the failure.
#[derive(Debug, thiserror::Error)]
pub enum StreamSessionError {
    #[error("Stream transport error for execution {}: {message}", .partial.execution_id)]
    Transport {
        message: String,
        partial: Box<StreamOutcome>,
    },

    #[error("Failed to send handshake for execution {}: {message}", .partial.execution_id)]
    SendFailed {
        message: String,
        partial: Box<StreamOutcome>,
    },

    #[error(
        "Stream for execution {} {} after {}s",
        .partial.execution_id,
        timeout_verb(.cancelled),
        .timeout.as_secs()
    )]
    Timeout {
        timeout: Duration,
        /// Set when the caller's cancellation drove the deadline path.
        cancelled: bool,
        partial: Box<StreamOutcome>,
    },
}

fn timeout_verb(cancelled: &bool) -> &'static str {
    if *cancelled {
        "cancelled"
    } else {
        "timed out"
    }
}

impl StreamSessionError {
    /// Output received before the failure.
    pub fn partial(&self) -> &StreamOutcome {
        match self {
            Self::Transport { partial, .. }
            | Self::SendFailed { partial, .. }
            | Self::Timeout { partial, .. } => partial,
        }
    }
}

/// Drive a connected channel to completion.
///
/// Sends the confirmation handshake, collects frames until the server
/// closes the channel, and fails on transport errors, send failures, the
/// deadline, or `cancel`. The deadline is `config.timeout` from now.
pub async fn run_session<S>(
    ws_stream: S,
    execution_id: &str,
    config: StreamConfig,
    cancel: &CancellationToken,
) -> Result<StreamOutcome, StreamSessionError>
where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
{
    let deadline = Instant::now() + config.timeout;
    run_session_until(ws_stream, execution_id, config, deadline, cancel).await
}

/// Like [`run_session`], against a deadline fixed by the caller.
///
/// Use this when the deadline was started before connecting, so the
/// connect time counts against the same budget.
pub async fn run_session_until<S>(
    ws_stream: S,
    execution_id: &str,
    config: StreamConfig,
    deadline: Instant,
    cancel: &CancellationToken,
) -> Result<StreamOutcome, StreamSessionError>
where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
{
    let mut machine = StreamMachine::new(execution_id, config.timeout);
    let (mut sink, mut stream) = ws_stream.split();

    let deadline = tokio::time::sleep_until(deadline);
    tokio::pin!(deadline);

    for payload in machine.on_connected() {
        if let Err(e) = sink.send(Message::Text((*payload).to_string())).await {
            tracing::error!(execution_id, error = %e, "Failed to send handshake");
            machine.on_send_failed(e.to_string());
            return machine.finish();
        }
    }
    tracing::debug!(execution_id, "Handshake sent, awaiting output");

    let retry = tokio::time::sleep(config.handshake_retry);
    tokio::pin!(retry);

    while !machine.is_terminal() {
        tokio::select! {
            _ = &mut deadline => {
                tracing::warn!(
                    execution_id,
                    timeout_secs = config.timeout.as_secs(),
                    frames = machine.frame_count(),
                    "Stream deadline reached",
                );
                machine.on_deadline(false);
            }
            _ = cancel.cancelled() => {
                tracing::warn!(execution_id, "Stream cancelled by caller");
                machine.on_deadline(true);
            }
            _ = &mut retry, if machine.retry_armed() => {
                if let Some(payload) = machine.on_retry_elapsed() {
                    tracing::debug!(execution_id, "No output yet, resending handshake");
                    if let Err(e) = sink.send(Message::Text(payload.to_string())).await {
                        tracing::error!(execution_id, error = %e, "Failed to resend handshake");
                        machine.on_send_failed(e.to_string());
                    }
                }
            }
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    tracing::trace!(execution_id, len = text.len(), "Frame received");
                    machine.on_message(&text);
                }
                Some(Ok(Message::Binary(bytes))) => {
                    machine.on_message(&String::from_utf8_lossy(&bytes));
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {
                    // Handled automatically by tungstenite.
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(frame) => {
                            let reason = frame.reason.to_string();
                            (
                                Some(u16::from(frame.code)),
                                (!reason.is_empty()).then_some(reason),
                            )
                        }
                        None => (None, None),
                    };
                    tracing::info!(
                        execution_id,
                        ?code,
                        frames = machine.frame_count(),
                        "Stream closed by server",
                    );
                    machine.on_close(code, reason);
                }
                Some(Err(e)) => {
                    tracing::error!(execution_id, error = %e, "Stream receive error");
                    machine.on_error(e.to_string());
                }
                None => {
                    tracing::info!(execution_id, "Stream ended without close frame");
                    machine.on_close(None, None);
                }
            },
        }
    }

    if machine.state() == SessionState::TimedOut
        && tokio::time::timeout(CLOSE_GRACE, sink.close()).await.is_err()
    {
        tracing::debug!(execution_id, "Forced close did not complete in time");
    }

    machine.finish()
}
