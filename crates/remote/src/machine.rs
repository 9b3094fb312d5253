//! Handshake and lifecycle state machine for one streaming session.
//!
//! [`StreamMachine`] is synchronous: the async driver in
//! [`crate::session`] feeds it connection, message, close, error, timer
//! and deadline events and performs the sends it asks for. The first
//! terminal event wins; every later event is a no-op, and reaching a
//! terminal state disarms the handshake retry.
//!
//! ```text
//! Connecting -> AwaitingConfirmAck -> Streaming -> Closed
//!                      |                  |
//!                      +-----> Errored / TimedOut
//! ```

use std::time::Duration;

use migrun_core::stream::{StreamFrame, StreamOutcome};

use crate::session::StreamSessionError;

/// Confirmation payloads sent right after connecting. Both variants are
/// sent because the remote side is sensitive to the trailing newline.
pub const HANDSHAKE_PAYLOADS: [&str; 2] = ["yes", "yes\n"];

/// Payload resent once if nothing has arrived when the retry timer fires.
pub const RETRY_PAYLOAD: &str = "yes\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    AwaitingConfirmAck,
    Streaming,
    Closed,
    Errored,
    TimedOut,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Errored | Self::TimedOut)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Resolution {
    Closed {
        code: Option<u16>,
        reason: Option<String>,
    },
    Transport(String),
    SendFailed(String),
    TimedOut {
        cancelled: bool,
    },
}

/// State of one streaming session.
#[derive(Debug)]
pub struct StreamMachine {
    execution_id: String,
    timeout: Duration,
    state: SessionState,
    frames: Vec<StreamFrame>,
    retry_armed: bool,
    resolution: Option<Resolution>,
}

impl StreamMachine {
    pub fn new(execution_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            execution_id: execution_id.into(),
            timeout,
            state: SessionState::Connecting,
            frames: Vec::new(),
            retry_armed: false,
            resolution: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Whether the handshake retry timer is still pending.
    pub fn retry_armed(&self) -> bool {
        self.retry_armed
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Channel is open: returns the handshake payloads to send and arms
    /// the retry timer. Only meaningful once, from `Connecting`.
    pub fn on_connected(&mut self) -> &'static [&'static str] {
        if self.state != SessionState::Connecting {
            return &[];
        }
        self.state = SessionState::AwaitingConfirmAck;
        self.retry_armed = true;
        &HANDSHAKE_PAYLOADS
    }

    /// The retry timer fired. Disarms it and returns the payload to resend
    /// if no frame has arrived yet.
    pub fn on_retry_elapsed(&mut self) -> Option<&'static str> {
        if !self.retry_armed || self.is_terminal() {
            return None;
        }
        self.retry_armed = false;
        self.frames.is_empty().then_some(RETRY_PAYLOAD)
    }

    /// An inbound text payload.
    pub fn on_message(&mut self, payload: &str) {
        if self.is_terminal() {
            return;
        }
        self.frames.push(StreamFrame::from_payload(payload));
        if self.state == SessionState::AwaitingConfirmAck {
            self.state = SessionState::Streaming;
        }
    }

    /// Server closed the channel (or the stream ended). Returns whether
    /// this event resolved the session.
    pub fn on_close(&mut self, code: Option<u16>, reason: Option<String>) -> bool {
        self.resolve(SessionState::Closed, Resolution::Closed { code, reason })
    }

    pub fn on_error(&mut self, message: impl Into<String>) -> bool {
        self.resolve(SessionState::Errored, Resolution::Transport(message.into()))
    }

    pub fn on_send_failed(&mut self, message: impl Into<String>) -> bool {
        self.resolve(SessionState::Errored, Resolution::SendFailed(message.into()))
    }

    /// The overall deadline fired, or the caller cancelled.
    pub fn on_deadline(&mut self, cancelled: bool) -> bool {
        self.resolve(SessionState::TimedOut, Resolution::TimedOut { cancelled })
    }

    fn resolve(&mut self, state: SessionState, resolution: Resolution) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.state = state;
        self.retry_armed = false;
        self.resolution = Some(resolution);
        true
    }

    /// Consume the machine and produce the session result.
    pub fn finish(self) -> Result<StreamOutcome, StreamSessionError> {
        let resolution = self.resolution;
        let timeout = self.timeout;

        match resolution {
            Some(Resolution::Closed { code, reason }) => {
                Ok(StreamOutcome::new(self.execution_id, self.frames, code, reason))
            }
            Some(Resolution::Transport(message)) => Err(StreamSessionError::Transport {
                message,
                partial: Box::new(StreamOutcome::new(self.execution_id, self.frames, None, None)),
            }),
            Some(Resolution::SendFailed(message)) => Err(StreamSessionError::SendFailed {
                message,
                partial: Box::new(StreamOutcome::new(self.execution_id, self.frames, None, None)),
            }),
            Some(Resolution::TimedOut { cancelled }) => Err(StreamSessionError::Timeout {
                timeout,
                cancelled,
                partial: Box::new(StreamOutcome::new(self.execution_id, self.frames, None, None)),
            }),
            None => Err(StreamSessionError::Transport {
                message: "session ended before reaching a terminal state".into(),
                partial: Box::new(StreamOutcome::new(self.execution_id, self.frames, None, None)),
            }),
        }
    }
}
