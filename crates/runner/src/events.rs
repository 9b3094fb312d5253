//! Lifecycle events emitted while a run progresses.
//!
//! Every event is appended to the run's own log (which becomes the events
//! artifact) and published on a broadcast channel for live observers.

use migrun_core::execution::CleanupResult;
use migrun_core::profile::ProfileSource;
use migrun_core::types::Timestamp;
use serde::Serialize;
use tokio::sync::broadcast;

/// Capacity of the observer channel. Slow observers miss events; the
/// run's own log is unaffected.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEventKind {
    ProfilesResolved {
        source: ProfileSource,
        count: usize,
    },
    ExecutionStarted {
        execution_id: String,
        http_status: u16,
    },
    StreamClosed {
        execution_id: String,
        frames: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        close_code: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    CleanupFinished {
        execution_id: String,
        result: CleanupResult,
    },
    RunCompleted {
        execution_id: String,
        success: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunEvent {
    pub at: Timestamp,
    #[serde(flatten)]
    pub kind: RunEventKind,
}

/// Ordered event log for one run plus its broadcast side.
pub(crate) struct EventRecorder {
    events: Vec<RunEvent>,
    sender: Option<broadcast::Sender<RunEvent>>,
}

impl EventRecorder {
    pub(crate) fn new(sender: Option<broadcast::Sender<RunEvent>>) -> Self {
        Self {
            events: Vec::new(),
            sender,
        }
    }

    pub(crate) fn record(&mut self, kind: RunEventKind) {
        let event = RunEvent {
            at: chrono::Utc::now(),
            kind,
        };
        if let Some(sender) = &self.sender {
            // No receivers is not an error.
            let _ = sender.send(event.clone());
        }
        self.events.push(event);
    }

    pub(crate) fn events(&self) -> &[RunEvent] {
        &self.events
    }

    pub(crate) fn into_events(self) -> Vec<RunEvent> {
        self.events
    }
}
