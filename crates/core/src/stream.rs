//! Frames received over the execution streaming channel.
//!
//! The remote tool either sends JSON envelopes of the shape
//! `{"event": "...", "data": "..."}` or plain text. Both are normalised
//! into [`StreamFrame`]; the concatenation of every frame's text forms the
//! session's raw console output.

use serde::Serialize;

use crate::types::ExecutionId;

/// One inbound message unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamFrame {
    /// Payload exactly as received.
    pub raw: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl StreamFrame {
    /// Normalise a text payload into a frame.
    ///
    /// JSON objects contribute their `event` and `data` fields (non-string
    /// `data` is kept as its JSON text). Anything else becomes both `raw`
    /// and `data`.
    pub fn from_payload(payload: &str) -> Self {
        if let Ok(serde_json::Value::Object(mut map)) = serde_json::from_str(payload) {
            let event_name = match map.remove("event") {
                Some(serde_json::Value::String(s)) => Some(s),
                _ => None,
            };
            let data = match map.remove("data") {
                None | Some(serde_json::Value::Null) => None,
                Some(serde_json::Value::String(s)) => Some(s),
                Some(other) => Some(other.to_string()),
            };
            return Self {
                raw: payload.to_string(),
                event_name,
                data,
            };
        }

        Self {
            raw: payload.to_string(),
            event_name: None,
            data: Some(payload.to_string()),
        }
    }

    /// Text this frame contributes to the output: `data`, else `raw`.
    pub fn text(&self) -> &str {
        self.data.as_deref().unwrap_or(&self.raw)
    }
}

/// Concatenate frame texts in arrival order.
pub fn concat_frames(frames: &[StreamFrame]) -> String {
    frames.iter().map(StreamFrame::text).collect()
}

/// Terminal result of one streaming session that closed normally.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamOutcome {
    pub execution_id: ExecutionId,
    pub frames: Vec<StreamFrame>,
    pub output_text: String,
    pub close_code: Option<u16>,
    pub close_reason: Option<String>,
}

impl StreamOutcome {
    pub fn new(
        execution_id: ExecutionId,
        frames: Vec<StreamFrame>,
        close_code: Option<u16>,
        close_reason: Option<String>,
    ) -> Self {
        let output_text = concat_frames(&frames);
        Self {
            execution_id,
            frames,
            output_text,
            close_code,
            close_reason,
        }
    }

    /// Frames that carried an event name, used for the events artifact.
    pub fn named_events(&self) -> impl Iterator<Item = &StreamFrame> {
        self.frames.iter().filter(|f| f.event_name.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_envelope_is_split() {
        let frame = StreamFrame::from_payload(r#"{"event":"output","data":"line 1\n"}"#);
        assert_eq!(frame.event_name.as_deref(), Some("output"));
        assert_eq!(frame.text(), "line 1\n");
    }

    #[test]
    fn plain_text_becomes_data() {
        let frame = StreamFrame::from_payload("plain line\n");
        assert!(frame.event_name.is_none());
        assert_eq!(frame.raw, "plain line\n");
        assert_eq!(frame.text(), "plain line\n");
    }

    #[test]
    fn envelope_without_data_falls_back_to_raw() {
        let payload = r#"{"event":"heartbeat"}"#;
        let frame = StreamFrame::from_payload(payload);
        assert_eq!(frame.event_name.as_deref(), Some("heartbeat"));
        assert_eq!(frame.text(), payload);
    }

    #[test]
    fn non_string_data_keeps_json_text() {
        let frame = StreamFrame::from_payload(r#"{"event":"status","data":{"code":1}}"#);
        assert_eq!(frame.text(), r#"{"code":1}"#);
    }

    #[test]
    fn json_array_is_raw_text() {
        let frame = StreamFrame::from_payload("[1,2]");
        assert!(frame.event_name.is_none());
        assert_eq!(frame.text(), "[1,2]");
    }

    #[test]
    fn outcome_concatenates_in_order() {
        let frames = vec![
            StreamFrame::from_payload("a"),
            StreamFrame::from_payload(r#"{"event":"output","data":"b"}"#),
            StreamFrame::from_payload("c"),
        ];
        let outcome = StreamOutcome::new("42".into(), frames, Some(1000), None);
        assert_eq!(outcome.output_text, "abc");
        assert_eq!(outcome.named_events().count(), 1);
    }
}
