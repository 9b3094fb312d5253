//! Embedded migration report recovery.
//!
//! The remote tool prints a JSON report in the middle of its console
//! output, after the `REPORT :: Report result:` marker. The block is
//! located by brace matching from the first `{` after the marker, so
//! braces inside quoted strings and any trailing text do not confuse it.

use serde::Serialize;
use serde_json::Value;

/// Marker line preceding the embedded report.
pub const REPORT_MARKER: &str = "REPORT :: Report result:";

/// Tally over a report's `comparisonResults` array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub migration_id: Option<String>,
    pub migration_status: Option<String>,
    pub status_code: Option<String>,
    pub entity_count: usize,
    pub mismatch_count: usize,
    pub success_count: usize,
    pub failed_count: usize,
}

/// Return the balanced `{ ... }` slice that starts at the first `{`
/// after [`REPORT_MARKER`], or `None` if the marker or a closing brace is
/// missing.
pub fn extract_report_block(text: &str) -> Option<&str> {
    let marker_at = text.find(REPORT_MARKER)?;
    let after_marker = marker_at + REPORT_MARKER.len();
    let start = after_marker + text[after_marker..].find('{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Locate and parse the embedded report. Malformed JSON yields `None`.
pub fn parse_report(text: &str) -> Option<Value> {
    let block = extract_report_block(text)?;
    serde_json::from_str::<Value>(block)
        .ok()
        .filter(Value::is_object)
}

/// Count comparison outcomes in a parsed report.
pub fn summarize_report(report: &Value) -> ReportSummary {
    let results = report
        .get("comparisonResults")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let upper = |entry: &Value, key: &str| {
        entry
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_ascii_uppercase)
    };

    let mut summary = ReportSummary {
        migration_id: scalar_string(report.get("migrationId")),
        migration_status: scalar_string(report.get("migrationStatus")),
        status_code: scalar_string(report.get("statusCode")),
        entity_count: results.len(),
        ..Default::default()
    };

    for entry in results {
        if upper(entry, "comparisonStatus").as_deref() == Some("MISMATCH") {
            summary.mismatch_count += 1;
        }
        match upper(entry, "status").as_deref() {
            Some("SUCCESS") => summary.success_count += 1,
            Some("FAILED") => summary.failed_count += 1,
            _ => {}
        }
    }

    summary
}

fn scalar_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
