//! Parser for the remote tool's console output.
//!
//! The tool has no structured API for run results; everything is rendered
//! as ANSI-coloured log text. [`parse`] is a pure function over that text
//! and is the only place where textual extraction happens.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::report::{parse_report, summarize_report, ReportSummary};

// ---------------------------------------------------------------------------
// Markers
// ---------------------------------------------------------------------------

pub const SUCCESS_PHRASE: &str = "All migrations completed successfully";
pub const FAILURE_PHRASE: &str = "All migrations completed with errors";
pub const TRACEBACK_MARKER: &str = "Traceback (most recent call last)";
pub const MIGRATION_FAILED_PHRASE: &str = "Migration failed";

/// Report status that counts as success when no phrase is printed.
pub const COMPLETED_STATUS: &str = "COMPLETED";

static ANSI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*m").expect("valid regex"));

static HINT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)failed|error|traceback|exception").expect("valid regex"));

static RUN_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"([0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12})\s*=>\s*(?:PD|AD)\s*::",
    )
    .expect("valid regex")
});

static MIGRATION_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"migration_id:\s*["']?([^\s"',}]+)"#).expect("valid regex")
});

static STATUS_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Status URL:\s*(\S+)").expect("valid regex"));

static DETAILS_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Details:\s*(https?://\S+)").expect("valid regex"));

static HOSTS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Source:\s*(\S+)\s*=>\s*Target:\s*(\S+)").expect("valid regex")
});

// ---------------------------------------------------------------------------
// ParsedOutput
// ---------------------------------------------------------------------------

/// Structured facts recovered from a run's console output.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedOutput {
    /// Output with ANSI colour sequences removed.
    #[serde(skip)]
    pub clean_text: String,
    pub success_detected: bool,
    pub failure_detected: bool,
    /// Upper-cased, deduplicated failure keywords, sorted.
    pub failure_hints: Vec<String>,
    pub run_id: Option<String>,
    pub migration_id: Option<String>,
    pub status_url: Option<String>,
    pub details_url: Option<String>,
    pub source_host: Option<String>,
    pub target_host: Option<String>,
    pub report: Option<Value>,
    pub report_summary: Option<ReportSummary>,
}

impl ParsedOutput {
    /// Overall verdict for a run.
    ///
    /// An explicit failure signal always wins. Otherwise the run succeeded
    /// if the success phrase was printed or the report says `COMPLETED`.
    pub fn is_success(&self) -> bool {
        if self.failure_detected {
            return false;
        }
        if self.success_detected {
            return true;
        }
        self.report_summary
            .as_ref()
            .and_then(|s| s.migration_status.as_deref())
            .is_some_and(|status| status.eq_ignore_ascii_case(COMPLETED_STATUS))
    }
}

/// Remove `ESC [ ... m` sequences. Idempotent.
pub fn strip_ansi(text: &str) -> String {
    ANSI_RE.replace_all(text, "").into_owned()
}

/// Parse raw console output into a [`ParsedOutput`].
pub fn parse(output_text: &str) -> ParsedOutput {
    let clean = strip_ansi(output_text);

    let success_detected = clean.contains(SUCCESS_PHRASE);
    let failure_detected = clean.contains(FAILURE_PHRASE)
        || clean.contains(TRACEBACK_MARKER)
        || clean.contains(MIGRATION_FAILED_PHRASE);

    let failure_hints: BTreeSet<String> = HINT_RE
        .find_iter(&clean)
        .map(|m| m.as_str().to_ascii_uppercase())
        .collect();

    let first = |re: &Regex| re.captures(&clean).map(|c| c[1].to_string());

    let (source_host, target_host) = match HOSTS_RE.captures(&clean) {
        Some(caps) => (Some(caps[1].to_string()), Some(caps[2].to_string())),
        None => (None, None),
    };

    let report = parse_report(&clean);
    let report_summary = report.as_ref().map(summarize_report);

    ParsedOutput {
        success_detected,
        failure_detected,
        failure_hints: failure_hints.into_iter().collect(),
        run_id: first(&RUN_ID_RE),
        migration_id: first(&MIGRATION_ID_RE),
        status_url: first(&STATUS_URL_RE),
        details_url: first(&DETAILS_URL_RE),
        source_host,
        target_host,
        report,
        report_summary,
        clean_text: clean,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
