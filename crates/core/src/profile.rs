//! Migration profiles and their provenance.
//!
//! A profile names a source -> target environment pair understood by the
//! remote migration tool (e.g. `devncdns_qancdns`). Profiles are never
//! listed by a real API; they are scraped out of the tool's frontend
//! bundle with a fixed pattern, cached on disk, and backed by a
//! hard-coded list when neither source is available.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use chrono::Duration;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// How long a cached profile list is preferred over live discovery.
pub const PROFILE_CACHE_TTL_HOURS: i64 = 12;

/// Profiles used when neither live discovery nor the cache produced any.
pub const FALLBACK_PROFILES: &[&str] = &[
    "devncdns_qancdns",
    "qancdns_devncdns",
    "qancdns_uatncdns",
    "uatncdns_qancdns",
    "uatncdns_prodncdns",
];

/// `<segment>ncdns_<segment>ncdns`. Segments are alphanumeric, so `_`,
/// quotes, and other punctuation around a name delimit it.
static PROFILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z0-9]+ncdns_[A-Za-z0-9]+ncdns)").expect("valid regex")
});

/// Cache TTL as a [`chrono::Duration`].
pub fn profile_cache_ttl() -> Duration {
    Duration::hours(PROFILE_CACHE_TTL_HOURS)
}

// ---------------------------------------------------------------------------
// MigrationProfile
// ---------------------------------------------------------------------------

/// A named source -> target environment pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MigrationProfile(String);

impl MigrationProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MigrationProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MigrationProfile {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Run the profile pattern over each document and return the distinct
/// matches in sorted order.
pub fn extract_profiles<'a, I>(documents: I) -> Vec<MigrationProfile>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut found = BTreeSet::new();
    for doc in documents {
        for caps in PROFILE_RE.captures_iter(doc) {
            found.insert(MigrationProfile::new(&caps[1]));
        }
    }
    found.into_iter().collect()
}

/// The hard-coded fallback list.
pub fn fallback_profiles() -> Vec<MigrationProfile> {
    FALLBACK_PROFILES
        .iter()
        .map(|p| MigrationProfile::new(*p))
        .collect()
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Which tier produced a [`ProfileResolution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileSource {
    Live,
    Cache,
    Fallback,
}

impl ProfileSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Cache => "cache",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for ProfileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The answer to "which profiles exist", tagged with its provenance.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResolution {
    pub profiles: Vec<MigrationProfile>,
    pub source: ProfileSource,
    pub fetched_at: Timestamp,
    /// Notes on degraded paths taken (discovery errors, cache write failures).
    pub diagnostics: Vec<String>,
}

impl ProfileResolution {
    pub fn contains(&self, profile: &MigrationProfile) -> bool {
        self.profiles.iter().any(|p| p == profile)
    }
}

/// On-disk cache document: `{ "fetchedAt": ISO-8601, "profiles": [...] }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileCacheRecord {
    pub fetched_at: Timestamp,
    pub profiles: Vec<MigrationProfile>,
}

impl ProfileCacheRecord {
    /// Whether the record is young enough to be preferred over discovery.
    pub fn is_fresh(&self, now: Timestamp, ttl: Duration) -> bool {
        now >= self.fetched_at && now - self.fetched_at < ttl
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
