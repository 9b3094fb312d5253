//! Persistence for the last successfully discovered profile list.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use migrun_core::profile::ProfileCacheRecord;

/// Errors writing the profile cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Failed to write profile cache {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode profile cache: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Storage for a single [`ProfileCacheRecord`].
///
/// Reads never fail: anything unreadable is treated as "no record".
pub trait ProfileCacheStore: Send + Sync {
    fn load(&self) -> Option<ProfileCacheRecord>;

    fn save(&self, record: &ProfileCacheRecord) -> Result<(), CacheError>;
}

/// JSON file at a fixed path.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    path: PathBuf,
}

impl FileCacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProfileCacheStore for FileCacheStore {
    fn load(&self) -> Option<ProfileCacheRecord> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "Profile cache unreadable");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "Profile cache malformed");
                None
            }
        }
    }

    fn save(&self, record: &ProfileCacheRecord) -> Result<(), CacheError> {
        let io_err = |source| CacheError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(record)?;
        std::fs::write(&self.path, json).map_err(io_err)
    }
}

/// In-process store, used by tests and embedders that do not want disk state.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    record: Mutex<Option<ProfileCacheRecord>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: ProfileCacheRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
        }
    }
}

impl ProfileCacheStore for MemoryCacheStore {
    fn load(&self) -> Option<ProfileCacheRecord> {
        self.record.lock().ok().and_then(|guard| guard.clone())
    }

    fn save(&self, record: &ProfileCacheRecord) -> Result<(), CacheError> {
        if let Ok(mut guard) = self.record.lock() {
            *guard = Some(record.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use migrun_core::profile::MigrationProfile;

    use super::*;

    fn record() -> ProfileCacheRecord {
        ProfileCacheRecord {
            fetched_at: Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap(),
            profiles: vec![MigrationProfile::from("devncdns_qancdns")],
        }
    }

    #[test]
    fn file_store_round_trip_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path().join("nested/cache/profiles.json"));

        assert!(store.load().is_none());
        store.save(&record()).unwrap();
        assert_eq!(store.load(), Some(record()));

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["fetchedAt"], "2026-03-01T08:00:00Z");
        assert_eq!(json["profiles"][0], "devncdns_qancdns");
    }

    #[test]
    fn malformed_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(FileCacheStore::new(path).load().is_none());
    }

    #[test]
    fn unwritable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let store = FileCacheStore::new(blocker.join("profiles.json"));
        assert!(matches!(store.save(&record()), Err(CacheError::Io { .. })));
    }

    #[test]
    fn memory_store_keeps_latest_record() {
        let store = MemoryCacheStore::new();
        assert!(store.load().is_none());
        store.save(&record()).unwrap();
        assert_eq!(store.load(), Some(record()));
    }
}
