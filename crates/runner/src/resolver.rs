//! Three-tier profile resolution: fresh cache, live discovery, stale cache,
//! then the built-in fallback list.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use migrun_core::profile::{
    fallback_profiles, profile_cache_ttl, MigrationProfile, ProfileCacheRecord, ProfileResolution,
    ProfileSource,
};
use migrun_core::types::Timestamp;
use migrun_remote::api::{ToolApi, ToolApiError};
use migrun_remote::discovery::discover_profiles;

use crate::cache::ProfileCacheStore;

/// Source of live profile names.
#[async_trait]
pub trait ProfileDiscovery: Send + Sync {
    async fn discover(&self) -> Result<Vec<MigrationProfile>, ToolApiError>;
}

/// Scrapes the tool's frontend bundle over HTTP.
pub struct HttpProfileDiscovery {
    api: Arc<ToolApi>,
    index_url: String,
}

impl HttpProfileDiscovery {
    pub fn new(api: Arc<ToolApi>, index_url: String) -> Self {
        Self { api, index_url }
    }
}

#[async_trait]
impl ProfileDiscovery for HttpProfileDiscovery {
    async fn discover(&self) -> Result<Vec<MigrationProfile>, ToolApiError> {
        discover_profiles(&self.api, &self.index_url).await
    }
}

pub struct ProfileResolver {
    discovery: Arc<dyn ProfileDiscovery>,
    store: Arc<dyn ProfileCacheStore>,
    ttl: Duration,
}

impl ProfileResolver {
    pub fn new(discovery: Arc<dyn ProfileDiscovery>, store: Arc<dyn ProfileCacheStore>) -> Self {
        Self {
            discovery,
            store,
            ttl: profile_cache_ttl(),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Resolve the available profiles. Never fails.
    pub async fn resolve(&self, force_refresh: bool) -> ProfileResolution {
        self.resolve_at(force_refresh, Utc::now()).await
    }

    /// [`resolve`](Self::resolve) against an explicit clock.
    pub async fn resolve_at(&self, force_refresh: bool, now: Timestamp) -> ProfileResolution {
        // A record without profiles is no better than no record.
        let cached = self.store.load().filter(|r| !r.profiles.is_empty());

        if !force_refresh {
            if let Some(record) = cached.as_ref().filter(|r| r.is_fresh(now, self.ttl)) {
                tracing::debug!(count = record.profiles.len(), "Using fresh profile cache");
                return ProfileResolution {
                    profiles: record.profiles.clone(),
                    source: ProfileSource::Cache,
                    fetched_at: record.fetched_at,
                    diagnostics: Vec::new(),
                };
            }
        }

        let mut diagnostics = Vec::new();
        match self.discovery.discover().await {
            Ok(profiles) if !profiles.is_empty() => {
                let record = ProfileCacheRecord {
                    fetched_at: now,
                    profiles,
                };
                if let Err(e) = self.store.save(&record) {
                    tracing::warn!(error = %e, "Failed to persist profile cache");
                    diagnostics.push(format!("cache write failed: {e}"));
                }
                tracing::info!(count = record.profiles.len(), "Discovered profiles");
                return ProfileResolution {
                    profiles: record.profiles,
                    source: ProfileSource::Live,
                    fetched_at: now,
                    diagnostics,
                };
            }
            Ok(_) => {
                tracing::warn!("Profile discovery found no profiles");
                diagnostics.push("discovery returned no profiles".to_string());
            }
            Err(e) => {
                tracing::warn!(error = %e, "Profile discovery failed");
                diagnostics.push(format!("discovery failed: {e}"));
            }
        }

        match cached {
            Some(record) => ProfileResolution {
                profiles: record.profiles,
                source: ProfileSource::Cache,
                fetched_at: record.fetched_at,
                diagnostics,
            },
            None => ProfileResolution {
                profiles: fallback_profiles(),
                source: ProfileSource::Fallback,
                fetched_at: now,
                diagnostics,
            },
        }
    }
}
