//! Runner configuration loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use migrun_core::execution::{ExecutionFlags, ExecutionRequest, ModuleName, YesNo};
use migrun_core::profile::MigrationProfile;
use migrun_remote::session::StreamConfig;

/// Default script registered in the remote tool for entity migrations.
pub const DEFAULT_SCRIPT_NAME: &str = "Entity Migration";

/// Default location of the profile cache file.
pub const DEFAULT_CACHE_PATH: &str = ".migrun/profile-cache.json";

/// Whether the runner calls the cleanup endpoint after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupPolicy {
    Auto,
    Never,
}

impl FromStr for CleanupPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "never" => Ok(Self::Never),
            other => Err(ConfigError::Invalid {
                var: "MIGRUN_CLEANUP",
                message: format!("'{other}' is not one of: auto, never"),
            }),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{var} is invalid: {message}")]
    Invalid { var: &'static str, message: String },
}

/// Connection and timing settings shared by every run.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Base HTTP URL of the remote tool.
    pub tool_url: String,
    /// Index page scanned for profile names.
    pub discovery_url: String,
    pub script_name: String,
    pub cache_path: PathBuf,
    pub stream_timeout: Duration,
    pub handshake_retry: Duration,
    pub http_timeout: Duration,
    pub cleanup: CleanupPolicy,
}

fn parse_num<T: FromStr>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            message: e.to_string(),
        }),
    }
}

impl RunnerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                      | Default                        |
    /// |------------------------------|--------------------------------|
    /// | `MIGRUN_TOOL_URL`            | required                       |
    /// | `MIGRUN_DISCOVERY_URL`       | `<tool url>/index.html`        |
    /// | `MIGRUN_SCRIPT_NAME`         | `Entity Migration`             |
    /// | `MIGRUN_CACHE_PATH`          | `.migrun/profile-cache.json`   |
    /// | `MIGRUN_STREAM_TIMEOUT_SECS` | `600`                          |
    /// | `MIGRUN_HANDSHAKE_RETRY_MS`  | `1000`                         |
    /// | `MIGRUN_HTTP_TIMEOUT_SECS`   | `30`                           |
    /// | `MIGRUN_CLEANUP`             | `auto`                         |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reading through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let tool_url = get("MIGRUN_TOOL_URL")
            .ok_or(ConfigError::Missing("MIGRUN_TOOL_URL"))?
            .trim()
            .trim_end_matches('/')
            .to_string();
        if !tool_url.starts_with("http://") && !tool_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                var: "MIGRUN_TOOL_URL",
                message: format!("'{tool_url}' must start with http:// or https://"),
            });
        }

        let discovery_url =
            get("MIGRUN_DISCOVERY_URL").unwrap_or_else(|| format!("{tool_url}/index.html"));
        let script_name = get("MIGRUN_SCRIPT_NAME").unwrap_or_else(|| DEFAULT_SCRIPT_NAME.into());
        let cache_path = PathBuf::from(
            get("MIGRUN_CACHE_PATH").unwrap_or_else(|| DEFAULT_CACHE_PATH.into()),
        );

        let stream_timeout_secs: u64 =
            parse_num("MIGRUN_STREAM_TIMEOUT_SECS", get("MIGRUN_STREAM_TIMEOUT_SECS"), 600)?;
        let handshake_retry_ms: u64 =
            parse_num("MIGRUN_HANDSHAKE_RETRY_MS", get("MIGRUN_HANDSHAKE_RETRY_MS"), 1000)?;
        let http_timeout_secs: u64 =
            parse_num("MIGRUN_HTTP_TIMEOUT_SECS", get("MIGRUN_HTTP_TIMEOUT_SECS"), 30)?;

        let cleanup = match get("MIGRUN_CLEANUP") {
            Some(value) => value.parse()?,
            None => CleanupPolicy::Auto,
        };

        Ok(Self {
            tool_url,
            discovery_url,
            script_name,
            cache_path,
            stream_timeout: Duration::from_secs(stream_timeout_secs),
            handshake_retry: Duration::from_millis(handshake_retry_ms),
            http_timeout: Duration::from_secs(http_timeout_secs),
            cleanup,
        })
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            timeout: self.stream_timeout,
            handshake_retry: self.handshake_retry,
        }
    }

    /// HTTP client with the configured request timeout.
    pub fn http_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder().timeout(self.http_timeout).build()
    }
}

/// Per-run inputs for the binary.
#[derive(Debug, Clone)]
pub struct RunInput {
    pub request: ExecutionRequest,
    pub force_refresh: bool,
    pub artifacts: Option<PathBuf>,
}

impl RunInput {
    /// Read the run request from the environment.
    ///
    /// `MIGRUN_PROFILE`, `MIGRUN_MODULE` and `MIGRUN_UUIDS` (comma or
    /// newline separated) are required; `MIGRUN_USE_CRUD`, `MIGRUN_ASYNC`,
    /// `MIGRUN_MIGRATE_DEPENDENTS` default to `N`.
    pub fn from_lookup<F>(lookup: F, script_name: &str) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let flag = |var: &'static str| -> Result<YesNo, ConfigError> {
            match get(var) {
                None => Ok(YesNo::No),
                Some(value) => YesNo::parse(&value).map_err(|e| ConfigError::Invalid {
                    var,
                    message: e.to_string(),
                }),
            }
        };

        let profile = get("MIGRUN_PROFILE").ok_or(ConfigError::Missing("MIGRUN_PROFILE"))?;
        let module = get("MIGRUN_MODULE").ok_or(ConfigError::Missing("MIGRUN_MODULE"))?;
        let module = ModuleName::parse(&module).map_err(|e| ConfigError::Invalid {
            var: "MIGRUN_MODULE",
            message: e.to_string(),
        })?;
        let uuids = get("MIGRUN_UUIDS").ok_or(ConfigError::Missing("MIGRUN_UUIDS"))?;

        let flags = ExecutionFlags {
            use_crud: flag("MIGRUN_USE_CRUD")?,
            is_async: flag("MIGRUN_ASYNC")?,
            migrate_dependents: flag("MIGRUN_MIGRATE_DEPENDENTS")?,
        };

        let request = ExecutionRequest::new(
            module,
            uuids
                .split([',', '\n'])
                .map(str::to_string)
                .collect::<Vec<_>>(),
            MigrationProfile::new(profile.trim()),
            flags,
            get("MIGRUN_MIGRATION_ID"),
            script_name,
        )
        .map_err(|e| ConfigError::Invalid {
            var: "run request",
            message: e.to_string(),
        })?;

        let force_refresh = match get("MIGRUN_FORCE_REFRESH") {
            Some(value) => YesNo::parse(&value).map_err(|e| ConfigError::Invalid {
                var: "MIGRUN_FORCE_REFRESH",
                message: e.to_string(),
            })? == YesNo::Yes,
            None => false,
        };

        Ok(Self {
            request,
            force_refresh,
            artifacts: get("MIGRUN_OUT").map(PathBuf::from),
        })
    }
}
