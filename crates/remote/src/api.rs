//! REST client for the remote migration tool's HTTP endpoints.
//!
//! Wraps session bootstrap, execution start, execution cleanup, and plain
//! text document fetches using [`reqwest`].

use migrun_core::execution::{CleanupResult, ExecutionHandle, ExecutionRequest};
use reqwest::header::{COOKIE, ORIGIN, REFERER};

use crate::cookies::CookieJar;

/// Path of the execution start endpoint.
pub const START_PATH: &str = "/executions/start";

/// Path prefix of the execution cleanup endpoint.
pub const CLEANUP_PATH: &str = "/executions/cleanup";

/// HTTP client for a single remote tool instance.
pub struct ToolApi {
    client: reqwest::Client,
    base_url: String,
}

/// Errors from the remote tool REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ToolApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// A fetched document came back with a non-2xx status code.
    #[error("Remote tool error ({status}) for {url}: {body}")]
    ApiError {
        url: String,
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The start endpoint rejected the execution request.
    #[error("Execution start failed ({status}): {body}")]
    StartFailed { status: u16, body: String },

    /// The start endpoint answered 2xx with an empty body.
    #[error("Execution start returned no execution id (status {status})")]
    ExecutionIdMissing { status: u16, body: String },

    /// A URL could not be built or parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ToolApi {
    /// Create a new API client for a tool instance.
    ///
    /// * `base_url` - Base HTTP URL, e.g. `https://migrate.example.com`.
    pub fn new(base_url: String) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// (carries timeouts and connection pooling configured by the caller).
    pub fn with_client(client: reqwest::Client, base_url: String) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// Base URL without a trailing slash. Also used as `Origin`/`Referer`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Collect any session cookies the tool issues on its landing page.
    ///
    /// Best-effort: failures are logged and yield an empty jar.
    pub async fn bootstrap_cookies(&self) -> CookieJar {
        let mut jar = CookieJar::new();
        match self.client.get(format!("{}/", self.base_url)).send().await {
            Ok(response) => {
                jar.absorb_headers(response.headers());
                tracing::debug!(
                    status = response.status().as_u16(),
                    has_cookie = !jar.is_empty(),
                    "Bootstrap request completed",
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "Bootstrap request failed, continuing without cookies");
            }
        }
        jar
    }

    /// Bootstrap a session, then start an execution.
    pub async fn start(&self, request: &ExecutionRequest) -> Result<ExecutionHandle, ToolApiError> {
        let jar = self.bootstrap_cookies().await;
        self.start_execution(request, jar).await
    }

    /// Submit the execution request as a form-encoded `POST /executions/start`.
    ///
    /// Cookies returned by the start response are merged into `jar`; the
    /// merged header becomes the handle's correlation cookie. The trimmed
    /// response body is the execution id.
    pub async fn start_execution(
        &self,
        request: &ExecutionRequest,
        mut jar: CookieJar,
    ) -> Result<ExecutionHandle, ToolApiError> {
        let fields = request.form_fields();

        let mut builder = self
            .client
            .post(format!("{}{START_PATH}", self.base_url))
            .header(ORIGIN, &self.base_url)
            .header(REFERER, format!("{}/", self.base_url))
            .form(&fields);
        if let Some(cookie) = jar.header_value() {
            builder = builder.header(COOKIE, cookie);
        }

        let response = builder.send().await?;
        let status = response.status();
        jar.absorb_headers(response.headers());
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());

        if !status.is_success() {
            return Err(ToolApiError::StartFailed {
                status: status.as_u16(),
                body,
            });
        }

        let execution_id = body.trim().to_string();
        if execution_id.is_empty() {
            return Err(ToolApiError::ExecutionIdMissing {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(
            execution_id = %execution_id,
            profile = %request.profile(),
            module = %request.module(),
            entities = request.entity_ids().len(),
            "Execution started",
        );

        Ok(ExecutionHandle {
            execution_id,
            http_status: status.as_u16(),
            raw_body: body,
            correlation_cookie: jar.header_value(),
        })
    }

    /// Ask the tool to release an execution's resources.
    ///
    /// Never fails: transport errors are captured in the result. The
    /// response status alone decides `ok`.
    pub async fn cleanup(&self, execution_id: &str, cookie: Option<&str>) -> CleanupResult {
        let mut builder = self
            .client
            .post(format!("{}{CLEANUP_PATH}/{execution_id}", self.base_url))
            .header(ORIGIN, &self.base_url)
            .header(REFERER, format!("{}/", self.base_url));
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }

        match builder.send().await {
            Ok(response) => {
                let status = response.status();
                CleanupResult {
                    ok: status.is_success(),
                    status: Some(status.as_u16()),
                    error: (!status.is_success())
                        .then(|| format!("Cleanup returned HTTP {}", status.as_u16())),
                }
            }
            Err(e) => CleanupResult {
                ok: false,
                status: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// Fetch a document as text, failing on non-2xx.
    pub async fn fetch_text(&self, url: &str) -> Result<String, ToolApiError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ToolApiError::ApiError {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalised() {
        let api = ToolApi::new("https://tool.test/".into());
        assert_eq!(api.base_url(), "https://tool.test");
    }

    #[test]
    fn error_messages() {
        let err = ToolApiError::StartFailed {
            status: 500,
            body: "boom".into(),
        };
        assert_eq!(err.to_string(), "Execution start failed (500): boom");

        let err = ToolApiError::ExecutionIdMissing {
            status: 200,
            body: "  ".into(),
        };
        assert_eq!(
            err.to_string(),
            "Execution start returned no execution id (status 200)"
        );
    }
}
