//! Streaming channel client for a remote tool instance.
//!
//! [`ToolStreamClient`] holds the base URL of one tool instance. Call
//! [`ToolStreamClient::connect`] to open the live output channel of an
//! execution as a [`ToolConnection`].

use reqwest::Url;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{COOKIE, ORIGIN, REFERER};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Path segments of the execution output channel, before the id.
pub const STREAM_PATH_SEGMENTS: [&str; 2] = ["executions", "io"];

/// Raw WebSocket stream type used for execution channels.
pub type ToolWsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Configuration handle for a tool instance's streaming endpoint.
pub struct ToolStreamClient {
    base_url: String,
}

/// A live streaming channel for one execution.
#[derive(Debug)]
pub struct ToolConnection {
    pub execution_id: String,
    /// The `ws://` / `wss://` URL that was opened.
    pub url: String,
    pub ws_stream: ToolWsStream,
}

/// Errors that can occur when opening a streaming channel.
#[derive(Debug, thiserror::Error)]
pub enum ToolClientError {
    /// The base URL has no HTTP(S) scheme to upgrade.
    #[error("Invalid tool URL: {0}")]
    InvalidUrl(String),

    /// A header value could not be encoded.
    #[error("Invalid header value for {name}: {message}")]
    InvalidHeader { name: &'static str, message: String },

    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),
}

/// Derive the channel URL: `http -> ws`, `https -> wss`, path
/// `/executions/io/<execution_id>` under the base path.
///
/// The id is escaped as a single path segment.
pub fn stream_url(base_url: &str, execution_id: &str) -> Result<String, ToolClientError> {
    let invalid = || ToolClientError::InvalidUrl(base_url.to_string());
    let mut url = Url::parse(base_url)
        .map_err(|e| ToolClientError::InvalidUrl(format!("{base_url}: {e}")))?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        _ => return Err(invalid()),
    };
    url.set_scheme(scheme).map_err(|_| invalid())?;
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|_| invalid())?
        .pop_if_empty()
        .extend(STREAM_PATH_SEGMENTS)
        .push(execution_id);
    Ok(url.into())
}

fn header_value(name: &'static str, value: &str) -> Result<HeaderValue, ToolClientError> {
    HeaderValue::from_str(value).map_err(|e| ToolClientError::InvalidHeader {
        name,
        message: e.to_string(),
    })
}

impl ToolStreamClient {
    /// * `base_url` - HTTP base URL of the tool, e.g. `https://host`.
    pub fn new(base_url: String) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self { base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Open the output channel for `execution_id`.
    ///
    /// Sends `Origin` and `Referer` set to the tool's base URL, plus the
    /// correlation cookie when one was issued at launch.
    pub async fn connect(
        &self,
        execution_id: &str,
        cookie: Option<&str>,
    ) -> Result<ToolConnection, ToolClientError> {
        let url = stream_url(&self.base_url, execution_id)?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ToolClientError::InvalidUrl(format!("{url}: {e}")))?;
        let headers = request.headers_mut();
        headers.insert(ORIGIN, header_value("Origin", &self.base_url)?);
        headers.insert(
            REFERER,
            header_value("Referer", &format!("{}/", self.base_url))?,
        );
        if let Some(cookie) = cookie {
            headers.insert(COOKIE, header_value("Cookie", cookie)?);
        }

        let (ws_stream, _response) = connect_async(request).await.map_err(|e| {
            ToolClientError::Connection(format!("Failed to open stream at {url}: {e}"))
        })?;

        tracing::info!(execution_id = %execution_id, url = %url, "Stream connected");

        Ok(ToolConnection {
            execution_id: execution_id.to_string(),
            url,
            ws_stream,
        })
    }
}
