#![allow(dead_code)]

//! In-process stand-in for the remote migration tool.
//!
//! One axum router serves the landing page, the frontend index, the start
//! and cleanup endpoints, and the execution output channel, so the
//! orchestrator can be pointed at a single base URL.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{AppendHeaders, IntoResponse};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;

use migrun_core::execution::{ExecutionFlags, ExecutionRequest, ModuleName, YesNo};
use migrun_core::profile::MigrationProfile;
use migrun_remote::api::ToolApi;
use migrun_remote::session::StreamConfig;
use migrun_runner::cache::MemoryCacheStore;
use migrun_runner::orchestrator::Orchestrator;
use migrun_runner::resolver::{HttpProfileDiscovery, ProfileResolver};

pub const EXECUTION_ID: &str = "exec-42";
pub const ENTITY_ID: &str = "6a1f0c2e-3b4d-4e5f-8a9b-0c1d2e3f4a5b";

pub const INDEX_HTML: &str = r#"<html><head><script src="/static/app.js"></script></head></html>"#;
pub const APP_JS: &str = r#"const PROFILES=["devncdns_qancdns","qancdns_uatncdns"];"#;

/// How the fake tool behaves for one test.
#[derive(Debug, Clone)]
pub struct Script {
    pub start_status: StatusCode,
    pub start_body: &'static str,
    /// Frames sent after the handshake, followed by a normal close.
    pub frames: Vec<&'static str>,
    /// Never answer; keep reading until the client leaves.
    pub silent: bool,
    /// Hold the start response after the request is counted.
    pub start_delay: Option<Duration>,
    /// Hold the channel upgrade response.
    pub upgrade_delay: Option<Duration>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            start_status: StatusCode::OK,
            start_body: EXECUTION_ID,
            frames: Vec::new(),
            silent: false,
            start_delay: None,
            upgrade_delay: None,
        }
    }
}

/// What the fake tool observed.
#[derive(Debug, Default)]
pub struct Seen {
    pub start_calls: usize,
    pub stream_path_id: Option<String>,
    pub stream_cookie: Option<String>,
    pub received: Vec<String>,
    pub cleanup: Vec<String>,
}

#[derive(Clone)]
struct ToolState {
    script: Arc<Script>,
    seen: Arc<Mutex<Seen>>,
}

fn header(headers: &HeaderMap, name: axum::http::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn record_received(seen: &Mutex<Seen>, text: &str) {
    seen.lock().unwrap().received.push(text.to_string());
}

async fn start(State(state): State<ToolState>) -> impl IntoResponse {
    state.seen.lock().unwrap().start_calls += 1;
    if let Some(delay) = state.script.start_delay {
        tokio::time::sleep(delay).await;
    }
    (
        state.script.start_status,
        AppendHeaders([(SET_COOKIE, "session=started; Path=/")]),
        state.script.start_body,
    )
}

async fn cleanup(State(state): State<ToolState>, Path(id): Path<String>) -> StatusCode {
    state.seen.lock().unwrap().cleanup.push(id);
    StatusCode::OK
}

async fn stream(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    State(state): State<ToolState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    {
        let mut seen = state.seen.lock().unwrap();
        seen.stream_path_id = Some(id);
        seen.stream_cookie = header(&headers, COOKIE);
    }
    if let Some(delay) = state.script.upgrade_delay {
        tokio::time::sleep(delay).await;
    }
    ws.on_upgrade(move |socket| play(socket, state))
}

async fn play(mut socket: WebSocket, state: ToolState) {
    for _ in 0..2 {
        match socket.recv().await {
            Some(Ok(Message::Text(text))) => record_received(&state.seen, text.as_str()),
            _ => return,
        }
    }

    if state.script.silent {
        while let Some(Ok(msg)) = socket.recv().await {
            if let Message::Text(text) = msg {
                record_received(&state.seen, text.as_str());
            }
        }
        return;
    }

    for frame in &state.script.frames {
        if socket.send(Message::Text((*frame).into())).await.is_err() {
            return;
        }
    }
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::NORMAL,
            reason: "done".into(),
        })))
        .await;
    while let Some(Ok(_)) = socket.recv().await {}
}

/// Serve the fake tool and return its base URL plus the observation log.
pub async fn spawn_tool(script: Script) -> (String, Arc<Mutex<Seen>>) {
    let seen = Arc::new(Mutex::new(Seen::default()));
    let state = ToolState {
        script: Arc::new(script),
        seen: Arc::clone(&seen),
    };

    let app = Router::new()
        .route(
            "/",
            get(|| async { (AppendHeaders([(SET_COOKIE, "session=boot; Path=/")]), "tool") }),
        )
        .route("/index.html", get(|| async { INDEX_HTML }))
        .route("/static/app.js", get(|| async { APP_JS }))
        .route("/executions/start", post(start))
        .route("/executions/cleanup/{id}", post(cleanup))
        .route("/executions/io/{id}", get(stream))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), seen)
}

pub fn orchestrator(base_url: &str, stream_config: StreamConfig) -> Orchestrator {
    let api = Arc::new(ToolApi::new(base_url.to_string()));
    let discovery = Arc::new(HttpProfileDiscovery::new(
        Arc::clone(&api),
        format!("{base_url}/index.html"),
    ));
    let resolver = ProfileResolver::new(discovery, Arc::new(MemoryCacheStore::new()));
    Orchestrator::new(api, resolver, stream_config)
}

pub fn stream_config(timeout_ms: u64, retry_ms: u64) -> StreamConfig {
    StreamConfig {
        timeout: Duration::from_millis(timeout_ms),
        handshake_retry: Duration::from_millis(retry_ms),
    }
}

pub fn request(profile: &str) -> ExecutionRequest {
    ExecutionRequest::new(
        ModuleName::Pd,
        vec![ENTITY_ID.to_string()],
        MigrationProfile::from(profile),
        ExecutionFlags {
            use_crud: YesNo::Yes,
            is_async: YesNo::No,
            migrate_dependents: YesNo::No,
        },
        None,
        "Entity Migration",
    )
    .unwrap()
}
