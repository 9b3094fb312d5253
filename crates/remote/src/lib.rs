//! HTTP and streaming client library for the remote migration tool.
//!
//! Provides the REST wrappers (bootstrap, start, cleanup, text fetch),
//! cookie normalisation, profile discovery by scraping the tool's frontend,
//! and the streaming channel client with its handshake state machine.

pub mod api;
pub mod client;
pub mod cookies;
pub mod discovery;
pub mod machine;
pub mod session;
