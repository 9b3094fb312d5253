//! Orchestration for remote migration runs.
//!
//! Ties profile resolution, execution launch, output streaming, parsing,
//! cleanup and artifact persistence into a single [`Orchestrator::run`]
//! call.
//!
//! [`Orchestrator::run`]: orchestrator::Orchestrator::run

pub mod artifacts;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod resolver;
