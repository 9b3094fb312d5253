//! Domain types and pure text processing for remote migration runs.
//!
//! Nothing in this crate performs I/O: profile extraction, request
//! validation, stream frame normalisation, and console output parsing are
//! all plain functions so they can be exercised with literal fixtures.

pub mod error;
pub mod execution;
pub mod output;
pub mod profile;
pub mod report;
pub mod stream;
pub mod types;
