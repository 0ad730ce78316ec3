//! # verse-cli
//!
//! The `verse-check` binary: load a verse corpus into a vector index, check
//! quotes from the command line, or serve checks over HTTP.
//!
//! ```text
//! verse-check --store qdrant load --corpus data/bible.json
//! verse-check --store qdrant check "For God so loved the world"
//! verse-check --store qdrant serve --bind 0.0.0.0:8000 --corpus data/bible.json
//! ```

pub mod cli;
pub mod commands;
pub mod server;
pub mod services;
pub mod telemetry;

pub use cli::Cli;
pub use server::{AppState, app_router, run_server};
