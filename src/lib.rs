#![forbid(unsafe_code)]

//! Supervises headless coding-agent CLI processes, rebuilds structured turn
//! results from their `stream-json` output, and keeps conversation sessions
//! resumable across invocations.

pub mod config;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod stream;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
