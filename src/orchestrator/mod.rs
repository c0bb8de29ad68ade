//! Execution orchestration.
//!
//! Covers agent command construction, process supervision, exit
//! classification, live update delivery, session lifecycle management and
//! the relay facade tying them together.

pub mod command;
pub mod exit;
pub mod relay;
pub mod session_manager;
pub mod sink;
pub mod supervisor;
