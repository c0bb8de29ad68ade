//! Domain model module declarations.

pub mod execution;
pub mod session;
pub mod update;
