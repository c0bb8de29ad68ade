//! Agent output stream: framing, frame schema, classification, tool
//! correlation and result aggregation.

pub mod aggregator;
pub mod classifier;
pub mod codec;
pub mod correlation;
pub mod frame;
pub mod reader;
