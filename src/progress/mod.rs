// src/progress/mod.rs

//! Real-time decoding of the tool's streamed progress output.

pub mod parser;

pub use parser::{ProgressParser, ProgressSnapshot};
