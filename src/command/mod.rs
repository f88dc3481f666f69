// src/command/mod.rs

//! Pure argv construction for the external sync tool.

pub mod builder;

pub use builder::{build, build_for_sources, build_verify, sanitize_patterns};
