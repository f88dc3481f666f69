// src/errors.rs

//! Engine error taxonomy.
//!
//! Expected per-destination and per-batch failures never surface here; they
//! are folded into the combined run status by the orchestrator. These
//! variants cover the cases raised to the caller *before* any subprocess is
//! spawned, plus re-entrant and cancellation signals.

use thiserror::Error;

pub use anyhow::Result;

/// All errors the sync engine can raise past the orchestrator boundary.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A run was requested while a prior run on the same instance had not
    /// completed.
    #[error("a sync run is already in progress")]
    AlreadyRunning,

    /// The job has no usable sources or no enabled destination.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The external tool could not be spawned at all.
    #[error("failed to execute sync tool: {source}")]
    ExecutionFailed {
        #[source]
        source: std::io::Error,
    },

    /// The run was terminated by user request.
    #[error("sync run was cancelled")]
    Cancelled,

    /// The job's dependency admission check did not pass.
    #[error("dependencies unsatisfied: {}", .0.join("; "))]
    DependencyUnsatisfied(Vec<String>),
}
