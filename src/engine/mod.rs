// src/engine/mod.rs

//! Orchestration engine: run combination types, the multi-destination
//! orchestrator, and the intra-job partitioner.

pub mod orchestrator;
pub mod partition;

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

pub use orchestrator::{Orchestrator, RunContext};
pub use partition::{PartitionBatch, enumerate_files, partition_files};

/// Combined status of an orchestrated run (or of one invocation unit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every attempted unit succeeded.
    Success,
    /// At least one unit succeeded and at least one did not.
    PartialSuccess,
    /// No unit succeeded.
    Failed,
    /// The run was terminated by user request.
    Cancelled,
    /// The change gate found an unchanged source fingerprint; nothing ran.
    Skipped,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Success => "success",
            RunStatus::PartialSuccess => "partial",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "success" => Ok(RunStatus::Success),
            "partial" | "partial_success" => Ok(RunStatus::PartialSuccess),
            "failed" => Ok(RunStatus::Failed),
            "cancelled" => Ok(RunStatus::Cancelled),
            "skipped" => Ok(RunStatus::Skipped),
            other => Err(format!("invalid run status: {other}")),
        }
    }
}

/// Result of one orchestrated run.
///
/// Created once per run, mutated by the orchestrator while merging
/// per-unit results, immutable once returned.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub id: String,
    pub job_id: String,
    pub started_at: u64,
    pub finished_at: u64,
    pub status: RunStatus,
    pub files_transferred: u64,
    pub bytes_transferred: u64,
    pub errors: Vec<String>,
    pub output: String,
}

impl ExecutionResult {
    /// Fresh result shell for a run starting now.
    pub fn begin(job_id: &str) -> Self {
        let now = unix_now();
        Self {
            id: format!("{job_id}-{now}-{}", std::process::id()),
            job_id: job_id.to_string(),
            started_at: now,
            finished_at: now,
            status: RunStatus::Failed,
            files_transferred: 0,
            bytes_transferred: 0,
            errors: Vec::new(),
            output: String::new(),
        }
    }

    /// Zero-transfer result for a run the change gate skipped.
    pub fn skipped(job_id: &str) -> Self {
        let mut result = Self::begin(job_id);
        result.status = RunStatus::Skipped;
        result.output = "skipped: source fingerprint unchanged\n".to_string();
        result
    }

    pub fn duration_secs(&self) -> u64 {
        self.finished_at.saturating_sub(self.started_at)
    }
}

/// Seconds since the unix epoch; clock-before-epoch degenerates to 0.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
