// src/exec/hooks.rs

use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::engine::RunStatus;

/// Key/value entries handed to a hook command as environment variables.
#[derive(Debug, Clone)]
pub struct HookEnv {
    pub job_name: String,
    pub status: String,
    pub files_transferred: u64,
}

impl HookEnv {
    /// Environment for the pre-hook, before any destination is attempted.
    pub fn started(job_name: &str) -> Self {
        Self {
            job_name: job_name.to_string(),
            status: "started".to_string(),
            files_transferred: 0,
        }
    }

    /// Environment for the post-hook, carrying the final combined status.
    pub fn finished(job_name: &str, status: RunStatus, files_transferred: u64) -> Self {
        Self {
            job_name: job_name.to_string(),
            status: status.to_string(),
            files_transferred,
        }
    }
}

/// Run a pre/post hook command through the platform shell.
///
/// A non-zero exit is reported as an error to the caller but never aborts
/// the surrounding run; the orchestrator records it in the error list.
pub async fn run_hook(command: &str, env: &HookEnv) -> Result<()> {
    info!(command = %command, status = %env.status, "running hook");

    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command);
        c
    };

    cmd.env("SYNCJOB_JOB_NAME", &env.job_name)
        .env("SYNCJOB_STATUS", &env.status)
        .env("SYNCJOB_FILES", env.files_transferred.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    let output = cmd
        .output()
        .await
        .with_context(|| format!("spawning hook command '{command}'"))?;

    if output.status.success() {
        debug!(command = %command, "hook completed");
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(
            command = %command,
            exit_code = output.status.code().unwrap_or(-1),
            "hook failed"
        );
        anyhow::bail!(
            "hook '{}' exited with code {}: {}",
            command,
            output.status.code().unwrap_or(-1),
            stderr.trim()
        )
    }
}
