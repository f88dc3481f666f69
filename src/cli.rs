// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `syncjob`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "syncjob",
    version,
    about = "Run file-synchronization jobs by driving an rsync-compatible tool.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the jobs file (TOML).
    ///
    /// Default: `Syncjob.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Syncjob.toml")]
    pub config: String,

    /// Run only the job with this id. Without this flag, every job in the
    /// file is run in declaration order. With --history, limits the listing
    /// to this job.
    #[arg(long, value_name = "ID")]
    pub job: Option<String>,

    /// Pass the dry-run flag through to the external tool: the full plan is
    /// executed but no file is written. Hooks and the verification pass are
    /// skipped.
    #[arg(long)]
    pub dry_run: bool,

    /// Print recent run history instead of executing anything.
    #[arg(long)]
    pub history: bool,

    /// Maximum number of history entries printed with --history.
    #[arg(long, value_name = "N", default_value_t = 20)]
    pub history_limit: usize,

    /// Export the full run history as CSV to the given path and exit.
    #[arg(long, value_name = "PATH")]
    pub export_history: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SYNCJOB_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(lvl: LogLevel) -> Self {
        match lvl {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
