// src/logging.rs

//! Tracing subscriber installation for the syncjob binary.

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;

/// Install the global subscriber. Level resolution order: the `--log-level`
/// flag, the `SYNCJOB_LOG` environment variable, then `info`.
///
/// Call at most once; installing a second subscriber panics.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let level = cli_level
        .map(Level::from)
        .or_else(env_level)
        .unwrap_or(Level::INFO);

    fmt().with_max_level(level).with_target(true).init();
    Ok(())
}

fn env_level() -> Option<Level> {
    let raw = std::env::var("SYNCJOB_LOG").ok()?;
    match raw.trim().to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        other => {
            eprintln!("unrecognised SYNCJOB_LOG level '{other}', using info");
            Some(Level::INFO)
        }
    }
}
