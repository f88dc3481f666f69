// src/report/history.rs

use std::collections::{HashMap, VecDeque};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use tracing::debug;

use crate::engine::{ExecutionResult, RunStatus, unix_now};

/// Maximum retained entries; oldest dropped first, FIFO by insertion order.
pub const MAX_HISTORY_ENTRIES: usize = 1000;

const EXPORT_HEADER: &str = "Timestamp,JobId,JobName,Status,Files,Bytes,Duration,Errors";

/// Denormalized snapshot of one completed run, for fast listing without
/// reloading full job state.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub timestamp: u64,
    pub job_id: String,
    pub job_name: String,
    pub status: RunStatus,
    pub files_transferred: u64,
    pub bytes_transferred: u64,
    pub duration_secs: u64,
    pub error_count: usize,
}

impl HistoryEntry {
    /// Denormalize an execution result.
    pub fn from_result(result: &ExecutionResult, job_name: &str) -> Self {
        Self {
            timestamp: result.started_at,
            job_id: result.job_id.clone(),
            job_name: job_name.to_string(),
            status: result.status,
            files_transferred: result.files_transferred,
            bytes_transferred: result.bytes_transferred,
            duration_secs: result.duration_secs(),
            error_count: result.errors.len(),
        }
    }
}

/// Append-only, capped execution log.
#[derive(Debug, Default)]
pub struct HistoryStore {
    entries: VecDeque<HistoryEntry>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one record, evicting the oldest entries beyond the cap.
    pub fn append(&mut self, entry: HistoryEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > MAX_HISTORY_ENTRIES {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, oldest first.
    pub fn all(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Most-recent-first entries for one job, limited.
    pub fn for_job(&self, job_id: &str, limit: usize) -> Vec<&HistoryEntry> {
        self.entries
            .iter()
            .rev()
            .filter(|e| e.job_id == job_id)
            .take(limit)
            .collect()
    }

    /// Most-recent-first entries across all jobs, limited.
    pub fn recent(&self, limit: usize) -> Vec<&HistoryEntry> {
        self.entries.iter().rev().take(limit).collect()
    }

    /// Entries whose timestamp falls within the last `window_secs` seconds.
    pub fn within_window(&self, window_secs: u64) -> Vec<&HistoryEntry> {
        let cutoff = unix_now().saturating_sub(window_secs);
        self.entries
            .iter()
            .rev()
            .filter(|e| e.timestamp >= cutoff)
            .collect()
    }

    /// Last recorded status per job id, for the dependency gate.
    pub fn last_status_by_job(&self) -> HashMap<String, RunStatus> {
        let mut map = HashMap::new();
        for entry in self.entries.iter() {
            map.insert(entry.job_id.clone(), entry.status);
        }
        map
    }

    /// Flat delimited text table with fixed columns.
    pub fn export_csv(&self) -> String {
        let mut out = String::from(EXPORT_HEADER);
        out.push('\n');
        for entry in self.entries.iter() {
            out.push_str(&format_line(entry));
            out.push('\n');
        }
        out
    }

    /// Write the CSV export to a file.
    pub fn export_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.export_csv())
            .with_context(|| format!("writing history export to {:?}", path))
    }

    /// Load the store from `<state_dir>/history`; a missing file is an
    /// empty store. The on-disk format is the same delimited table as the
    /// export.
    pub fn load(state_dir: &Path) -> Result<Self> {
        let path = history_path(state_dir);
        let mut store = Self::new();

        if path.exists() {
            let file = File::open(&path)
                .with_context(|| format!("opening history store at {:?}", path))?;
            for line in BufReader::new(file).lines() {
                let line = line?;
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed == EXPORT_HEADER {
                    continue;
                }
                match parse_line(trimmed) {
                    Some(entry) => store.append(entry),
                    None => debug!(line = %trimmed, "skipping malformed history line"),
                }
            }
        }

        Ok(store)
    }

    /// Persist the store, creating the state directory if needed.
    pub fn save(&self, state_dir: &Path) -> Result<()> {
        let path = history_path(state_dir);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating state directory at {:?}", parent))?;
        }

        let file = File::create(&path)
            .with_context(|| format!("creating history store at {:?}", path))?;
        let mut writer = BufWriter::new(file);

        writeln!(writer, "{}", EXPORT_HEADER)?;
        for entry in self.entries.iter() {
            writeln!(writer, "{}", format_line(entry))?;
        }

        writer.flush()?;
        Ok(())
    }
}

fn history_path(state_dir: &Path) -> PathBuf {
    state_dir.join("history")
}

fn format_line(entry: &HistoryEntry) -> String {
    format!(
        "{},{},{},{},{},{},{},{}",
        entry.timestamp,
        sanitize_field(&entry.job_id),
        sanitize_field(&entry.job_name),
        entry.status,
        entry.files_transferred,
        entry.bytes_transferred,
        entry.duration_secs,
        entry.error_count
    )
}

// Field delimiters inside ids/names would corrupt the table.
fn sanitize_field(s: &str) -> String {
    s.replace([',', '\n'], "_")
}

fn parse_line(line: &str) -> Option<HistoryEntry> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != 8 {
        return None;
    }

    Some(HistoryEntry {
        timestamp: fields[0].parse().ok()?,
        job_id: fields[1].to_string(),
        job_name: fields[2].to_string(),
        status: RunStatus::from_str(fields[3]).ok()?,
        files_transferred: fields[4].parse().ok()?,
        bytes_transferred: fields[5].parse().ok()?,
        duration_secs: fields[6].parse().ok()?,
        error_count: fields[7].parse().ok()?,
    })
}
