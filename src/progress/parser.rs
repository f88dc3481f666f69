// src/progress/parser.rs

use regex::Regex;
use tracing::trace;

/// Upper bound on a line we are willing to treat as a file name.
const MAX_FILE_LINE_LEN: usize = 512;

/// Boilerplate prefixes that are never file-transfer lines.
const BOILERPLATE_PREFIXES: &[&str] = &[
    "sending incremental file list",
    "receiving incremental file list",
    "building file list",
    "created directory",
    "deleting ",
    "sent ",
    "total size",
    "Number of",
    "Total ",
    "Literal data",
    "Matched data",
    "File list",
    "Unmatched data",
    "rsync:",
    "rsync error:",
];

/// Last decoded state of a streamed run.
///
/// Transient: regenerated on every parsed chunk, with the previous value
/// carried forward for anything the chunk did not mention.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSnapshot {
    pub current_file: String,
    pub files_completed: u64,
    pub total_files: u64,
    pub bytes_transferred: u64,
    pub total_bytes: u64,
    pub current_file_percent: f64,
    pub overall_percent: f64,
    pub speed_bytes_per_sec: f64,
    pub eta_seconds: u64,
}

/// Stateful line-oriented decoder of the tool's progress grammar.
///
/// Never fails: malformed lines are ignored and the previous snapshot
/// carries forward. The grammar it understands:
///
/// - a whitespace-delimited token ending in `%` (current-file percentage)
/// - `to-check=<remaining>/<total>` (overall percentage, file counts)
/// - a rate token with a byte-unit-plus-`/s` suffix (transfer speed)
/// - an `H:MM:SS` or `MM:SS` token (ETA)
/// - any other short non-boilerplate line (current file name)
pub struct ProgressParser {
    snapshot: ProgressSnapshot,
    to_check_re: Regex,
    speed_re: Regex,
    eta_re: Regex,
}

impl Default for ProgressParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressParser {
    pub fn new() -> Self {
        // The patterns are fixed strings, so compilation cannot fail.
        Self {
            snapshot: ProgressSnapshot::default(),
            to_check_re: Regex::new(r"to-check=(\d+)/(\d+)").unwrap(),
            speed_re: Regex::new(r"([0-9][0-9.,]*)\s*([KMG]?B)/s").unwrap(),
            eta_re: Regex::new(r"(?:(\d+):)?(\d{1,2}):(\d{2})").unwrap(),
        }
    }

    /// Current snapshot (last value retained between lines).
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.snapshot.clone()
    }

    /// Feed one chunk of stdout text. Carriage returns from in-place
    /// progress updates are treated as line separators, so a CR-chained
    /// chunk resolves to its last update.
    pub fn feed(&mut self, chunk: &str) {
        for line in chunk.split(['\n', '\r']) {
            self.feed_line(line);
        }
    }

    /// Decode a single line, updating the snapshot.
    pub fn feed_line(&mut self, line: &str) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }

        if trimmed.contains('%') {
            self.parse_progress_line(trimmed);
        } else if looks_like_file_line(trimmed) {
            self.snapshot.current_file = file_name_from_line(trimmed);
            trace!(file = %self.snapshot.current_file, "current file updated");
        }
    }

    fn parse_progress_line(&mut self, line: &str) {
        // First token ending in '%' is the current-file percentage; a
        // malformed number defaults to 0 rather than being an error.
        if let Some(token) = line.split_whitespace().find(|t| t.ends_with('%')) {
            self.snapshot.current_file_percent = token
                .trim_end_matches('%')
                .parse::<f64>()
                .unwrap_or(0.0);
        }

        // Leading digit-group token is the bytes transferred so far for the
        // current file (rsync prints thousands separators).
        if let Some(first) = line.split_whitespace().next() {
            let digits: String = first.chars().filter(|c| c.is_ascii_digit()).collect();
            if !digits.is_empty() && first.chars().all(|c| c.is_ascii_digit() || c == ',') {
                if let Ok(bytes) = digits.parse::<u64>() {
                    self.snapshot.bytes_transferred = bytes;
                }
            }
        }

        // `to-check=R/T` only moves the overall percentage when T > 0;
        // malformed or zero totals retain the previous value.
        if let Some(caps) = self.to_check_re.captures(line) {
            let remaining: u64 = caps[1].parse().unwrap_or(0);
            let total: u64 = caps[2].parse().unwrap_or(0);
            if total > 0 && remaining <= total {
                let done = total - remaining;
                self.snapshot.files_completed = done;
                self.snapshot.total_files = total;
                self.snapshot.overall_percent = done as f64 / total as f64 * 100.0;
            }
        }

        if let Some(caps) = self.speed_re.captures(line) {
            let value: f64 = caps[1].replace(',', "").parse().unwrap_or(0.0);
            self.snapshot.speed_bytes_per_sec = value * unit_multiplier(&caps[2]);
        }

        if let Some(caps) = self.eta_re.captures(line) {
            let hours: u64 = caps
                .get(1)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0);
            let minutes: u64 = caps[2].parse().unwrap_or(0);
            let seconds: u64 = caps[3].parse().unwrap_or(0);
            self.snapshot.eta_seconds = hours * 3600 + minutes * 60 + seconds;
        }
    }
}

fn unit_multiplier(unit: &str) -> f64 {
    match unit {
        "B" => 1.0,
        "KB" => 1024.0,
        "MB" => 1024.0 * 1024.0,
        "GB" => 1024.0 * 1024.0 * 1024.0,
        _ => 1.0,
    }
}

fn looks_like_file_line(line: &str) -> bool {
    if line.len() > MAX_FILE_LINE_LEN {
        return false;
    }
    !BOILERPLATE_PREFIXES
        .iter()
        .any(|prefix| line.starts_with(prefix))
}

/// Itemized-change lines carry the path after the change marker; plain
/// file-list lines are the path itself.
fn file_name_from_line(line: &str) -> String {
    let mut tokens = line.split_whitespace();
    match tokens.next() {
        Some(first) if is_itemize_marker(first) => {
            let rest: Vec<&str> = tokens.collect();
            if rest.is_empty() {
                line.to_string()
            } else {
                rest.join(" ")
            }
        }
        _ => line.to_string(),
    }
}

fn is_itemize_marker(token: &str) -> bool {
    if token.len() < 9 {
        return false;
    }
    let mut chars = token.chars();
    let kind = chars.next().unwrap_or(' ');
    let ftype = chars.next().unwrap_or(' ');
    matches!(kind, '<' | '>' | 'c' | 'h' | '.' | '*')
        && matches!(ftype, 'f' | 'd' | 'L' | 'D' | 'S')
}
