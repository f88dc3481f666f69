// src/report/delta.rs

use regex::Regex;

/// Itemized-output marker for a file that is new in every attribute.
const ADDED_MARKER: &str = ">f+++++++++";
/// Any other received-file itemized line is a size-or-time style change.
const RECEIVED_FILE_PREFIX: &str = ">f";
/// The tool's deletion-announcement prefix.
const DELETED_PREFIX: &str = "*deleting";
/// Itemized marker for a file checked but left untouched.
const SKIPPED_PREFIX: &str = ".f";

/// Classified change delta of one run.
///
/// Byte accounting is not split by category: the `sent N bytes` summary
/// total is credited to `bytes_added` regardless of what changed. This
/// mirrors a known limitation of the report consumers already rely on.
#[derive(Debug, Clone, Default)]
pub struct DeltaReport {
    pub job_id: String,
    pub files_added: Vec<String>,
    pub files_modified: Vec<String>,
    pub files_deleted: Vec<String>,
    pub bytes_added: u64,
    pub bytes_modified: u64,
    pub bytes_deleted: u64,
    pub files_skipped: u64,
}

impl DeltaReport {
    pub fn total_changes(&self) -> usize {
        self.files_added.len() + self.files_modified.len() + self.files_deleted.len()
    }
}

/// Scan the combined captured output of an itemized run and classify each
/// change line. Lines that match no known shape are ignored.
pub fn build_report(job_id: &str, output: &str) -> DeltaReport {
    let sent_re = Regex::new(r"^sent\s+([\d,]+)\s+bytes").unwrap();

    let mut report = DeltaReport {
        job_id: job_id.to_string(),
        ..DeltaReport::default()
    };

    for line in output.lines() {
        let line = line.trim_end();

        if let Some(path) = path_after_marker(line, ADDED_MARKER) {
            report.files_added.push(path);
        } else if let Some(path) = path_after_marker(line, DELETED_PREFIX) {
            report.files_deleted.push(path);
        } else if line.starts_with(RECEIVED_FILE_PREFIX) {
            if let Some(path) = path_after_first_token(line) {
                report.files_modified.push(path);
            }
        } else if line.starts_with(SKIPPED_PREFIX) {
            report.files_skipped += 1;
        } else if let Some(caps) = sent_re.captures(line.trim_start()) {
            let bytes: u64 = caps[1].replace(',', "").parse().unwrap_or(0);
            report.bytes_added += bytes;
        }
    }

    report
}

fn path_after_marker(line: &str, marker: &str) -> Option<String> {
    let rest = line.strip_prefix(marker)?.trim();
    if rest.is_empty() {
        None
    } else {
        Some(rest.to_string())
    }
}

fn path_after_first_token(line: &str) -> Option<String> {
    let mut tokens = line.split_whitespace();
    tokens.next()?;
    let rest: Vec<&str> = tokens.collect();
    if rest.is_empty() {
        None
    } else {
        Some(rest.join(" "))
    }
}
