use std::error::Error;
use std::fs;
use tempfile::tempdir;

use syncjob::engine::RunStatus;
use syncjob::report::{HistoryEntry, HistoryStore, MAX_HISTORY_ENTRIES, build_report};

type TestResult = Result<(), Box<dyn Error>>;

fn entry(timestamp: u64, job_id: &str, status: RunStatus) -> HistoryEntry {
    HistoryEntry {
        timestamp,
        job_id: job_id.to_string(),
        job_name: job_id.to_string(),
        status,
        files_transferred: 3,
        bytes_transferred: 4096,
        duration_secs: 2,
        error_count: 0,
    }
}

#[test]
fn classifies_added_modified_and_deleted_lines() {
    let output = "\
sending incremental file list
>f+++++++++ docs/new.txt
>f.st...... docs/changed.txt
*deleting   docs/gone.txt
.f          docs/untouched.txt
sent 1,000 bytes  received 20 bytes  2,040.00 bytes/sec
";

    let report = build_report("job1", output);

    assert_eq!(report.job_id, "job1");
    assert_eq!(report.files_added, vec!["docs/new.txt"]);
    assert_eq!(report.files_modified, vec!["docs/changed.txt"]);
    assert_eq!(report.files_deleted, vec!["docs/gone.txt"]);
    assert_eq!(report.files_skipped, 1);
    assert_eq!(report.bytes_added, 1000);
    assert_eq!(report.total_changes(), 3);
}

#[test]
fn unknown_lines_are_ignored() {
    let output = "\
building file list ... done
cd+++++++++ docs/
total size is 12,345  speedup is 4.50
";
    let report = build_report("job1", output);
    assert_eq!(report.total_changes(), 0);
    assert_eq!(report.files_skipped, 0);
    assert_eq!(report.bytes_added, 0);
}

#[test]
fn paths_with_spaces_survive_classification() {
    let report = build_report("job1", ">f+++++++++ photos/summer trip 2024.jpg\n");
    assert_eq!(report.files_added, vec!["photos/summer trip 2024.jpg"]);
}

#[test]
fn sent_bytes_accumulate_across_batches() {
    let output = "sent 500 bytes  received 10 bytes\nsent 1,500 bytes  received 10 bytes\n";
    let report = build_report("job1", output);
    assert_eq!(report.bytes_added, 2000);
}

#[test]
fn history_cap_evicts_oldest_entries() {
    let mut store = HistoryStore::new();
    for i in 0..(MAX_HISTORY_ENTRIES as u64 + 50) {
        store.append(entry(i, "job1", RunStatus::Success));
    }

    assert_eq!(store.len(), MAX_HISTORY_ENTRIES);
    // The first 50 timestamps were evicted.
    assert_eq!(store.all().next().unwrap().timestamp, 50);
}

#[test]
fn for_job_is_most_recent_first_and_limited() {
    let mut store = HistoryStore::new();
    store.append(entry(1, "a", RunStatus::Success));
    store.append(entry(2, "b", RunStatus::Failed));
    store.append(entry(3, "a", RunStatus::PartialSuccess));
    store.append(entry(4, "a", RunStatus::Success));

    let runs = store.for_job("a", 2);
    let stamps: Vec<u64> = runs.iter().map(|e| e.timestamp).collect();
    assert_eq!(stamps, vec![4, 3]);
}

#[test]
fn within_window_filters_by_recency() {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut store = HistoryStore::new();
    store.append(entry(now.saturating_sub(7200), "old", RunStatus::Success));
    store.append(entry(now.saturating_sub(60), "fresh", RunStatus::Success));

    let recent = store.within_window(3600);
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].job_id, "fresh");

    assert_eq!(store.within_window(86_400).len(), 2);
}

#[test]
fn last_status_by_job_reflects_latest_run() {
    let mut store = HistoryStore::new();
    store.append(entry(1, "a", RunStatus::Failed));
    store.append(entry(2, "a", RunStatus::Success));
    store.append(entry(3, "b", RunStatus::Cancelled));

    let statuses = store.last_status_by_job();
    assert_eq!(statuses.get("a"), Some(&RunStatus::Success));
    assert_eq!(statuses.get("b"), Some(&RunStatus::Cancelled));
}

#[test]
fn export_has_fixed_header_and_one_line_per_entry() {
    let mut store = HistoryStore::new();
    store.append(entry(10, "a", RunStatus::Success));
    store.append(entry(20, "b", RunStatus::Failed));

    let csv = store.export_csv();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(
        lines[0],
        "Timestamp,JobId,JobName,Status,Files,Bytes,Duration,Errors"
    );
    assert!(lines[1].starts_with("10,a,a,success,"));
    assert!(lines[2].starts_with("20,b,b,failed,"));
}

#[test]
fn delimiters_in_names_are_sanitized() {
    let mut store = HistoryStore::new();
    let mut e = entry(10, "a", RunStatus::Success);
    e.job_name = "weird,name\nhere".to_string();
    store.append(e);

    let csv = store.export_csv();
    let line = csv.lines().nth(1).unwrap();
    assert_eq!(line.split(',').count(), 8);
    assert!(line.contains("weird_name_here"));
}

#[test]
fn save_and_load_roundtrip() -> TestResult {
    let dir = tempdir()?;
    let state = dir.path().join("state");

    let mut store = HistoryStore::new();
    store.append(entry(100, "nightly", RunStatus::Success));
    store.append(entry(200, "nightly", RunStatus::PartialSuccess));
    store.save(&state)?;

    let reloaded = HistoryStore::load(&state)?;
    assert_eq!(reloaded.len(), 2);

    let entries: Vec<&HistoryEntry> = reloaded.all().collect();
    assert_eq!(entries[0].timestamp, 100);
    assert_eq!(entries[0].status, RunStatus::Success);
    assert_eq!(entries[1].status, RunStatus::PartialSuccess);
    assert_eq!(entries[1].bytes_transferred, 4096);
    Ok(())
}

#[test]
fn malformed_history_lines_are_skipped_on_load() -> TestResult {
    let dir = tempdir()?;
    let state = dir.path().join("state");
    fs::create_dir_all(&state)?;
    fs::write(
        state.join("history"),
        "Timestamp,JobId,JobName,Status,Files,Bytes,Duration,Errors\n\
         100,a,a,success,1,2,3,0\n\
         not,a,valid,line\n\
         oops,a,a,success,1,2,3,0\n",
    )?;

    let store = HistoryStore::load(&state)?;
    assert_eq!(store.len(), 1);
    Ok(())
}

#[test]
fn missing_history_file_loads_empty() -> TestResult {
    let dir = tempdir()?;
    let store = HistoryStore::load(&dir.path().join("no-such-state"))?;
    assert!(store.is_empty());
    Ok(())
}
