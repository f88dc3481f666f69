// src/lib.rs

pub mod cli;
pub mod command;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod gate;
pub mod logging;
pub mod progress;
pub mod report;

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use tracing::{error, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::{ConfigFile, JobConfig};
use crate::engine::{ExecutionResult, Orchestrator, RunContext, RunStatus};
use crate::errors::EngineError;
use crate::gate::FingerprintStore;
use crate::report::{HistoryEntry, HistoryStore, build_report};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - jobs-file loading and validation
/// - the dependency & change gate
/// - the per-job orchestrator
/// - delta reporting and the capped history store
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)?;
    let state_dir = PathBuf::from(&cfg.config.state_dir);

    let mut history = HistoryStore::load(&state_dir)?;

    if args.history {
        print_history(&history, args.job.as_deref(), args.history_limit);
        return Ok(());
    }

    if let Some(path) = &args.export_history {
        history.export_to_file(path)?;
        println!("exported {} history entries to {}", history.len(), path);
        return Ok(());
    }

    let mut fingerprints = FingerprintStore::load(&state_dir)?;

    let selected = select_jobs(&cfg, args.job.as_deref())?;
    let ctx = RunContext {
        tool_path: cfg.config.tool_path.clone(),
        dry_run: args.dry_run,
    };

    if ctx.dry_run {
        print_plan(&selected, &ctx);
    }

    let mut last_statuses = history.last_status_by_job();

    // Ctrl-C aborts the remaining jobs; in-flight subprocesses die with
    // their dropped handles (kill_on_drop).
    let mut shutdown = std::pin::pin!(tokio::signal::ctrl_c());

    for (job_id, job) in selected {
        let interrupted = tokio::select! {
            _ = &mut shutdown => true,
            _ = run_one_job(
                job_id,
                job,
                &ctx,
                &mut history,
                &mut fingerprints,
                &mut last_statuses,
            ) => false,
        };

        if interrupted {
            warn!(job = %job_id, "interrupted; aborting remaining jobs");
            persist_state(&ctx, &history, &fingerprints, &state_dir)?;
            return Err(EngineError::Cancelled.into());
        }
    }

    persist_state(&ctx, &history, &fingerprints, &state_dir)?;
    Ok(())
}

fn persist_state(
    ctx: &RunContext,
    history: &HistoryStore,
    fingerprints: &FingerprintStore,
    state_dir: &std::path::Path,
) -> Result<()> {
    if ctx.dry_run {
        return Ok(());
    }
    history.save(state_dir)?;
    fingerprints.save()?;
    Ok(())
}

async fn run_one_job(
    job_id: &str,
    job: &JobConfig,
    ctx: &RunContext,
    history: &mut HistoryStore,
    fingerprints: &mut FingerprintStore,
    last_statuses: &mut HashMap<String, RunStatus>,
) {
    let job_name = job.display_name(job_id);

    // Admission: dependency satisfaction. An unsatisfied job is simply not
    // attempted; it is not recorded as a failure.
    if let Err(err) = gate::check_dependencies(job, last_statuses).into_result() {
        info!(job = %job_id, error = %err, "job not admitted");
        println!("{job_id}: skipped ({err})");
        return;
    }

    // Admission: source-content change fingerprint.
    let stored = fingerprints
        .get(job_id)
        .or(job.last_source_fingerprint.as_deref());
    let (changed, current_fingerprint) = gate::has_source_changed(job, stored);

    let result = if changed {
        let orchestrator = Orchestrator::new();
        match orchestrator.run_job(job_id, job, ctx).await {
            Ok(result) => result,
            Err(err) => {
                error!(job = %job_id, error = %err, "job did not run");
                println!("{job_id}: error: {err}");
                return;
            }
        }
    } else {
        ExecutionResult::skipped(job_id)
    };

    let delta = build_report(job_id, &result.output);
    info!(
        job = %job_id,
        added = delta.files_added.len(),
        modified = delta.files_modified.len(),
        deleted = delta.files_deleted.len(),
        skipped = delta.files_skipped,
        "change delta"
    );

    print_result(job_id, &result);

    last_statuses.insert(job_id.to_string(), result.status);
    history.append(HistoryEntry::from_result(&result, &job_name));

    // A failed, partial or cancelled run must not advance the stored
    // fingerprint, or the next conditional run would skip work that never
    // happened.
    if !ctx.dry_run && matches!(result.status, RunStatus::Success | RunStatus::Skipped) {
        if let Some(fp) = current_fingerprint {
            fingerprints.set(job_id, fp);
        }
    }
}

fn select_jobs<'a>(
    cfg: &'a ConfigFile,
    only: Option<&'a str>,
) -> Result<Vec<(&'a str, &'a JobConfig)>> {
    match only {
        Some(id) => {
            let job = cfg
                .job
                .get(id)
                .ok_or_else(|| anyhow!("no job '{}' in jobs file", id))?;
            Ok(vec![(id, job)])
        }
        None => Ok(cfg.job.iter().map(|(id, job)| (id.as_str(), job)).collect()),
    }
}

fn print_plan(jobs: &[(&str, &JobConfig)], ctx: &RunContext) {
    println!("dry run: tool = {}", ctx.tool_path);
    for (job_id, job) in jobs {
        println!(
            "  {job_id}: {} source(s), mode {}, strategy {}",
            job.sources.len(),
            job.sync_mode,
            job.strategy
        );
        for dest in job.enabled_destinations() {
            println!("    -> {}", dest.path);
        }
    }
}

fn print_result(job_id: &str, result: &ExecutionResult) {
    println!(
        "{job_id}: {} ({} files, {} bytes, {}s)",
        result.status,
        result.files_transferred,
        result.bytes_transferred,
        result.duration_secs()
    );
    for err in &result.errors {
        println!("  error: {err}");
    }
}

fn print_history(history: &HistoryStore, job: Option<&str>, limit: usize) {
    if history.is_empty() {
        println!("no history recorded");
        return;
    }

    let entries = match job {
        Some(id) => history.for_job(id, limit),
        None => history.recent(limit),
    };

    for entry in entries {
        println!(
            "{}  {}  {}  {} files  {} bytes  {}s  {} errors",
            entry.timestamp,
            entry.job_id,
            entry.status,
            entry.files_transferred,
            entry.bytes_transferred,
            entry.duration_secs,
            entry.error_count
        );
    }
}
