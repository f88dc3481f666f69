// src/engine/orchestrator.rs

use std::sync::atomic::{AtomicBool, Ordering};

use tempfile::NamedTempFile;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::command;
use crate::config::model::{
    Destination, ExecutionStrategy, FailurePolicy, JobConfig, SyncMode,
};
use crate::config::validate::validate_job;
use crate::engine::partition::build_partition_units;
use crate::engine::{ExecutionResult, RunStatus, unix_now};
use crate::errors::EngineError;
use crate::exec::hooks::{self, HookEnv};
use crate::exec::supervisor::ProcessSupervisor;

/// Per-run environment shared by all invocations of a job.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Resolved path (or bare name) of the external tool binary.
    pub tool_path: String,
    /// Pass the dry-run flag through to every invocation; hooks and the
    /// verification pass are skipped.
    pub dry_run: bool,
}

/// One planned tool invocation: a destination (or a batch of a
/// destination) with its fully built argv.
pub(crate) struct InvocationUnit {
    pub label: String,
    pub argv: Vec<String>,
    /// Keeps a batch file list alive for the lifetime of the invocation.
    pub file_list: Option<NamedTempFile>,
}

/// Result of one executed unit, reduced to what the merge rule needs.
struct UnitResult {
    label: String,
    status: RunStatus,
    files: u64,
    bytes: u64,
    output: String,
    error: Option<String>,
}

/// Everything the dispatch phase produced for the merge rule.
struct DispatchResults {
    units: Vec<UnitResult>,
    /// Synthetic error appended when the Stop policy halted iteration.
    stopped_error: Option<String>,
}

/// Drives all invocations of one job: sync-mode expansion, sequential or
/// bounded-parallel dispatch, failure policy, hooks, verification pass, and
/// the per-unit merge rule.
///
/// One orchestrator instance guards one job: re-entrant `run_job` calls fail
/// with `AlreadyRunning`. There is no cross-job lock; the dependency gate is
/// an admission check, not a mutual-exclusion mechanism.
pub struct Orchestrator {
    running: AtomicBool,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
        }
    }

    /// Execute the whole job and return the combined result.
    ///
    /// Only configuration and admission errors are raised; per-destination
    /// and per-batch failures are folded into the combined status.
    pub async fn run_job(
        &self,
        job_id: &str,
        job: &JobConfig,
        ctx: &RunContext,
    ) -> Result<ExecutionResult, EngineError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::AlreadyRunning);
        }

        let result = self.run_job_inner(job_id, job, ctx).await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn run_job_inner(
        &self,
        job_id: &str,
        job: &JobConfig,
        ctx: &RunContext,
    ) -> Result<ExecutionResult, EngineError> {
        validate_job(job_id, job)?;

        let job_name = job.display_name(job_id);
        let mut result = ExecutionResult::begin(job_id);

        info!(
            job = %job_id,
            mode = %job.sync_mode,
            strategy = %job.strategy,
            dry_run = ctx.dry_run,
            "starting sync run"
        );

        if !ctx.dry_run {
            if let Some(cmd) = &job.pre_hook {
                if let Err(err) = hooks::run_hook(cmd, &HookEnv::started(&job_name)).await {
                    result.errors.push(format!("pre-hook: {err}"));
                }
            }
        }

        let (units, strategy) = plan_units(job_id, job, ctx);
        let policy = job.effective_failure_policy();

        let unit_results = match strategy {
            ExecutionStrategy::Sequential => run_sequential(units, policy).await,
            ExecutionStrategy::Parallel(limit) => run_parallel(units, limit).await,
        };

        merge_unit_results(&mut result, unit_results);

        if job.verify_after_sync && !ctx.dry_run && result.status != RunStatus::Failed {
            self.run_verification(job, ctx, &mut result).await;
        }

        if !ctx.dry_run {
            if let Some(cmd) = &job.post_hook {
                let env = HookEnv::finished(&job_name, result.status, result.files_transferred);
                if let Err(err) = hooks::run_hook(cmd, &env).await {
                    result.errors.push(format!("post-hook: {err}"));
                }
            }
        }

        result.finished_at = unix_now();

        info!(
            job = %job_id,
            status = %result.status,
            files = result.files_transferred,
            bytes = result.bytes_transferred,
            errors = result.errors.len(),
            "sync run finished"
        );

        Ok(result)
    }

    /// Checksum-forced dry pass per destination; appends verification output
    /// to the combined log and never alters counts or status.
    async fn run_verification(&self, job: &JobConfig, ctx: &RunContext, result: &mut ExecutionResult) {
        for dest in job.enabled_destinations() {
            let argv = command::build_verify(job, dest, &ctx.tool_path);
            let supervisor = ProcessSupervisor::new();
            match supervisor.run(&argv).await {
                Ok(outcome) => {
                    result.output.push_str(&format!("=== verify {} ===\n", dest.path));
                    result.output.push_str(&outcome.stdout);
                    result.output.push_str(&outcome.stderr);
                }
                Err(err) => {
                    warn!(destination = %dest.path, error = %err, "verification pass failed to run");
                }
            }
        }
    }
}

/// Expand the job into invocation units per its sync mode (or into
/// partition batches when intra-job parallelism is enabled), along with the
/// dispatch strategy to run them under.
fn plan_units(
    job_id: &str,
    job: &JobConfig,
    ctx: &RunContext,
) -> (Vec<InvocationUnit>, ExecutionStrategy) {
    if let Some(par) = &job.parallelism {
        if par.enabled {
            match build_partition_units(job, ctx, par) {
                Ok(units) if !units.is_empty() => {
                    // Batches run under the same bounded-pool pattern as
                    // destinations, capped at the configured thread count.
                    return (units, ExecutionStrategy::Parallel(par.thread_count.max(1)));
                }
                Ok(_) => {
                    debug!(job = %job_id, "partitioner found no files; falling back to plain units");
                }
                Err(err) => {
                    warn!(
                        job = %job_id,
                        error = %err,
                        "file-list partitioning failed; falling back to plain units"
                    );
                }
            }
        }
    }

    (expand_sync_mode(job, ctx), job.effective_strategy())
}

fn expand_sync_mode(job: &JobConfig, ctx: &RunContext) -> Vec<InvocationUnit> {
    let destinations: Vec<&Destination> = job.enabled_destinations().collect();
    let mut units = Vec::new();

    match job.effective_sync_mode() {
        // All sources into each destination.
        SyncMode::FanOut => {
            for dest in &destinations {
                units.push(InvocationUnit {
                    label: dest.path.clone(),
                    argv: command::build(job, dest, &ctx.tool_path, ctx.dry_run),
                    file_list: None,
                });
            }
        }
        // Each source into the primary (first enabled) destination.
        SyncMode::FanIn => {
            if let Some(primary) = destinations.first() {
                for src in job.sources.iter().filter(|s| !s.as_os_str().is_empty()) {
                    units.push(InvocationUnit {
                        label: format!("{} -> {}", src.display(), primary.path),
                        argv: command::build_for_sources(
                            job,
                            primary,
                            &ctx.tool_path,
                            ctx.dry_run,
                            std::slice::from_ref(src),
                            None,
                        ),
                        file_list: None,
                    });
                }
            }
        }
        // Every source crossed with every destination.
        SyncMode::FullMesh => {
            for dest in &destinations {
                for src in job.sources.iter().filter(|s| !s.as_os_str().is_empty()) {
                    units.push(InvocationUnit {
                        label: format!("{} -> {}", src.display(), dest.path),
                        argv: command::build_for_sources(
                            job,
                            dest,
                            &ctx.tool_path,
                            ctx.dry_run,
                            std::slice::from_ref(src),
                            None,
                        ),
                        file_list: None,
                    });
                }
            }
        }
    }

    units
}

/// Execute one unit. Spawn failures are recovered into a failed unit result
/// rather than aborting the run.
async fn run_unit(unit: InvocationUnit) -> UnitResult {
    let supervisor = ProcessSupervisor::new();
    match supervisor.run(&unit.argv).await {
        Ok(outcome) => {
            let error = if outcome.status == RunStatus::Success {
                None
            } else {
                let detail = outcome
                    .errors
                    .first()
                    .cloned()
                    .unwrap_or_else(|| match outcome.exit_code {
                        Some(code) => format!("tool exited with code {code}"),
                        None => "tool terminated abnormally".to_string(),
                    });
                Some(format!("{}: {}", unit.label, detail))
            };
            UnitResult {
                label: unit.label,
                status: outcome.status,
                files: outcome.files_transferred,
                bytes: outcome.bytes_transferred,
                output: format!("{}{}", outcome.stdout, outcome.stderr),
                error,
            }
        }
        Err(err) => UnitResult {
            label: unit.label.clone(),
            status: RunStatus::Failed,
            files: 0,
            bytes: 0,
            output: String::new(),
            error: Some(format!("{}: {}", unit.label, err)),
        },
    }
    // `unit.file_list` (if any) is dropped here, after the invocation.
}

/// Strictly in configured order; under Stop, iteration halts at the first
/// failed unit and the remaining units are never attempted (and therefore
/// never counted).
async fn run_sequential(units: Vec<InvocationUnit>, policy: FailurePolicy) -> DispatchResults {
    let mut results = Vec::new();
    let mut stopped_error = None;

    for unit in units {
        debug!(unit = %unit.label, "attempting unit");
        let unit_result = run_unit(unit).await;
        let failed = unit_result.status != RunStatus::Success;
        results.push(unit_result);

        if failed && policy == FailurePolicy::Stop {
            warn!("stop policy: halting after failed unit");
            stopped_error =
                Some("stopped: remaining destinations skipped by failure policy".to_string());
            break;
        }
    }

    DispatchResults {
        units: results,
        stopped_error,
    }
}

/// Bounded worker pool: at most `limit` units in flight, a new unit started
/// as each completes. No ordering guarantee beyond the concurrency ceiling;
/// results are re-ordered by unit index before merging so the combined
/// output stays deterministic.
async fn run_parallel(units: Vec<InvocationUnit>, limit: usize) -> DispatchResults {
    let limit = limit.max(1);
    let mut pending = units.into_iter().enumerate();
    let mut pool: JoinSet<(usize, UnitResult)> = JoinSet::new();
    let mut finished: Vec<(usize, UnitResult)> = Vec::new();

    for _ in 0..limit {
        if let Some((idx, unit)) = pending.next() {
            pool.spawn(async move { (idx, run_unit(unit).await) });
        }
    }

    while let Some(joined) = pool.join_next().await {
        match joined {
            Ok(entry) => finished.push(entry),
            Err(err) => warn!(error = %err, "unit task panicked"),
        }
        if let Some((idx, unit)) = pending.next() {
            pool.spawn(async move { (idx, run_unit(unit).await) });
        }
    }

    finished.sort_by_key(|(idx, _)| *idx);
    DispatchResults {
        units: finished.into_iter().map(|(_, r)| r).collect(),
        stopped_error: None,
    }
}

/// Combination rule: Success iff every attempted unit succeeded;
/// PartialSuccess iff at least one did and at least one did not; Failed iff
/// none succeeded. A cancelled unit makes the whole run Cancelled.
fn merge_unit_results(result: &mut ExecutionResult, dispatch: DispatchResults) {
    let mut attempted = 0u64;
    let mut succeeded = 0u64;
    let mut cancelled = false;

    for unit in dispatch.units {
        attempted += 1;
        result.files_transferred += unit.files;
        result.bytes_transferred += unit.bytes;

        if !unit.output.is_empty() {
            result.output.push_str(&format!("=== {} ===\n", unit.label));
            result.output.push_str(&unit.output);
        }

        match unit.status {
            RunStatus::Success => succeeded += 1,
            RunStatus::Cancelled => cancelled = true,
            _ => {}
        }

        if let Some(err) = unit.error {
            result.errors.push(err);
        }
    }

    if let Some(err) = dispatch.stopped_error {
        result.errors.push(err);
    }

    result.status = if cancelled {
        RunStatus::Cancelled
    } else if attempted > 0 && succeeded == attempted {
        RunStatus::Success
    } else if succeeded > 0 {
        RunStatus::PartialSuccess
    } else {
        RunStatus::Failed
    };
}
