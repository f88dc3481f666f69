// src/config/validate.rs

use std::str::FromStr;

use anyhow::{Result, anyhow};
use tracing::debug;

use crate::config::model::{
    ConfigFile, DestinationKind, FailurePolicy, JobConfig, PartitionStrategy, SyncMode,
};
use crate::errors::EngineError;

/// Run semantic validation against a loaded jobs file.
///
/// This checks:
/// - there is at least one job
/// - every job satisfies the execution invariant (sources + destinations)
/// - mode/strategy/policy strings parse
/// - `dependencies` refer to existing jobs and not to the job itself
///
/// Dependency *satisfaction* (last status of each dependency) is a runtime
/// admission check in the gate module, not a load-time property.
pub fn validate_config(cfg: &ConfigFile) -> Result<()> {
    if cfg.job.is_empty() {
        return Err(anyhow!("jobs file must contain at least one [job.<id>] section"));
    }

    for (id, job) in cfg.job.iter() {
        validate_job(id, job).map_err(|e| anyhow!("job '{}': {}", id, e))?;
        validate_dependencies(cfg, id, job)?;
    }

    Ok(())
}

/// Check the execution invariant and enum strings for a single job.
///
/// Returns [`EngineError::InvalidConfiguration`] so that the orchestrator
/// can reuse this as its pre-spawn admission check on jobs built in code.
pub fn validate_job(id: &str, job: &JobConfig) -> Result<(), EngineError> {
    if !job.sources.iter().any(|s| !s.as_os_str().is_empty()) {
        return Err(EngineError::InvalidConfiguration(
            "at least one non-empty source path is required".to_string(),
        ));
    }

    if job.enabled_destinations().next().is_none() {
        return Err(EngineError::InvalidConfiguration(
            "at least one enabled destination with a non-empty path is required".to_string(),
        ));
    }

    for dest in job.enabled_destinations() {
        if let DestinationKind::RemoteSsh { host, .. } = &dest.kind {
            if host.is_empty() {
                return Err(EngineError::InvalidConfiguration(format!(
                    "remote destination '{}' has no host",
                    dest.path
                )));
            }
        }
    }

    SyncMode::from_str(&job.sync_mode).map_err(EngineError::InvalidConfiguration)?;
    FailurePolicy::from_str(&job.failure_policy).map_err(EngineError::InvalidConfiguration)?;

    match job.strategy.trim().to_lowercase().as_str() {
        "sequential" => {}
        "parallel" => {
            if job.max_concurrency == 0 {
                return Err(EngineError::InvalidConfiguration(
                    "max_concurrency must be >= 1 for parallel strategy".to_string(),
                ));
            }
        }
        other => {
            return Err(EngineError::InvalidConfiguration(format!(
                "invalid strategy: {other} (expected \"sequential\" or \"parallel\")"
            )));
        }
    }

    if let Some(par) = &job.parallelism {
        if par.enabled {
            if par.thread_count == 0 {
                return Err(EngineError::InvalidConfiguration(
                    "parallelism.thread_count must be >= 1".to_string(),
                ));
            }
            PartitionStrategy::from_str(&par.strategy)
                .map_err(EngineError::InvalidConfiguration)?;
        }
    }

    debug!(job = %id, "job configuration validated");
    Ok(())
}

fn validate_dependencies(cfg: &ConfigFile, id: &str, job: &JobConfig) -> Result<()> {
    for dep in job.dependencies.iter() {
        if dep == id {
            return Err(anyhow!("job '{}' cannot depend on itself", id));
        }
        if !cfg.job.contains_key(dep) {
            return Err(anyhow!(
                "job '{}' has unknown dependency '{}' in `dependencies`",
                id,
                dep
            ));
        }
    }
    Ok(())
}
