// src/gate/mod.rs

//! Admission checks that run before any subprocess is spawned: job-to-job
//! dependency satisfaction and the source-content change fingerprint.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use blake3::Hasher;
use tracing::{debug, info, warn};

use crate::config::model::JobConfig;
use crate::engine::RunStatus;
use crate::errors::EngineError;

/// Outcome of the dependency admission check.
///
/// Unsatisfied means the run is simply not made, not counted as a failure,
/// with the reasons surfaced to the caller. This is an
/// admission check only: two dependent jobs triggered concurrently by hand
/// can still race, as there is no cross-job lock.
#[derive(Debug, Clone)]
pub struct GateDecision {
    pub satisfied: bool,
    pub reasons: Vec<String>,
}

impl GateDecision {
    fn satisfied() -> Self {
        Self {
            satisfied: true,
            reasons: Vec::new(),
        }
    }

    /// Fold the decision into the engine error taxonomy.
    pub fn into_result(self) -> Result<(), EngineError> {
        if self.satisfied {
            Ok(())
        } else {
            Err(EngineError::DependencyUnsatisfied(self.reasons))
        }
    }
}

/// Check whether every dependency of the job resolves to a known job whose
/// last recorded status is Success. Vacuously satisfied when the dependency
/// list is empty; one reason string per missing or non-successful
/// dependency.
pub fn check_dependencies(
    job: &JobConfig,
    last_statuses: &HashMap<String, RunStatus>,
) -> GateDecision {
    if job.dependencies.is_empty() {
        return GateDecision::satisfied();
    }

    let mut reasons = Vec::new();

    for dep in &job.dependencies {
        match last_statuses.get(dep) {
            None => reasons.push(format!("dependency '{dep}' has never run")),
            Some(RunStatus::Success) => {}
            Some(status) => reasons.push(format!(
                "dependency '{dep}' last finished with status {status}"
            )),
        }
    }

    GateDecision {
        satisfied: reasons.is_empty(),
        reasons,
    }
}

/// Compute a content fingerprint over all job sources: a blake3 digest of
/// the sorted canonical `(relative path, mtime, size)` encoding of every
/// regular file.
///
/// Identical directory snapshots (no path/mtime/size change) produce
/// byte-identical fingerprints.
pub fn compute_fingerprint(sources: &[PathBuf]) -> Result<String> {
    let mut entries: Vec<(String, u64, u64)> = Vec::new();

    for source in sources.iter().filter(|s| !s.as_os_str().is_empty()) {
        collect_entries(source, source, &mut entries)?;
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Hasher::new();
    for (path, mtime, size) in &entries {
        hasher.update(format!("{path}|{mtime}|{size}\n").as_bytes());
    }

    let hash = hasher.finalize().to_hex().to_string();
    debug!(files = entries.len(), fingerprint = %hash, "computed source fingerprint");
    Ok(hash)
}

fn collect_entries(
    root: &Path,
    dir: &Path,
    out: &mut Vec<(String, u64, u64)>,
) -> Result<()> {
    let entries = fs::read_dir(dir).with_context(|| format!("reading directory {:?}", dir))?;

    for entry in entries {
        let entry = entry.with_context(|| format!("reading entry in {:?}", dir))?;
        let file_type = entry
            .file_type()
            .with_context(|| format!("stat of {:?}", entry.path()))?;

        if file_type.is_dir() {
            collect_entries(root, &entry.path(), out)?;
        } else if file_type.is_file() {
            let meta = entry
                .metadata()
                .with_context(|| format!("metadata of {:?}", entry.path()))?;
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or(0);
            let rel = entry
                .path()
                .strip_prefix(root)
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| entry.path().display().to_string());
            out.push((rel, mtime, meta.len()));
        }
    }

    Ok(())
}

/// Decide whether the job's sources have changed since the stored
/// fingerprint.
///
/// Always true when conditional execution is disabled. A differing or
/// absent previous fingerprint means changed. On any error during the walk
/// the gate fails open (treats as changed): unnecessary work is preferred
/// over a missed backup.
pub fn has_source_changed(job: &JobConfig, stored: Option<&str>) -> (bool, Option<String>) {
    if !job.run_only_if_changed {
        return (true, None);
    }

    match compute_fingerprint(&job.sources) {
        Ok(current) => {
            let changed = match stored {
                Some(prev) => prev != current,
                None => true,
            };
            if !changed {
                info!("source fingerprint unchanged");
            }
            (changed, Some(current))
        }
        Err(err) => {
            warn!(error = %err, "fingerprint walk failed; treating sources as changed");
            (true, None)
        }
    }
}

/// Line-based fingerprint persistence: one `job_id <hex>` pair per line.
pub struct FingerprintStore {
    path: PathBuf,
    map: HashMap<String, String>,
}

impl FingerprintStore {
    /// Load the store from `<state_dir>/fingerprints`; a missing file is an
    /// empty store.
    pub fn load(state_dir: &Path) -> Result<Self> {
        let path = state_dir.join("fingerprints");
        let mut map = HashMap::new();

        if path.exists() {
            let file = File::open(&path)
                .with_context(|| format!("opening fingerprint store at {:?}", path))?;
            for line in BufReader::new(file).lines() {
                let line = line?;
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if let Some((job, hash)) = trimmed.split_once(char::is_whitespace) {
                    map.insert(job.to_string(), hash.trim().to_string());
                }
            }
        }

        Ok(Self { path, map })
    }

    pub fn get(&self, job_id: &str) -> Option<&str> {
        self.map.get(job_id).map(String::as_str)
    }

    pub fn set(&mut self, job_id: &str, fingerprint: String) {
        self.map.insert(job_id.to_string(), fingerprint);
    }

    /// Persist all fingerprints, creating the state directory if needed.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating state directory at {:?}", parent))?;
        }

        let file = File::create(&self.path)
            .with_context(|| format!("creating fingerprint store at {:?}", self.path))?;
        let mut writer = BufWriter::new(file);

        for (job, hash) in self.map.iter() {
            writeln!(writer, "{} {}", job, hash)?;
        }

        writer.flush()?;
        Ok(())
    }
}
