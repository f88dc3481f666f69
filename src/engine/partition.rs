// src/engine/partition.rs

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::command;
use crate::config::model::{JobConfig, ParallelismConfig, PartitionStrategy};
use crate::engine::orchestrator::{InvocationUnit, RunContext};

/// One batch of relative file paths destined for a single sub-invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionBatch {
    pub paths: Vec<PathBuf>,
}

/// Recursively enumerate regular files under `root`, as paths relative to
/// it, sorted for determinism. Symlinks and special files are skipped.
pub fn enumerate_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_files(root, root, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("reading directory {:?}", dir))?;

    for entry in entries {
        let entry = entry.with_context(|| format!("reading entry in {:?}", dir))?;
        let file_type = entry
            .file_type()
            .with_context(|| format!("stat of {:?}", entry.path()))?;

        if file_type.is_dir() {
            collect_files(root, &entry.path(), out)?;
        } else if file_type.is_file() {
            if let Ok(rel) = entry.path().strip_prefix(root) {
                out.push(rel.to_path_buf());
            }
        }
        // Symlinks and special files are left to a non-partitioned pass.
    }

    Ok(())
}

/// Split the file list into at most `threads` batches per the strategy.
///
/// `AutoByCount`: contiguous chunks of `floor(total/threads)`, final batch
/// absorbing the remainder. `ByDirectory`: whole top-level directory groups,
/// largest first, round-robined across batches (simple bin-balancing, not
/// optimal). `BySize` has no distinct algorithm and falls back to the
/// count-based split.
pub fn partition_files(
    files: Vec<PathBuf>,
    threads: usize,
    strategy: PartitionStrategy,
) -> Vec<PartitionBatch> {
    if files.is_empty() {
        return Vec::new();
    }
    let threads = threads.max(1);

    match strategy {
        PartitionStrategy::AutoByCount => split_by_count(files, threads),
        PartitionStrategy::ByDirectory => split_by_directory(files, threads),
        PartitionStrategy::BySize => {
            warn!("by_size partition strategy has no distinct algorithm; using count-based split");
            split_by_count(files, threads)
        }
    }
}

fn split_by_count(files: Vec<PathBuf>, threads: usize) -> Vec<PartitionBatch> {
    let total = files.len();
    let chunk = (total / threads).max(1);

    let mut batches = Vec::new();
    let mut start = 0usize;

    for i in 0..threads {
        if start >= total {
            break;
        }
        let end = if i == threads - 1 {
            total
        } else {
            (start + chunk).min(total)
        };
        batches.push(PartitionBatch {
            paths: files[start..end].to_vec(),
        });
        start = end;
    }

    batches
}

fn split_by_directory(files: Vec<PathBuf>, threads: usize) -> Vec<PartitionBatch> {
    // Group by top-level directory component; files directly under the root
    // form their own group.
    let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for path in files {
        let key = path
            .components()
            .next()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .unwrap_or_default();
        let key = if path.components().count() > 1 {
            key
        } else {
            ".".to_string()
        };
        groups.entry(key).or_default().push(path);
    }

    // Largest groups first; BTreeMap iteration keeps ties deterministic.
    let mut ordered: Vec<(String, Vec<PathBuf>)> = groups.into_iter().collect();
    ordered.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

    let mut batches: Vec<PartitionBatch> = (0..threads)
        .map(|_| PartitionBatch { paths: Vec::new() })
        .collect();

    for (i, (name, group)) in ordered.into_iter().enumerate() {
        let slot = i % threads;
        debug!(group = %name, files = group.len(), batch = slot, "assigning directory group");
        batches[slot].paths.extend(group);
    }

    batches.retain(|b| !b.paths.is_empty());
    batches
}

/// Materialize partition batches as invocation units: one newline-delimited
/// file list per batch, consumed via the tool's explicit file-list flag, per
/// enabled destination.
///
/// Partitioning applies to the primary (first non-empty) source root.
pub(crate) fn build_partition_units(
    job: &JobConfig,
    ctx: &RunContext,
    par: &ParallelismConfig,
) -> Result<Vec<InvocationUnit>> {
    let root = job
        .sources
        .iter()
        .find(|s| !s.as_os_str().is_empty())
        .context("no non-empty source to partition")?;

    let files = enumerate_files(root)?;
    let batches = partition_files(files, par.thread_count, par.effective_strategy());
    debug!(
        source = %root.display(),
        batches = batches.len(),
        "partitioned source file list"
    );

    let sources = std::slice::from_ref(root);
    let mut units = Vec::new();

    for dest in job.enabled_destinations() {
        for (i, batch) in batches.iter().enumerate() {
            let list = write_batch_list(batch)
                .with_context(|| format!("writing batch list {i} for {}", dest.path))?;
            let argv = command::build_for_sources(
                job,
                dest,
                &ctx.tool_path,
                ctx.dry_run,
                sources,
                Some(list.path()),
            );
            units.push(InvocationUnit {
                label: format!("{} [batch {}]", dest.path, i + 1),
                argv,
                file_list: Some(list),
            });
        }
    }

    Ok(units)
}

fn write_batch_list(batch: &PartitionBatch) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new().context("creating batch file list")?;
    for path in &batch.paths {
        writeln!(file, "{}", path.display()).context("writing batch file list")?;
    }
    file.flush().context("flushing batch file list")?;
    Ok(file)
}
