// src/command/builder.rs

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::model::{Destination, DestinationKind, JobConfig, SyncOptions};

/// Build the full argv for one invocation against one destination.
///
/// Pure and deterministic: identical inputs yield an identical vector.
/// Index 0 is the resolved tool binary; sources and the destination target
/// come last, in the tool's `<args...> <sources...> <destination>`
/// convention.
pub fn build(
    job: &JobConfig,
    dest: &Destination,
    tool_path: &str,
    dry_run_override: bool,
) -> Vec<String> {
    build_for_sources(job, dest, tool_path, dry_run_override, &job.sources, None)
}

/// Like [`build`], but with an explicit source list and an optional batch
/// file list (`--files-from`). Used by the fan-in expansion and by the
/// intra-job partitioner.
pub fn build_for_sources(
    job: &JobConfig,
    dest: &Destination,
    tool_path: &str,
    dry_run_override: bool,
    sources: &[PathBuf],
    files_from: Option<&Path>,
) -> Vec<String> {
    build_inner(
        job,
        dest,
        tool_path,
        dry_run_override,
        sources,
        files_from,
        false,
    )
}

/// Build the argv for the post-sync verification pass: a checksum-forced
/// dry run whose output is appended to the combined log.
pub fn build_verify(job: &JobConfig, dest: &Destination, tool_path: &str) -> Vec<String> {
    build_inner(job, dest, tool_path, true, &job.sources, None, true)
}

fn build_inner(
    job: &JobConfig,
    dest: &Destination,
    tool_path: &str,
    dry_run_override: bool,
    sources: &[PathBuf],
    files_from: Option<&Path>,
    force_checksum: bool,
) -> Vec<String> {
    let opts = &job.options;
    let mut argv = vec![tool_path.to_string()];

    push_transfer_flags(&mut argv, opts);
    push_preserve_flags(&mut argv, opts);
    push_delete_flags(&mut argv, opts);
    push_link_flags(&mut argv, opts);
    push_partial_flags(&mut argv, opts);
    push_backup_flags(&mut argv, opts);
    push_tuning_flags(&mut argv, opts);
    push_path_flags(&mut argv, opts);
    push_output_flags(&mut argv, opts);
    push_filter_flags(&mut argv, opts);

    if dry_run_override {
        argv.push("--dry-run".to_string());
    }
    if force_checksum && !opts.checksum {
        argv.push("--checksum".to_string());
    }

    // Remote targets get their shell invocation assembled from the optional
    // key path; rsync_path overrides the program run on the far end.
    if let DestinationKind::RemoteSsh { key_path, .. } = &dest.kind {
        let shell = match key_path {
            Some(key) if !key.is_empty() => format!("ssh -i {key}"),
            _ => "ssh".to_string(),
        };
        argv.push("-e".to_string());
        argv.push(shell);
        if let Some(rp) = &opts.rsync_path {
            argv.push(format!("--rsync-path={rp}"));
        }
    }

    if let Some(list) = files_from {
        argv.push(format!("--files-from={}", list.display()));
    }

    for src in sources {
        if !src.as_os_str().is_empty() {
            argv.push(src.display().to_string());
        }
    }

    argv.push(destination_target(dest));
    argv
}

/// Drop any pattern containing a control byte below 0x20 (other than tab)
/// or the DEL byte; everything else passes through unchanged.
pub fn sanitize_patterns(patterns: &[String]) -> Vec<String> {
    patterns
        .iter()
        .filter(|p| {
            let ok = !p
                .bytes()
                .any(|b| (b < 0x20 && b != 0x09) || b == 0x7f);
            if !ok {
                warn!(pattern = ?p, "dropping filter pattern with control bytes");
            }
            ok
        })
        .cloned()
        .collect()
}

/// Format the destination target string.
///
/// Remote targets become `user@host:path`. Local and cloud-drive targets
/// get a guaranteed trailing separator so the tool syncs *into* the
/// directory rather than creating a new subdirectory under it.
fn destination_target(dest: &Destination) -> String {
    match &dest.kind {
        DestinationKind::RemoteSsh { host, user, .. } => match user {
            Some(user) if !user.is_empty() => format!("{user}@{host}:{}", dest.path),
            _ => format!("{host}:{}", dest.path),
        },
        DestinationKind::Local | DestinationKind::CloudDrive => {
            if dest.path.ends_with('/') {
                dest.path.clone()
            } else {
                format!("{}/", dest.path)
            }
        }
    }
}

fn push_transfer_flags(argv: &mut Vec<String>, opts: &SyncOptions) {
    if opts.archive {
        argv.push("--archive".to_string());
    } else if opts.recursive {
        argv.push("--recursive".to_string());
    }
    if opts.update {
        argv.push("--update".to_string());
    }
    if opts.inplace {
        argv.push("--inplace".to_string());
    }
    if opts.append {
        argv.push("--append".to_string());
    }
    if opts.append_verify {
        argv.push("--append-verify".to_string());
    }
    if opts.dirs {
        argv.push("--dirs".to_string());
    }
    if opts.existing {
        argv.push("--existing".to_string());
    }
    if opts.ignore_existing {
        argv.push("--ignore-existing".to_string());
    }
    if opts.remove_source_files {
        argv.push("--remove-source-files".to_string());
    }
    if opts.whole_file {
        argv.push("--whole-file".to_string());
    }
    if opts.checksum {
        argv.push("--checksum".to_string());
    }
    if opts.size_only {
        argv.push("--size-only".to_string());
    }
    if opts.ignore_times {
        argv.push("--ignore-times".to_string());
    }
    if opts.fuzzy {
        argv.push("--fuzzy".to_string());
    }
}

// Archive already implies permission/time/link/owner/group preservation, so
// the individual flags are suppressed when it is set (precedence: archive >
// individual preserve flags).
fn push_preserve_flags(argv: &mut Vec<String>, opts: &SyncOptions) {
    if !opts.archive {
        if opts.preserve_permissions {
            argv.push("--perms".to_string());
        }
        if opts.preserve_times {
            argv.push("--times".to_string());
        }
        if opts.preserve_links {
            argv.push("--links".to_string());
        }
        if opts.preserve_owner {
            argv.push("--owner".to_string());
        }
        if opts.preserve_group {
            argv.push("--group".to_string());
        }
        if opts.preserve_devices {
            argv.push("--devices".to_string());
        }
        if opts.preserve_specials {
            argv.push("--specials".to_string());
        }
    }
    if opts.preserve_hard_links {
        argv.push("--hard-links".to_string());
    }
    if opts.preserve_acls {
        argv.push("--acls".to_string());
    }
    if opts.preserve_xattrs {
        argv.push("--xattrs".to_string());
    }
    if opts.preserve_executability {
        argv.push("--executability".to_string());
    }
    if opts.omit_dir_times {
        argv.push("--omit-dir-times".to_string());
    }
    if opts.omit_link_times {
        argv.push("--omit-link-times".to_string());
    }
    if opts.numeric_ids {
        argv.push("--numeric-ids".to_string());
    }
}

fn push_delete_flags(argv: &mut Vec<String>, opts: &SyncOptions) {
    if opts.delete {
        argv.push("--delete".to_string());
    }
    if opts.delete_before {
        argv.push("--delete-before".to_string());
    }
    if opts.delete_during {
        argv.push("--delete-during".to_string());
    }
    if opts.delete_after {
        argv.push("--delete-after".to_string());
    }
    if opts.delete_excluded {
        argv.push("--delete-excluded".to_string());
    }
    if opts.force_delete {
        argv.push("--force".to_string());
    }
    if let Some(n) = opts.max_delete {
        argv.push(format!("--max-delete={n}"));
    }
}

fn push_link_flags(argv: &mut Vec<String>, opts: &SyncOptions) {
    if opts.copy_links {
        argv.push("--copy-links".to_string());
    }
    if opts.copy_dirlinks {
        argv.push("--copy-dirlinks".to_string());
    }
    if opts.keep_dirlinks {
        argv.push("--keep-dirlinks".to_string());
    }
    if opts.safe_links {
        argv.push("--safe-links".to_string());
    }
    if opts.copy_unsafe_links {
        argv.push("--copy-unsafe-links".to_string());
    }
    if opts.one_file_system {
        argv.push("--one-file-system".to_string());
    }
    if opts.sparse {
        argv.push("--sparse".to_string());
    }
    if opts.mkpath {
        argv.push("--mkpath".to_string());
    }
}

fn push_partial_flags(argv: &mut Vec<String>, opts: &SyncOptions) {
    if opts.partial {
        argv.push("--partial".to_string());
    }
    if let Some(dir) = &opts.partial_dir {
        argv.push(format!("--partial-dir={dir}"));
    }
    if opts.delay_updates {
        argv.push("--delay-updates".to_string());
    }
    if opts.prune_empty_dirs {
        argv.push("--prune-empty-dirs".to_string());
    }
}

fn push_backup_flags(argv: &mut Vec<String>, opts: &SyncOptions) {
    if opts.backup {
        argv.push("--backup".to_string());
    }
    if let Some(dir) = &opts.backup_dir {
        argv.push(format!("--backup-dir={dir}"));
    }
    if let Some(suffix) = &opts.backup_suffix {
        argv.push(format!("--suffix={suffix}"));
    }
}

fn push_tuning_flags(argv: &mut Vec<String>, opts: &SyncOptions) {
    if opts.compress {
        argv.push("--compress".to_string());
    }
    if let Some(level) = opts.compress_level {
        argv.push(format!("--compress-level={level}"));
    }
    if let Some(kbps) = opts.bwlimit_kbps {
        argv.push(format!("--bwlimit={kbps}"));
    }
    if let Some(bs) = opts.block_size {
        argv.push(format!("--block-size={bs}"));
    }
    if let Some(secs) = opts.timeout_secs {
        argv.push(format!("--timeout={secs}"));
    }
    if let Some(secs) = opts.contimeout_secs {
        argv.push(format!("--contimeout={secs}"));
    }
    if let Some(w) = opts.modify_window {
        argv.push(format!("--modify-window={w}"));
    }
    if let Some(seed) = opts.checksum_seed {
        argv.push(format!("--checksum-seed={seed}"));
    }
    if let Some(min) = &opts.min_size {
        argv.push(format!("--min-size={min}"));
    }
    if let Some(max) = &opts.max_size {
        argv.push(format!("--max-size={max}"));
    }
}

fn push_path_flags(argv: &mut Vec<String>, opts: &SyncOptions) {
    if let Some(dir) = &opts.link_dest {
        argv.push(format!("--link-dest={dir}"));
    }
    if let Some(dir) = &opts.compare_dest {
        argv.push(format!("--compare-dest={dir}"));
    }
    if let Some(dir) = &opts.copy_dest {
        argv.push(format!("--copy-dest={dir}"));
    }
    if let Some(dir) = &opts.temp_dir {
        argv.push(format!("--temp-dir={dir}"));
    }
    if let Some(file) = &opts.log_file {
        argv.push(format!("--log-file={file}"));
    }
    if let Some(mode) = &opts.chmod {
        argv.push(format!("--chmod={mode}"));
    }
    if let Some(owner) = &opts.chown {
        argv.push(format!("--chown={owner}"));
    }
}

fn push_output_flags(argv: &mut Vec<String>, opts: &SyncOptions) {
    if opts.verbose {
        argv.push("--verbose".to_string());
    }
    if opts.quiet {
        argv.push("--quiet".to_string());
    }
    if opts.progress {
        argv.push("--progress".to_string());
    }
    if opts.itemize_changes {
        argv.push("--itemize-changes".to_string());
    }
    if opts.stats {
        argv.push("--stats".to_string());
    }
    if opts.human_readable {
        argv.push("--human-readable".to_string());
    }
    if opts.eight_bit_output {
        argv.push("--8-bit-output".to_string());
    }
    if opts.ignore_errors {
        argv.push("--ignore-errors".to_string());
    }
    if opts.protect_args {
        argv.push("--protect-args".to_string());
    }
}

fn push_filter_flags(argv: &mut Vec<String>, opts: &SyncOptions) {
    for pattern in sanitize_patterns(&opts.excludes) {
        argv.push(format!("--exclude={pattern}"));
    }
    for pattern in sanitize_patterns(&opts.includes) {
        argv.push(format!("--include={pattern}"));
    }
    for pattern in sanitize_patterns(&opts.filters) {
        argv.push(format!("--filter={pattern}"));
    }
    if let Some(file) = &opts.exclude_from {
        argv.push(format!("--exclude-from={file}"));
    }
    if let Some(file) = &opts.include_from {
        argv.push(format!("--include-from={file}"));
    }
    if opts.cvs_exclude {
        argv.push("--cvs-exclude".to_string());
    }
}
