// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

/// Top-level configuration as read from a TOML jobs file.
///
/// ```toml
/// [config]
/// tool_path = "rsync"
/// state_dir = ".syncjob"
///
/// [job.photos]
/// sources = ["/home/me/photos"]
/// sync_mode = "fan_out"
///
/// [[job.photos.destinations]]
/// path = "/mnt/backup/photos"
/// kind = "local"
/// ```
///
/// All sections are optional and have reasonable defaults, except that a
/// usable file needs at least one `[job.<id>]`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    /// Global settings from `[config]`.
    #[serde(default)]
    pub config: GlobalSection,

    /// All jobs from `[job.<id>]`, keyed by job id.
    #[serde(default)]
    pub job: BTreeMap<String, JobConfig>,
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct GlobalSection {
    /// Path (or bare name resolved via PATH) of the external sync tool.
    #[serde(default = "default_tool_path")]
    pub tool_path: String,

    /// Directory holding engine state (fingerprints, run history).
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
}

fn default_tool_path() -> String {
    "rsync".to_string()
}

fn default_state_dir() -> String {
    ".syncjob".to_string()
}

impl Default for GlobalSection {
    fn default() -> Self {
        Self {
            tool_path: default_tool_path(),
            state_dir: default_state_dir(),
        }
    }
}

/// One sync job from `[job.<id>]`.
///
/// A job is passed by value into the engine per run; the engine never
/// mutates the caller's copy. Derived state (fingerprint, last status) is
/// returned for the caller to persist.
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// Display name; falls back to the job id when absent.
    #[serde(default)]
    pub name: Option<String>,

    /// Ordered source paths.
    #[serde(default)]
    pub sources: Vec<PathBuf>,

    /// Ordered destinations. See [`Destination`] for the accepted shapes.
    #[serde(default)]
    pub destinations: Vec<Destination>,

    /// Tool option flags passed through to the external tool.
    #[serde(default)]
    pub options: SyncOptions,

    /// `"fan_out"`, `"fan_in"` or `"full_mesh"`.
    #[serde(default = "default_sync_mode")]
    pub sync_mode: String,

    /// `"sequential"` or `"parallel"`.
    #[serde(default = "default_strategy")]
    pub strategy: String,

    /// Concurrency ceiling used when `strategy = "parallel"`.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// `"continue"` or `"stop"`.
    #[serde(default = "default_failure_policy")]
    pub failure_policy: String,

    /// Shell command executed once before any destination is attempted.
    #[serde(default)]
    pub pre_hook: Option<String>,

    /// Shell command executed once after all attempts.
    #[serde(default)]
    pub post_hook: Option<String>,

    /// Run a checksum-forced dry pass per destination after a non-failed
    /// sync, appending verification output to the combined log.
    #[serde(default)]
    pub verify_after_sync: bool,

    /// Intra-job file-list partitioning for very large file counts.
    #[serde(default)]
    pub parallelism: Option<ParallelismConfig>,

    /// Job ids that must have a last recorded status of Success before this
    /// job is admitted.
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Skip the run when the source content fingerprint is unchanged.
    #[serde(default)]
    pub run_only_if_changed: bool,

    /// Fingerprint recorded by the previous run, if any. Normally managed by
    /// the engine's state store rather than written by hand.
    #[serde(default)]
    pub last_source_fingerprint: Option<String>,
}

fn default_sync_mode() -> String {
    "fan_out".to_string()
}

fn default_strategy() -> String {
    "sequential".to_string()
}

fn default_max_concurrency() -> usize {
    2
}

fn default_failure_policy() -> String {
    "continue".to_string()
}

impl JobConfig {
    /// Display name for logs, hooks and history.
    pub fn display_name(&self, job_id: &str) -> String {
        self.name.clone().unwrap_or_else(|| job_id.to_string())
    }

    /// Destinations that are enabled and have a non-empty path.
    pub fn enabled_destinations(&self) -> impl Iterator<Item = &Destination> {
        self.destinations
            .iter()
            .filter(|d| d.enabled && !d.path.is_empty())
    }

    /// Effective sync mode, falling back to fan-out on unknown strings.
    /// Validation rejects unknown strings up front, so the fallback only
    /// matters for hand-built configs in tests.
    pub fn effective_sync_mode(&self) -> SyncMode {
        SyncMode::from_str(&self.sync_mode).unwrap_or(SyncMode::FanOut)
    }

    /// Effective execution strategy combining the strategy string and the
    /// concurrency ceiling.
    pub fn effective_strategy(&self) -> ExecutionStrategy {
        match self.strategy.trim().to_lowercase().as_str() {
            "parallel" => ExecutionStrategy::Parallel(self.max_concurrency.max(1)),
            _ => ExecutionStrategy::Sequential,
        }
    }

    /// Effective failure policy.
    pub fn effective_failure_policy(&self) -> FailurePolicy {
        FailurePolicy::from_str(&self.failure_policy).unwrap_or(FailurePolicy::Continue)
    }
}

/// One sync destination.
///
/// The canonical shape is a tagged variant: `kind` selects between local,
/// SSH-remote and mounted cloud-drive targets, with the remote fields only
/// meaningful for `remote_ssh`. Legacy records carried an optional kind plus
/// a redundant `is_remote` boolean; `loader::migrate_destination` folds that
/// shape into this one on load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub path: String,
    pub kind: DestinationKind,
    pub enabled: bool,
}

/// Destination kind as a single tagged variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationKind {
    Local,
    RemoteSsh {
        host: String,
        user: Option<String>,
        key_path: Option<String>,
    },
    CloudDrive,
}

/// Raw destination shape as deserialized from TOML.
///
/// Accepts both the canonical and the legacy field layout; see
/// [`crate::config::loader::migrate_destination`].
#[derive(Debug, Clone, Deserialize)]
pub struct RawDestination {
    #[serde(default)]
    pub path: String,

    /// `"local"`, `"remote_ssh"` or `"cloud_drive"`. Optional in legacy
    /// records.
    #[serde(default)]
    pub kind: Option<String>,

    /// Legacy boolean kept "in sync" with `kind` by old writers.
    #[serde(default)]
    pub is_remote: Option<bool>,

    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub key_path: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl<'de> Deserialize<'de> for Destination {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawDestination::deserialize(deserializer)?;
        Ok(crate::config::loader::migrate_destination(raw))
    }
}

/// Source/destination topology for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// All sources into each destination (one invocation per destination).
    FanOut,
    /// Each source into the primary (first enabled) destination.
    FanIn,
    /// Every source crossed with every destination.
    FullMesh,
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fan_out" | "fanout" => Ok(SyncMode::FanOut),
            "fan_in" | "fanin" => Ok(SyncMode::FanIn),
            "full_mesh" | "mesh" => Ok(SyncMode::FullMesh),
            other => Err(format!(
                "invalid sync_mode: {other} (expected \"fan_out\", \"fan_in\" or \"full_mesh\")"
            )),
        }
    }
}

/// How invocation units are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    /// Strictly in configured order; can short-circuit under Stop.
    Sequential,
    /// Bounded worker pool with the given concurrency ceiling.
    Parallel(usize),
}

/// What to do when a destination (or batch) fails mid-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Keep attempting the remaining units; downgrade the combined status.
    Continue,
    /// In sequential mode, halt at the first failed unit.
    Stop,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "continue" => Ok(FailurePolicy::Continue),
            "stop" => Ok(FailurePolicy::Stop),
            other => Err(format!(
                "invalid failure_policy: {other} (expected \"continue\" or \"stop\")"
            )),
        }
    }
}

/// `[job.<id>.parallelism]`: intra-job file-list partitioning.
#[derive(Debug, Clone, Deserialize)]
pub struct ParallelismConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Number of batches (and the concurrency ceiling for sub-invocations).
    #[serde(default = "default_thread_count")]
    pub thread_count: usize,

    /// `"auto_by_count"`, `"by_directory"` or `"by_size"`.
    #[serde(default = "default_partition_strategy")]
    pub strategy: String,
}

fn default_thread_count() -> usize {
    4
}

fn default_partition_strategy() -> String {
    "auto_by_count".to_string()
}

impl ParallelismConfig {
    pub fn effective_strategy(&self) -> PartitionStrategy {
        PartitionStrategy::from_str(&self.strategy).unwrap_or(PartitionStrategy::AutoByCount)
    }
}

/// File-list partition strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionStrategy {
    /// Contiguous chunks of `floor(total/threads)`, remainder to the last.
    AutoByCount,
    /// Whole top-level directory groups round-robined across batches.
    ByDirectory,
    /// Declared but has no distinct algorithm; falls back to count-based
    /// splitting.
    BySize,
}

impl FromStr for PartitionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto_by_count" | "auto" => Ok(PartitionStrategy::AutoByCount),
            "by_directory" | "directory" => Ok(PartitionStrategy::ByDirectory),
            "by_size" | "size" => Ok(PartitionStrategy::BySize),
            other => Err(format!(
                "invalid partition strategy: {other} (expected \"auto_by_count\", \
                 \"by_directory\" or \"by_size\")"
            )),
        }
    }
}

/// Pass-through option flags for the external tool.
///
/// Booleans map to single flags, optional integers/strings to `--flag=value`
/// arguments, and the pattern lists each expand to one flag per pattern
/// (after sanitization). Defaults are chosen so that a bare `[job.<id>]`
/// produces a useful archive-style sync whose output the progress parser and
/// delta reporter can consume.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    // Core transfer behaviour.
    pub archive: bool,
    pub recursive: bool,
    pub update: bool,
    pub inplace: bool,
    pub append: bool,
    pub append_verify: bool,
    pub dirs: bool,
    pub existing: bool,
    pub ignore_existing: bool,
    pub remove_source_files: bool,
    pub whole_file: bool,
    pub checksum: bool,
    pub size_only: bool,
    pub ignore_times: bool,
    pub fuzzy: bool,

    // Attribute preservation. Redundant with `archive`; the builder
    // suppresses the individual flags when archive is set.
    pub preserve_permissions: bool,
    pub preserve_times: bool,
    pub preserve_links: bool,
    pub preserve_owner: bool,
    pub preserve_group: bool,
    pub preserve_devices: bool,
    pub preserve_specials: bool,
    pub preserve_hard_links: bool,
    pub preserve_acls: bool,
    pub preserve_xattrs: bool,
    pub preserve_executability: bool,
    pub omit_dir_times: bool,
    pub omit_link_times: bool,
    pub numeric_ids: bool,

    // Deletion behaviour.
    pub delete: bool,
    pub delete_before: bool,
    pub delete_during: bool,
    pub delete_after: bool,
    pub delete_excluded: bool,
    pub force_delete: bool,
    pub max_delete: Option<u64>,

    // Link and filesystem handling.
    pub copy_links: bool,
    pub copy_dirlinks: bool,
    pub keep_dirlinks: bool,
    pub safe_links: bool,
    pub copy_unsafe_links: bool,
    pub one_file_system: bool,
    pub sparse: bool,
    pub mkpath: bool,

    // Partial transfer and resume.
    pub partial: bool,
    pub partial_dir: Option<String>,
    pub delay_updates: bool,
    pub prune_empty_dirs: bool,

    // Backup.
    pub backup: bool,
    pub backup_dir: Option<String>,
    pub backup_suffix: Option<String>,

    // Compression and throughput.
    pub compress: bool,
    pub compress_level: Option<i32>,
    pub bwlimit_kbps: Option<u64>,
    pub block_size: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub contimeout_secs: Option<u64>,

    // Comparison tuning.
    pub modify_window: Option<u64>,
    pub checksum_seed: Option<i32>,
    pub min_size: Option<String>,
    pub max_size: Option<String>,

    // Destination tree references.
    pub link_dest: Option<String>,
    pub compare_dest: Option<String>,
    pub copy_dest: Option<String>,

    // Misc paths and overrides.
    pub temp_dir: Option<String>,
    pub log_file: Option<String>,
    pub chmod: Option<String>,
    pub chown: Option<String>,
    pub rsync_path: Option<String>,

    // Output shape. The progress parser and delta reporter rely on the
    // defaults here.
    pub verbose: bool,
    pub quiet: bool,
    pub progress: bool,
    pub itemize_changes: bool,
    pub stats: bool,
    pub human_readable: bool,
    pub eight_bit_output: bool,

    // Robustness.
    pub ignore_errors: bool,
    pub protect_args: bool,

    // Filter patterns, sanitized before emission.
    pub excludes: Vec<String>,
    pub includes: Vec<String>,
    pub filters: Vec<String>,
    pub exclude_from: Option<String>,
    pub include_from: Option<String>,
    pub cvs_exclude: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            archive: true,
            recursive: false,
            update: false,
            inplace: false,
            append: false,
            append_verify: false,
            dirs: false,
            existing: false,
            ignore_existing: false,
            remove_source_files: false,
            whole_file: false,
            checksum: false,
            size_only: false,
            ignore_times: false,
            fuzzy: false,
            preserve_permissions: false,
            preserve_times: false,
            preserve_links: false,
            preserve_owner: false,
            preserve_group: false,
            preserve_devices: false,
            preserve_specials: false,
            preserve_hard_links: false,
            preserve_acls: false,
            preserve_xattrs: false,
            preserve_executability: false,
            omit_dir_times: false,
            omit_link_times: false,
            numeric_ids: false,
            delete: false,
            delete_before: false,
            delete_during: false,
            delete_after: false,
            delete_excluded: false,
            force_delete: false,
            max_delete: None,
            copy_links: false,
            copy_dirlinks: false,
            keep_dirlinks: false,
            safe_links: false,
            copy_unsafe_links: false,
            one_file_system: false,
            sparse: false,
            mkpath: false,
            partial: false,
            partial_dir: None,
            delay_updates: false,
            prune_empty_dirs: false,
            backup: false,
            backup_dir: None,
            backup_suffix: None,
            compress: false,
            compress_level: None,
            bwlimit_kbps: None,
            block_size: None,
            timeout_secs: None,
            contimeout_secs: None,
            modify_window: None,
            checksum_seed: None,
            min_size: None,
            max_size: None,
            link_dest: None,
            compare_dest: None,
            copy_dest: None,
            temp_dir: None,
            log_file: None,
            chmod: None,
            chown: None,
            rsync_path: None,
            verbose: false,
            quiet: false,
            progress: true,
            itemize_changes: true,
            stats: true,
            human_readable: false,
            eight_bit_output: false,
            ignore_errors: false,
            protect_args: false,
            excludes: Vec::new(),
            includes: Vec::new(),
            filters: Vec::new(),
            exclude_from: None,
            include_from: None,
            cvs_exclude: false,
        }
    }
}
