// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::config::model::{ConfigFile, Destination, DestinationKind, RawDestination};
use crate::config::validate::validate_config;

/// Load a jobs file from a given path and return the raw `ConfigFile`.
///
/// This only performs TOML deserialization (including the legacy-destination
/// migration); it does **not** perform semantic validation. Use
/// [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading jobs file at {:?}", path))?;

    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("parsing TOML jobs file from {:?}", path))?;

    Ok(config)
}

/// Load a jobs file from path and run semantic validation.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads TOML and applies defaults (serde + `Default` impls).
/// - Migrates legacy destination records to the tagged-variant shape.
/// - Checks the per-job source/destination invariant, dependency
///   references, and mode/strategy/policy strings.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let config = load_from_path(&path)?;
    validate_config(&config)?;
    Ok(config)
}

/// Fold a raw destination record into the canonical tagged-variant shape.
///
/// Records written by current versions carry an explicit `kind`. Older
/// records carried an optional kind plus a redundant `is_remote` boolean
/// that writers kept "in sync" by hand; when `kind` is absent the boolean
/// decides between local and SSH-remote. Remote fields on a non-remote
/// record are dropped.
pub fn migrate_destination(raw: RawDestination) -> Destination {
    let kind = match raw.kind.as_deref().map(str::trim) {
        Some("local") => DestinationKind::Local,
        Some("cloud_drive") | Some("cloud") => DestinationKind::CloudDrive,
        Some("remote_ssh") | Some("remote") | Some("ssh") => remote_kind(&raw),
        Some(other) => {
            debug!(kind = %other, path = %raw.path, "unknown destination kind; treating as local");
            DestinationKind::Local
        }
        None => {
            // Legacy shape: only the boolean distinguishes remote targets.
            if raw.is_remote.unwrap_or(false) {
                debug!(path = %raw.path, "migrating legacy is_remote destination record");
                remote_kind(&raw)
            } else {
                DestinationKind::Local
            }
        }
    };

    Destination {
        path: raw.path,
        kind,
        enabled: raw.enabled,
    }
}

fn remote_kind(raw: &RawDestination) -> DestinationKind {
    DestinationKind::RemoteSsh {
        host: raw.host.clone().unwrap_or_default(),
        user: raw.user.clone(),
        key_path: raw.key_path.clone(),
    }
}

/// Helper to resolve a default jobs-file path.
///
/// Currently this just returns `Syncjob.toml` in the current working
/// directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Syncjob.toml")
}
