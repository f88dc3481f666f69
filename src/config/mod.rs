// src/config/mod.rs

//! Job configuration: TOML model, loading, and validation.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{
    ConfigFile, Destination, DestinationKind, ExecutionStrategy, FailurePolicy, GlobalSection,
    JobConfig, ParallelismConfig, PartitionStrategy, SyncMode, SyncOptions,
};
pub use validate::{validate_config, validate_job};
