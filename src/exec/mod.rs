// src/exec/mod.rs

//! Subprocess handling: the process supervisor and hook execution.

pub mod hooks;
pub mod supervisor;

pub use hooks::{HookEnv, run_hook};
pub use supervisor::{InvocationOutcome, ProcessSupervisor};
