// src/report/mod.rs

//! Post-run derivation: change deltas from itemized output, and the capped
//! execution history.

pub mod delta;
pub mod history;

pub use delta::{DeltaReport, build_report};
pub use history::{HistoryEntry, HistoryStore, MAX_HISTORY_ENTRIES};
