//! Core module for critmap
//!
//! Data model, snapshot loading and the scan engine.

pub mod engine;
pub mod snapshot;
mod types;

pub use engine::{analyze, analyze_with_events};
pub use snapshot::{SnapshotError, load_snapshot, parse_snapshot};
pub use types::*;
