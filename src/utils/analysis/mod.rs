//! Analysis utilities for change criticality
//!
//! Contains the dependency graph, diff slicing, line classification,
//! composite scoring and impact propagation.

pub mod classify;
pub mod dependencies;
pub mod graph;
pub mod impact;
pub mod rank;
pub mod slicer;

// Re-export commonly used items
pub use dependencies::build_repo_graph;
pub use graph::{GraphSignals, RepoGraph};
pub use impact::{ImpactAnalyzer, ImpactOutcome};
pub use rank::{StructuralContext, crit_level, round1, score_file, score_symbols};
pub use slicer::slice_file;
