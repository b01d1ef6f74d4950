//! Utility modules for critmap
//!
//! - `analysis/` - graph building, slicing, classification, scoring, propagation

pub mod analysis;

// Short paths like `utils::graph`
pub use analysis::classify;
pub use analysis::dependencies;
pub use analysis::graph;
pub use analysis::impact;
pub use analysis::rank;
pub use analysis::slicer;
