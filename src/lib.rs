pub mod config;
pub mod core;
pub mod format;
pub mod runner;
pub mod utils;

// Re-export key items for convenience
pub use config::{CritConfig, OutputFormat, ScoringConfig};
pub use core::{ScanEvent, ScanInput, ScanReport, analyze};
pub use runner::{ScanCoordinator, run, run_pending, run_scan};
