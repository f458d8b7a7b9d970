//! Output module for reports and statistics
//!
//! This module handles:
//! - Re-exporting the per-stage run reports
//! - Loading and printing store and fetch-log statistics

pub mod stats;

pub use crate::collector::{RunReport, StopReason};
pub use crate::merger::MergeReport;
pub use crate::resolver::ResolveReport;
pub use stats::{
    load_statistics, print_log_statistics, print_statistics, LogStatistics, StoreStatistics,
};
