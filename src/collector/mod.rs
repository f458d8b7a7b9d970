//! Resumable collection
//!
//! This module contains:
//! - Work item state tracking
//! - The durable JSON-lines fetch record log
//! - The bounded collection pass that fills it

mod coordinator;
mod log;
mod state;

pub use coordinator::{work_items_from_store, Collector, RunReport, StopReason};
pub use log::{FetchLog, FetchRecord, LogError};
pub use state::{WorkItem, WorkItemState};
