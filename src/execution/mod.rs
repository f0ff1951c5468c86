//! Execution module for Greenlight
//!
//! Provides:
//! - Command construction for the lint/build and test/component phases
//! - Concurrent phase execution with kill-on-failure and an optional timeout
//! - The phased runner that gates, summarizes and reports

pub mod phase;
pub mod plan;
pub mod runner;

pub use phase::{PhaseExecutor, ProcessGroups};
pub use runner::{Halt, RunOptions, RunOutcome, Runner};
