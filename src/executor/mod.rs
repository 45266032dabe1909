//! Test execution engine
//!
//! Spawns test scripts as child processes, bounded by a parallelism width,
//! and drives a run from test list to report.

mod controller;
mod job;
mod scheduler;

pub use controller::{show_test_help, RunController, RunOptions};
