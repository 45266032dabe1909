//! Data models for test runs
//!
//! Catalog entries, per-job results and the run report.

mod test_result;
mod test_spec;

pub use test_result::{JobResult, RunReport};
pub use test_spec::{Catalog, TestSpec};
