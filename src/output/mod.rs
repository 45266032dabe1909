//! Output formatting module
//!
//! Renders results as they arrive, the final report and the coverage listing.

mod formatter;

pub use formatter::{write_report, OutputFormat, ResultFormatter};
