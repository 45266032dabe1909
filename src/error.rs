//! Error types for the harness
//!
//! Test failures are not errors: they are recorded in a `JobResult`. The
//! variants here abort a run.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the harness error
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Fatal harness errors
#[derive(Error, Debug)]
pub enum HarnessError {
    // === Configuration ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No rpc tests to run. {0} must all be enabled")]
    MissingComponents(String),

    #[error("No test matched the requested identifiers, nothing to show help for")]
    NoTestsSelected,

    #[error("Parallelism must be at least 1, got {0}")]
    InvalidWidth(usize),

    // === Process ===
    #[error("Failed to spawn test '{test}' ({path}): {source}")]
    Spawn {
        test: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to query status of test '{test}': {source}")]
    Wait {
        test: String,
        #[source]
        source: io::Error,
    },

    #[error("No jobs to wait for")]
    NoJobs,

    #[error("Cache population with '{script}' failed ({status}): {stderr}")]
    CachePopulation {
        script: String,
        status: String,
        stderr: String,
    },

    // === Coverage ===
    #[error("No coverage reference found at {}", .0.display())]
    CoverageReferenceMissing(PathBuf),

    // === IO ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl HarnessError {
    /// Create a spawn error for a test executable
    pub fn spawn(test: &str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Spawn {
            test: test.to_string(),
            path: path.into(),
            source,
        }
    }

    /// Create a missing components error from the disabled component names
    pub fn missing_components<S: AsRef<str>>(components: &[S]) -> Self {
        Self::MissingComponents(
            components
                .iter()
                .map(|s| s.as_ref())
                .collect::<Vec<_>>()
                .join(", "),
        )
    }

    /// Whether this error came from the process boundary rather than configuration
    pub fn is_environment(&self) -> bool {
        matches!(
            self,
            HarnessError::Spawn { .. } | HarnessError::Wait { .. } | HarnessError::CachePopulation { .. }
        )
    }
}
