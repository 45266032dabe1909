//! Job result and run report models
//!
//! Defines the outcome of one test process and the aggregate of a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Outcome of one test process
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobResult {
    pub name: String,
    pub stdout: String,
    pub stderr: String,
    pub passed: bool,
    pub duration_ms: u64,
    pub port_seed: usize,
    /// Output was still open after the grace window and the job was killed
    #[serde(default)]
    pub capture_timed_out: bool,
}

impl JobResult {
    /// Build a result from a finished process.
    ///
    /// A job passes only when it exited successfully, wrote nothing to stderr
    /// and its output could be collected in time.
    pub fn from_exit(
        name: impl Into<String>,
        stdout: String,
        stderr: String,
        exit_success: bool,
        elapsed: Duration,
        port_seed: usize,
        capture_timed_out: bool,
    ) -> Self {
        let passed = stderr.is_empty() && exit_success && !capture_timed_out;
        Self {
            name: name.into(),
            stdout,
            stderr,
            passed,
            duration_ms: elapsed.as_millis() as u64,
            port_seed,
            capture_timed_out,
        }
    }

    #[cfg(test)]
    pub fn pass(name: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            name: name.into(),
            stdout: String::new(),
            stderr: String::new(),
            passed: true,
            duration_ms,
            port_seed: 0,
            capture_timed_out: false,
        }
    }

    #[cfg(test)]
    pub fn fail(name: impl Into<String>, duration_ms: u64, stderr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stdout: String::new(),
            stderr: stderr.into(),
            passed: false,
            duration_ms,
            port_seed: 0,
            capture_timed_out: false,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }

    pub fn symbol(&self) -> &'static str {
        if self.passed {
            "✓"
        } else {
            "✗"
        }
    }
}

impl fmt::Display for JobResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{:.1}s]",
            self.symbol(),
            self.name,
            self.duration_secs()
        )
    }
}

/// Aggregate of all results delivered during one run, in delivery order
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Number of tests that were selected for the run
    pub selected: usize,
    /// Wall-clock time of the whole run
    pub runtime_ms: u64,
    /// The run stopped at the first failure and left remaining jobs behind
    pub aborted: bool,
    pub results: Vec<JobResult>,
}

impl RunReport {
    pub fn new(selected: usize) -> Self {
        Self {
            started_at: Utc::now(),
            completed_at: None,
            selected,
            runtime_ms: 0,
            aborted: false,
            results: Vec::new(),
        }
    }

    pub fn push(&mut self, result: JobResult) {
        self.results.push(result);
    }

    /// Stamp completion time and wall-clock runtime
    pub fn finish(&mut self, runtime: Duration) {
        self.completed_at = Some(Utc::now());
        self.runtime_ms = runtime.as_millis() as u64;
    }

    /// Logical AND over every delivered result
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    /// Sum of per-test durations
    pub fn accumulated_ms(&self) -> u64 {
        self.results.iter().map(|r| r.duration_ms).sum()
    }

    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.passed()
    }

    pub fn failures(&self) -> impl Iterator<Item = &JobResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    /// Process exit code for this run
    pub fn exit_code(&self) -> i32 {
        if self.all_passed() {
            0
        } else {
            1
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for result in &self.results {
            writeln!(f, "  {result}")?;
        }
        writeln!(
            f,
            "Total: {} | Pass: {} | Fail: {} | Not run: {}",
            self.results.len(),
            self.passed(),
            self.failed(),
            self.selected.saturating_sub(self.results.len())
        )
    }
}
