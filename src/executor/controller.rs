//! Run controller
//!
//! Drives the scheduler over a selected test list and builds the run report.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::scheduler::{JobScheduler, DEFAULT_CAPTURE_GRACE, DEFAULT_POLL_INTERVAL};
use crate::error::{HarnessError, Result};
use crate::models::{JobResult, RunReport, TestSpec};

/// Settings for one run
#[derive(Clone, Debug)]
pub struct RunOptions {
    pub tests_dir: PathBuf,
    pub width: usize,
    pub fail_fast: bool,
    /// Script run once before parallel jobs start; `None` skips the step
    pub cache_script: Option<String>,
    pub poll_interval: Duration,
    pub capture_grace: Duration,
    pub show_progress: bool,
}

impl RunOptions {
    pub fn new(tests_dir: impl Into<PathBuf>) -> Self {
        Self {
            tests_dir: tests_dir.into(),
            width: 4,
            fail_fast: false,
            cache_script: Some("create_cache.py".to_string()),
            poll_interval: DEFAULT_POLL_INTERVAL,
            capture_grace: DEFAULT_CAPTURE_GRACE,
            show_progress: true,
        }
    }

    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn with_cache_script(mut self, script: Option<String>) -> Self {
        self.cache_script = script;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_capture_grace(mut self, grace: Duration) -> Self {
        self.capture_grace = grace;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }
}

/// Runs a test list to completion or to the first failure
pub struct RunController {
    options: RunOptions,
}

impl RunController {
    pub fn new(options: RunOptions) -> Self {
        Self { options }
    }

    /// Whether the cache step runs for a list of `count` tests
    pub fn needs_cache(&self, count: usize) -> bool {
        count > 1 && self.options.width > 1 && self.options.cache_script.is_some()
    }

    /// Run the cache script to completion with the shared flags
    pub async fn populate_cache(&self, script: &str, flags: &[String]) -> Result<()> {
        let path = self.options.tests_dir.join(script);
        info!("Populating cache with {}", path.display());

        let output = Command::new(&path)
            .args(flags)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| HarnessError::spawn(script, &path, e))?;

        if !output.status.success() {
            return Err(HarnessError::CachePopulation {
                script: script.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    /// Run `tests` and return the report.
    ///
    /// `on_result` sees every result as it is delivered. With fail-fast the
    /// loop stops after the first failed result; jobs still running are left
    /// to finish on their own and are not waited for.
    pub async fn run<F>(
        &self,
        tests: Vec<TestSpec>,
        flags: Vec<String>,
        mut on_result: F,
    ) -> Result<RunReport>
    where
        F: FnMut(&JobResult),
    {
        let total = tests.len();

        let mut scheduler = JobScheduler::new(self.options.width, &self.options.tests_dir)?
            .with_poll_interval(self.options.poll_interval)
            .with_capture_grace(self.options.capture_grace)
            .with_progress(self.options.show_progress);

        if self.needs_cache(total) {
            if let Some(script) = &self.options.cache_script {
                self.populate_cache(script, &flags).await?;
            }
        }

        info!(
            "Running {} test(s), {} in parallel",
            total, self.options.width
        );

        let started = Instant::now();
        let mut report = RunReport::new(total);
        scheduler.submit(tests, flags);

        for _ in 0..total {
            let result = scheduler.next_result().await?;
            let failed = !result.passed;
            on_result(&result);
            report.push(result);

            if self.options.fail_fast && failed {
                warn!(
                    "Early exiting after test failure, leaving {} running job(s) behind",
                    scheduler.running()
                );
                report.aborted = true;
                break;
            }
        }

        report.finish(started.elapsed());
        info!(
            "Run finished in {:.1}s, {} of {} passed, at most {} in parallel",
            report.runtime_ms as f64 / 1000.0,
            report.passed(),
            total,
            scheduler.peak_running()
        );
        Ok(report)
    }
}

/// Run the first selected test with `-h` so it prints its own options.
///
/// Output goes straight to the terminal. Nothing selected is an error.
pub async fn show_test_help(tests_dir: &Path, first: Option<&TestSpec>) -> Result<ExitStatus> {
    let spec = first.ok_or(HarnessError::NoTestsSelected)?;
    let path = tests_dir.join(&spec.identifier);
    debug!("Showing help of {}", path.display());

    Command::new(&path)
        .args(&spec.args)
        .arg("-h")
        .stdin(Stdio::null())
        .status()
        .await
        .map_err(|e| HarnessError::spawn(&spec.identifier, &path, e))
}
