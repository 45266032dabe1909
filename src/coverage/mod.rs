//! RPC coverage aggregation
//!
//! Every test process writes the RPC commands it called into its own
//! `coverage.*` file inside a shared session directory. The session also
//! holds `rpc_interface.txt`, the full command list of the daemon. After the
//! run the two are diffed to find commands no test exercised.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

use crate::error::{HarnessError, Result};

/// Name of the reference file listing every RPC command
pub const REFERENCE_FILENAME: &str = "rpc_interface.txt";

/// Prefix of the per-test coverage files
pub const COVERAGE_FILE_PREFIX: &str = "coverage.";

/// Temporary directory shared by the tests of one run.
///
/// Removed when dropped, so every exit path cleans up.
#[derive(Debug)]
pub struct CoverageSession {
    dir: TempDir,
}

impl CoverageSession {
    /// Create a fresh session under the system temp directory
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("coverage").tempdir()?;
        debug!("Coverage session at {}", dir.path().display());
        Ok(Self { dir })
    }

    /// Create a fresh session under `parent`
    #[cfg(test)]
    pub fn new_in(parent: impl AsRef<Path>) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("coverage")
            .tempdir_in(parent)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Flag handed to every test so it writes into this session
    pub fn flag(&self) -> String {
        format!("--coveragedir={}", self.dir.path().display())
    }

    /// Diff the reference list against everything the tests recorded
    pub fn report(&self) -> Result<CoverageReport> {
        CoverageReport::from_dir(self.dir.path())
    }

    /// Remove the session directory, surfacing removal errors
    pub fn cleanup(self) -> Result<()> {
        self.dir.close()?;
        Ok(())
    }
}

/// Commands listed in the reference file but never called by a test
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CoverageReport {
    pub total: usize,
    pub uncovered: Vec<String>,
}

impl CoverageReport {
    /// Build the report for a session directory. Reads only.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let reference_path = dir.join(REFERENCE_FILENAME);
        if !reference_path.is_file() {
            return Err(HarnessError::CoverageReferenceMissing(reference_path));
        }
        let all = read_commands(&reference_path)?;

        let mut files = Vec::new();
        collect_coverage_files(dir, &mut files)?;

        let mut covered = BTreeSet::new();
        for file in &files {
            covered.extend(read_commands(file)?);
        }
        debug!(
            "{} coverage file(s), {} of {} commands covered",
            files.len(),
            all.intersection(&covered).count(),
            all.len()
        );

        Ok(Self {
            total: all.len(),
            uncovered: all.difference(&covered).cloned().collect(),
        })
    }

    pub fn is_complete(&self) -> bool {
        self.uncovered.is_empty()
    }
}

impl fmt::Display for CoverageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_complete() {
            return writeln!(f, "All RPC commands covered.");
        }
        writeln!(f, "Uncovered RPC commands:")?;
        for command in &self.uncovered {
            writeln!(f, "  - {command}")?;
        }
        Ok(())
    }
}

/// One command per line; surrounding whitespace and blank lines are ignored
fn read_commands(path: &Path) -> Result<BTreeSet<String>> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

fn collect_coverage_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_coverage_files(&path, files)?;
        } else if entry
            .file_name()
            .to_string_lossy()
            .starts_with(COVERAGE_FILE_PREFIX)
        {
            files.push(path);
        }
    }
    Ok(())
}
