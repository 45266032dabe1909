//! Configuration module
//!
//! Handles loading and managing configuration.

mod env;
mod file;

pub use env::{print_env_help, EnvConfig};
pub use file::ConfigFile;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{HarnessError, Result};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Source tree root; tests live in `<src_dir>/test/rpc-tests`
    pub src_dir: PathBuf,

    /// Build tree root; handed to tests as `--srcdir=<build_dir>/src`
    pub build_dir: PathBuf,

    /// Overrides the tests directory derived from `src_dir`
    pub tests_dir: Option<PathBuf>,

    /// Number of tests run at once
    pub parallel: usize,

    /// Interval between completion scans
    pub poll_interval_ms: u64,

    /// How long to wait for a finished test's output before killing it
    pub capture_grace_secs: u64,

    /// Script run once before parallel jobs; empty or null disables it
    pub cache_script: Option<String>,

    /// Executable extension of the build (".exe" for Windows builds)
    pub exe_ext: String,

    /// Default log level
    pub log_level: String,

    /// Which parts of the daemon were built
    pub components: Components,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            src_dir: PathBuf::from("."),
            build_dir: PathBuf::from("."),
            tests_dir: None,
            parallel: 4,
            poll_interval_ms: 500,
            capture_grace_secs: 10,
            cache_script: Some("create_cache.py".to_string()),
            exe_ext: String::new(),
            log_level: "warn".to_string(),
            components: Components::default(),
        }
    }
}

impl AppConfig {
    /// Directory holding the test scripts
    pub fn tests_dir(&self) -> PathBuf {
        self.tests_dir
            .clone()
            .unwrap_or_else(|| self.src_dir.join("test").join("rpc-tests"))
    }

    /// Flag pointing tests at the built binaries
    pub fn srcdir_flag(&self) -> String {
        format!("--srcdir={}", self.build_dir.join("src").display())
    }

    pub fn cache_script(&self) -> Option<String> {
        self.cache_script
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn capture_grace(&self) -> Duration {
        Duration::from_secs(self.capture_grace_secs)
    }

    /// Windows builds are only tested when asked for explicitly
    pub fn is_windows_build(&self) -> bool {
        cfg!(windows) || self.exe_ext.eq_ignore_ascii_case(".exe")
    }
}

/// Build components the RPC tests depend on
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Components {
    pub wallet: bool,
    pub utils: bool,
    pub daemon: bool,
    pub zmq: bool,
}

impl Default for Components {
    fn default() -> Self {
        Self {
            wallet: true,
            utils: true,
            daemon: true,
            zmq: false,
        }
    }
}

impl Components {
    /// Wallet, utils and daemon must all be built
    pub fn check(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("wallet", self.wallet),
            ("utils", self.utils),
            ("daemon", self.daemon),
        ]
        .into_iter()
        .filter(|(_, enabled)| !enabled)
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(HarnessError::missing_components(&missing))
        }
    }
}
