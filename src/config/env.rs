//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::env;

/// Environment variable prefix
const ENV_PREFIX: &str = "RPC_HARNESS";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Source tree from RPC_HARNESS_SRCDIR
    pub src_dir: Option<String>,
    /// Build tree from RPC_HARNESS_BUILDDIR
    pub build_dir: Option<String>,
    /// Tests directory from RPC_HARNESS_TESTS_DIR
    pub tests_dir: Option<String>,
    /// Parallelism from RPC_HARNESS_PARALLEL
    pub parallel: Option<usize>,
    /// Config file from RPC_HARNESS_CONFIG
    pub config_file: Option<String>,
    /// Output format from RPC_HARNESS_FORMAT
    pub format: Option<String>,
    /// Verbose from RPC_HARNESS_VERBOSE
    pub verbose: Option<bool>,
    /// Log level from RPC_HARNESS_LOG
    pub log_level: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            src_dir: get_env("SRCDIR"),
            build_dir: get_env("BUILDDIR"),
            tests_dir: get_env("TESTS_DIR"),
            parallel: get_env_parse("PARALLEL"),
            config_file: get_env("CONFIG"),
            format: get_env("FORMAT"),
            verbose: get_env_bool("VERBOSE"),
            log_level: get_env("LOG"),
        }
    }

    /// Print current environment configuration
    pub fn print_summary(&self) {
        println!("Environment Configuration:");
        println!("  {}_SRCDIR:     {:?}", ENV_PREFIX, self.src_dir);
        println!("  {}_BUILDDIR:   {:?}", ENV_PREFIX, self.build_dir);
        println!("  {}_TESTS_DIR:  {:?}", ENV_PREFIX, self.tests_dir);
        println!("  {}_PARALLEL:   {:?}", ENV_PREFIX, self.parallel);
        println!("  {}_CONFIG:     {:?}", ENV_PREFIX, self.config_file);
        println!("  {}_FORMAT:     {:?}", ENV_PREFIX, self.format);
        println!("  {}_VERBOSE:    {:?}", ENV_PREFIX, self.verbose);
        println!("  {}_LOG:        {:?}", ENV_PREFIX, self.log_level);
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| parse_bool(&v))
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "1" | "true" | "yes" | "on" | "enabled"
    )
}

/// Print all RPC_HARNESS environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_SRCDIR      Source tree holding test/rpc-tests");
    println!("  {ENV_PREFIX}_BUILDDIR    Build tree holding the daemon binaries");
    println!("  {ENV_PREFIX}_TESTS_DIR   Directory of test scripts (overrides SRCDIR)");
    println!("  {ENV_PREFIX}_PARALLEL    Number of tests run at once");
    println!("  {ENV_PREFIX}_CONFIG      Path to configuration file");
    println!("  {ENV_PREFIX}_FORMAT      Output format (table, json, csv, summary)");
    println!("  {ENV_PREFIX}_VERBOSE     Enable debug logging (true/false)");
    println!("  {ENV_PREFIX}_LOG         Log level (trace, debug, info, warn, error)");
    println!();
    println!("Example:");
    println!("  export {ENV_PREFIX}_BUILDDIR=$PWD/build");
    println!("  rpc-harness run -parallel=8 wallet");
}
