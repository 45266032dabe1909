//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Functional test runner for the daemon's RPC test suite
#[derive(Parser, Debug)]
#[command(name = "rpc-harness")]
#[command(version = "0.1.0")]
#[command(about = "Run the RPC functional tests in parallel")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (defaults to the standard locations)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the selected tests (default)
    Run(RunArgs),

    /// List the test catalog
    List(ListArgs),

    /// Manage configuration files
    Config(ConfigArgs),
}

/// Arguments for run command
#[derive(Parser, Debug, Default)]
#[command(disable_help_flag = true)]
pub struct RunArgs {
    /// Tests to run, with or without extension; empty runs the basic suite
    pub tests: Vec<String>,

    /// Print the first selected test's own help and exit
    #[arg(short = 'h', long = "help")]
    pub help: bool,

    /// Print help for this command
    #[arg(long, action = ArgAction::Help)]
    pub harness_help: Option<bool>,

    /// Run the basic and extended suites
    #[arg(long)]
    pub extended: bool,

    /// Number of tests run at once
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub parallel: Option<u64>,

    /// Stop after the first failing test
    #[arg(long)]
    pub failfast: bool,

    /// Report RPC commands no test exercised
    #[arg(long)]
    pub coverage: bool,

    /// Run on Windows builds
    #[arg(long)]
    pub win: bool,

    /// Directory holding the test scripts
    #[arg(long, value_name = "DIR")]
    pub tests_dir: Option<PathBuf>,

    /// Output format (table, json, json-pretty, csv, summary)
    #[arg(short, long)]
    pub format: Option<String>,

    /// Save the run report to file (.csv for CSV, otherwise JSON)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Flags handed verbatim to every test
    #[arg(last = true)]
    pub pass_through: Vec<String>,
}

/// Arguments for list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Include the extended suite
    #[arg(short, long)]
    pub extended: bool,

    /// Show arguments next to each test
    #[arg(short, long)]
    pub detailed: bool,
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write an example configuration file
    Init {
        /// Output path
        #[arg(short, long, default_value = "./rpc-harness.yaml")]
        output: String,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Show the effective configuration
    Show {
        /// Show environment variables instead
        #[arg(short, long)]
        env: bool,

        /// Output format (yaml, json)
        #[arg(short, long, default_value = "yaml")]
        format: String,
    },

    /// Validate a configuration file
    Validate {
        /// File to validate (defaults to the first one found)
        file: Option<String>,
    },
}

const SUBCOMMANDS: &[&str] = &["run", "list", "config", "help"];

/// Run flags that take a value as the following token
const RUN_VALUE_FLAGS: &[&str] = &["--parallel", "--tests-dir", "--format", "--output", "--config"];

const RUN_SWITCHES: &[&str] = &[
    "--help",
    "--harness-help",
    "--extended",
    "--failfast",
    "--coverage",
    "--win",
    "--verbose",
];

/// Rewrite a legacy command line into the clap form.
///
/// `-parallel=N`, `-extended`, `-win`, `-help` and `-?` become their long
/// forms, `run` is implied when no subcommand is given, and any other
/// `--flag` is moved behind `--` so it reaches every test untouched.
pub fn normalize_args<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut raw = raw.into_iter().map(Into::into);
    let mut out: Vec<String> = raw.next().into_iter().collect();
    let rest: Vec<String> = raw.collect();

    let subcommand = first_positional(&rest);
    let is_run = match subcommand {
        Some(i) if SUBCOMMANDS.contains(&rest[i].as_str()) => rest[i] == "run",
        _ => !rest.iter().any(|a| a == "-V" || a == "--version"),
    };
    if !is_run {
        out.extend(rest);
        return out;
    }
    if !matches!(subcommand, Some(i) if rest[i] == "run") {
        out.push("run".to_string());
    }

    let mut pass_through = Vec::new();
    let mut tokens = rest.into_iter();
    while let Some(token) = tokens.next() {
        if token == "--" {
            pass_through.extend(tokens.by_ref());
            break;
        }
        let token = legacy_to_long(token);
        let flag = token.split('=').next().unwrap_or_default();

        if !token.starts_with("--") || RUN_SWITCHES.contains(&flag) {
            out.push(token);
        } else if RUN_VALUE_FLAGS.contains(&flag) {
            let needs_value = !token.contains('=');
            out.push(token);
            if needs_value {
                out.extend(tokens.next());
            }
        } else {
            pass_through.push(token);
        }
    }

    if !pass_through.is_empty() {
        out.push("--".to_string());
        out.extend(pass_through);
    }
    out
}

fn legacy_to_long(token: String) -> String {
    match token.as_str() {
        "-extended" | "-win" | "-help" => format!("-{token}"),
        "-?" => "--help".to_string(),
        _ if token.starts_with("-parallel=") => format!("-{token}"),
        _ => token,
    }
}

/// Index of the first token that is neither a flag nor a global flag's value
fn first_positional(tokens: &[String]) -> Option<usize> {
    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        if token == "--" {
            return None;
        }
        if token == "--config" {
            i += 2;
            continue;
        }
        if !token.starts_with('-') {
            return Some(i);
        }
        i += 1;
    }
    None
}
