//! RPC Harness - parallel runner for the daemon's RPC functional tests
//!
//! Runs the RPC test scripts as external processes, a bounded number at a
//! time, and reports each outcome as it arrives.
//!
//! ## Features
//!
//! - Basic, extended or explicitly named test selection
//! - Parallel execution with distinct port seeds per running test
//! - Fail-fast mode
//! - RPC coverage report across all tests
//! - Multiple output formats (Table, JSON, CSV)
//!
//! ## Usage
//!
//! ```bash
//! # Run the basic suite, 4 tests at a time
//! rpc-harness
//!
//! # Run two tests, 8 at a time, stop at the first failure
//! rpc-harness -parallel=8 --failfast wallet rest.py
//!
//! # Run everything and report uncovered RPC commands
//! rpc-harness run --extended --coverage
//!
//! # Hand extra flags to every test
//! rpc-harness wallet -- --nocleanup --tracerpc
//!
//! # List the catalog
//! rpc-harness list --extended --detailed
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use tracing::{debug, info, warn};

mod cli;
mod config;
mod coverage;
mod error;
mod executor;
mod models;
mod output;
mod selection;
mod utils;

use cli::Args;
use config::{ConfigFile, EnvConfig};
use coverage::CoverageSession;
use error::HarnessError;
use executor::{RunController, RunOptions};
use output::{OutputFormat, ResultFormatter};
use selection::SelectionMode;
use utils::logger::{init_logger, LogLevel};

#[tokio::main]
async fn main() {
    let args = Args::parse_from(cli::normalize_args(std::env::args()));

    let code = match dispatch(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            if e
                .downcast_ref::<HarnessError>()
                .is_some_and(HarnessError::is_environment)
            {
                eprintln!("Check the tests directory and the build tree");
            }
            1
        }
    };

    std::process::exit(code);
}

async fn dispatch(args: Args) -> Result<i32> {
    let env = EnvConfig::load();
    let mut config = ConfigFile::resolve(args.config.as_deref(), &env)?;
    config.apply_env(&env);

    let verbose = args.verbose || env.verbose.unwrap_or(false);
    init_logger(LogLevel::resolve(verbose, &config.app.log_level));

    match args.command {
        cli::Command::Run(run_args) => run_tests(run_args, config, &env).await,
        cli::Command::List(list_args) => {
            list_tests(list_args, &config);
            Ok(0)
        }
        cli::Command::Config(config_args) => {
            manage_config(config_args, &config)?;
            Ok(0)
        }
    }
}

async fn run_tests(args: cli::RunArgs, mut config: ConfigFile, env: &EnvConfig) -> Result<i32> {
    if let Some(dir) = args.tests_dir.clone() {
        config.app.tests_dir = Some(dir);
    }
    if let Some(parallel) = args.parallel {
        config.app.parallel = parallel as usize;
    }
    let app = &config.app;

    if app.is_windows_build() && !args.win {
        println!("Win tests currently disabled by default.  Use --win option to enable");
        return Ok(0);
    }

    app.components.check()?;
    if app.components.zmq {
        info!("zmq is enabled; zmq tests are not part of the catalog");
    }

    let mode = SelectionMode::resolve(args.extended, args.tests.clone());
    let selected = selection::select(&config.catalog, &mode);
    let tests_dir = app.tests_dir();

    if args.help {
        let status = executor::show_test_help(&tests_dir, selected.first()).await?;
        if !status.success() {
            anyhow::bail!("{} -h exited with {status}", selected[0].identifier);
        }
        return Ok(0);
    }

    if selected.is_empty() {
        warn!("No catalog entry matches {:?}", args.tests);
    }

    let format_name = args
        .format
        .as_deref()
        .or(env.format.as_deref())
        .unwrap_or("table");
    let format = OutputFormat::from_str(format_name)
        .ok_or_else(|| HarnessError::Config(format!("unknown output format: {format_name}")))?;
    let formatter = ResultFormatter::new(format);

    let session = if args.coverage {
        let session = CoverageSession::new()?;
        println!("Initializing coverage directory at {}\n", session.path().display());
        Some(session)
    } else {
        None
    };

    let mut flags = vec![app.srcdir_flag()];
    flags.extend(args.pass_through.iter().cloned());
    if let Some(session) = &session {
        flags.push(session.flag());
    }
    debug!("Shared flags: {:?}", flags);

    let options = RunOptions::new(&tests_dir)
        .with_width(app.parallel)
        .with_fail_fast(args.failfast)
        .with_cache_script(app.cache_script())
        .with_poll_interval(app.poll_interval())
        .with_capture_grace(app.capture_grace())
        .with_progress(format == OutputFormat::Table);
    let controller = RunController::new(options);

    let streaming = matches!(format, OutputFormat::Table | OutputFormat::Summary);
    let report = controller
        .run(selected, flags, |result| {
            if streaming {
                println!("{}", formatter.format_result(result));
            }
        })
        .await?;

    if report.aborted {
        println!("Early exiting after test failure");
    }
    println!("{}", formatter.format_report(&report));

    if let Some(session) = session {
        let coverage = session.report()?;
        println!("{}", formatter.format_coverage(&coverage));
        println!("Cleaning up coverage data");
        session.cleanup()?;
    }

    if let Some(path) = &args.output {
        output::write_report(path, &report)?;
        println!("Report saved to {}", path.display());
    }

    Ok(report.exit_code())
}

fn list_tests(args: cli::ListArgs, config: &ConfigFile) {
    let catalog = &config.catalog;
    let total = if args.extended {
        catalog.len()
    } else {
        catalog.basic.len()
    };
    println!("\nRPC Tests ({total} total)\n");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let mut groups = vec![("Basic", &catalog.basic)];
    if args.extended {
        groups.push(("Extended", &catalog.extended));
    }

    for (name, tests) in groups {
        println!("\n{name} Tests:");
        println!("──────────────────────────────────────────────────────────────────────");
        for (i, spec) in tests.iter().enumerate() {
            if args.detailed {
                println!("  {:2}. {:30} {}", i + 1, spec.identifier, spec.args.join(" "));
            } else {
                println!("  {:2}. {}", i + 1, spec.identifier);
            }
        }
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if args.detailed {
        println!("Tests directory: {}\n", config.app.tests_dir().display());
    }
}

fn manage_config(args: cli::ConfigArgs, effective: &ConfigFile) -> Result<()> {
    match args.action {
        cli::ConfigAction::Init { output, force } => {
            let path = Path::new(&output);
            if path.exists() && !force {
                anyhow::bail!(
                    "Configuration file already exists: {output}. Use --force to overwrite."
                );
            }

            ConfigFile::example().save(path)?;
            println!("✓ Configuration file created: {output}");
            println!("\nEdit the file to customize your settings.");
        }

        cli::ConfigAction::Show { env, format } => {
            if env {
                EnvConfig::load().print_summary();
                println!();
                config::print_env_help();
            } else {
                let output = if format == "json" {
                    serde_json::to_string_pretty(effective)?
                } else {
                    serde_yaml::to_string(effective)?
                };
                println!("{output}");
            }
        }

        cli::ConfigAction::Validate { file } => {
            let path = file
                .or_else(|| ConfigFile::find().map(|p| p.to_string_lossy().to_string()))
                .context("No configuration file found")?;

            match ConfigFile::load(&path) {
                Ok(_) => {
                    println!("✓ Configuration file is valid: {path}");
                }
                Err(e) => {
                    println!("✗ Configuration file is invalid: {path}");
                    println!("  Error: {e}");
                    return Err(e);
                }
            }
        }
    }

    Ok(())
}
