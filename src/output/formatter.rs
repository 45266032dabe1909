//! Output formatters for run results
//!
//! Provides table, JSON, CSV and summary output formats.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, IsTerminal};
use std::path::Path;
use tracing::debug;

use crate::coverage::CoverageReport;
use crate::models::{JobResult, RunReport};

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Csv,
    Summary,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "csv" => Some(OutputFormat::Csv),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }
}

const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Result formatter
pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ResultFormatter {
    /// Bold output is used on unix terminals only
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: cfg!(unix) && std::io::stdout().is_terminal(),
        }
    }

    #[cfg(test)]
    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    fn bold(&self, text: &str) -> String {
        if self.colorize {
            format!("{BOLD}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    /// Format one delivered result
    pub fn format_result(&self, result: &JobResult) -> String {
        match self.format {
            OutputFormat::Table => self.format_result_table(result),
            OutputFormat::Json => serde_json::to_string(result).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(result).unwrap_or_default(),
            OutputFormat::Csv => csv_rows(std::slice::from_ref(result), false),
            OutputFormat::Summary => result.to_string(),
        }
    }

    fn format_result_table(&self, result: &JobResult) -> String {
        let mut output = String::new();
        output.push_str(&format!("\n{}:\n", self.bold(&result.name)));
        output.push_str(&result.stdout);
        if !result.stdout.ends_with('\n') {
            output.push('\n');
        }
        if !result.stderr.is_empty() {
            output.push_str("stderr:\n");
            output.push_str(&result.stderr);
            if !result.stderr.ends_with('\n') {
                output.push('\n');
            }
        }
        output.push_str(&format!(
            "Pass: {}, Duration: {:.1} s\n",
            self.bold(&result.passed.to_string()),
            result.duration_secs()
        ));
        output
    }

    /// Format the final run report
    pub fn format_report(&self, report: &RunReport) -> String {
        match self.format {
            OutputFormat::Table => self.format_report_table(report),
            OutputFormat::Json => serde_json::to_string(report).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Csv => csv_rows(&report.results, true),
            OutputFormat::Summary => self.format_report_brief(report),
        }
    }

    fn format_report_table(&self, report: &RunReport) -> String {
        let width = report
            .results
            .iter()
            .map(|r| r.name.len())
            .chain(std::iter::once("TEST".len()))
            .max()
            .unwrap_or(4);

        let mut output = String::new();
        output.push_str(&self.bold(&format!(
            "{:width$} | {} | {}\n\n",
            "TEST", "PASSED", "DURATION"
        )));

        for result in &report.results {
            output.push_str(&format!(
                "{:width$} | {:6} | {:.1} s\n",
                result.name,
                result.passed.to_string(),
                result.duration_secs()
            ));
        }

        output.push_str(&self.bold(&format!(
            "\n{:width$} | {:6} | {:.1} s (accumulated)\n",
            "ALL",
            report.all_passed().to_string(),
            report.accumulated_ms() as f64 / 1000.0
        )));

        if report.aborted {
            output.push_str(&format!(
                "\nStopped after first failure, {} of {} test(s) reported\n",
                report.results.len(),
                report.selected
            ));
        }

        output.push_str(&format!(
            "\nRuntime: {} s\n",
            report.runtime_ms / 1000
        ));
        output
    }

    fn format_report_brief(&self, report: &RunReport) -> String {
        let mut output = format!(
            "{}/{} passed in {:.1}s{}",
            report.passed(),
            report.selected,
            report.runtime_ms as f64 / 1000.0,
            if report.aborted { " (stopped early)" } else { "" }
        );
        let failed: Vec<&str> = report.failures().map(|r| r.name.as_str()).collect();
        if !failed.is_empty() {
            output.push_str(&format!("\nFailed: {}", failed.join(", ")));
        }
        output
    }

    /// Format the uncovered-command listing
    pub fn format_coverage(&self, coverage: &CoverageReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string(coverage).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(coverage).unwrap_or_default(),
            _ => coverage.to_string(),
        }
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}

fn csv_rows(results: &[JobResult], header: bool) -> String {
    match write_csv_rows(results, header) {
        Ok(rows) => rows,
        Err(e) => {
            debug!("CSV rendering failed: {:#}", e);
            String::new()
        }
    }
}

fn write_csv_rows(results: &[JobResult], header: bool) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    if header {
        writer.write_record(["test", "passed", "duration_ms", "port_seed"])?;
    }
    for result in results {
        writer.write_record([
            result.name.clone(),
            result.passed.to_string(),
            result.duration_ms.to_string(),
            result.port_seed.to_string(),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV rows: {}", e.error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Save a run report; `.csv` files get one row per test, anything else JSON
pub fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    let is_csv = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);

    if is_csv {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        writer.write_record(["test", "passed", "duration_ms", "port_seed", "stderr"])?;
        for result in &report.results {
            writer.write_record([
                result.name.clone(),
                result.passed.to_string(),
                result.duration_ms.to_string(),
                result.port_seed.to_string(),
                result.stderr.clone(),
            ])?;
        }
        writer.flush()?;
    } else {
        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), report)
            .context("Failed to write report")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn report() -> RunReport {
        let mut report = RunReport::new(2);
        let mut ok = JobResult::pass("wallet.py", 12_000);
        ok.stdout = "Initializing test directory\n".to_string();
        report.push(ok);
        report.push(JobResult::fail("rest.py", 3_000, "Assertion failed"));
        report
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::from_str("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_str("TABLE"), Some(OutputFormat::Table));
        assert_eq!(OutputFormat::from_str("unknown"), None);
    }

    #[test]
    fn test_formatter_creation() {
        let formatter = ResultFormatter::new(OutputFormat::Json).no_color();
        assert_eq!(formatter.format, OutputFormat::Json);
        assert!(!formatter.colorize);
    }

    #[test]
    fn test_format_result_table_shows_stderr() {
        let formatter = ResultFormatter::new(OutputFormat::Table).no_color();
        let output = formatter.format_result(&JobResult::fail("rest.py", 1_500, "boom"));
        assert!(output.contains("rest.py:"));
        assert!(output.contains("stderr:\nboom\n"));
        assert!(output.contains("Pass: false, Duration: 1.5 s"));

        let output = formatter.format_result(&JobResult::pass("ok.py", 0));
        assert!(!output.contains("stderr:"));
    }

    #[test]
    fn test_format_report_table() {
        let formatter = ResultFormatter::new(OutputFormat::Table).no_color();
        let output = formatter.format_report(&report());
        assert!(output.starts_with("TEST      | PASSED | DURATION"));
        assert!(output.contains("wallet.py | true   | 12.0 s"));
        assert!(output.contains("ALL       | false  | 15.0 s (accumulated)"));
        assert!(output.contains("Runtime: 0 s"));
    }

    #[test]
    fn test_format_report_csv() {
        let formatter = ResultFormatter::new(OutputFormat::Csv);
        let output = formatter.format_report(&report());
        let mut lines = output.lines();
        assert_eq!(lines.next(), Some("test,passed,duration_ms,port_seed"));
        assert_eq!(lines.next(), Some("wallet.py,true,12000,0"));
    }

    #[test]
    fn test_format_report_summary_lists_failures() {
        let formatter = ResultFormatter::new(OutputFormat::Summary);
        let output = formatter.format_report(&report());
        assert_eq!(output, "1/2 passed in 0.0s\nFailed: rest.py");

        let mut clean = RunReport::new(1);
        clean.push(JobResult::pass("ok.py", 10));
        assert!(!formatter.format_report(&clean).contains("Failed"));
    }

    #[test]
    fn test_csv_rows_escape_separators() {
        let mut result = JobResult::pass("odd,name.py", 5);
        result.port_seed = 3;
        assert_eq!(csv_rows(&[result], false), "\"odd,name.py\",true,5,3\n");
    }

    #[test]
    fn test_format_report_json() {
        let formatter = ResultFormatter::new(OutputFormat::Json);
        let value: serde_json::Value =
            serde_json::from_str(&formatter.format_report(&report())).unwrap();
        assert_eq!(value["results"][1]["name"], "rest.py");
        assert_eq!(value["selected"], 2);
    }

    #[test]
    fn test_write_report_json_and_csv() {
        let dir = tempdir().unwrap();

        let json = dir.path().join("report.json");
        write_report(&json, &report()).unwrap();
        let loaded: RunReport =
            serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
        assert_eq!(loaded.results.len(), 2);

        let csv_path = dir.path().join("report.csv");
        write_report(&csv_path, &report()).unwrap();
        let mut reader = csv::Reader::from_path(&csv_path).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[1][4], "Assertion failed");
    }

    #[test]
    fn test_format_coverage() {
        let coverage = CoverageReport {
            total: 2,
            uncovered: vec!["getinfo".to_string()],
        };
        let formatter = ResultFormatter::new(OutputFormat::Table);
        assert!(formatter.format_coverage(&coverage).contains("  - getinfo"));
    }
}
