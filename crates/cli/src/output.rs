//! Output formatting utilities

use anyhow::{Context, Result};
use clap::ValueEnum;
use colored::Colorize;
use explorer_lib::{ContainerMetrics, HistoricalReport, MetricSummary};
use std::path::{Path, PathBuf};
use tabled::{settings::Style, Table, Tabled};

use crate::config::format_duration;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
    /// CSV file written to the current directory
    Csv,
}

/// Row for the historical usage table
#[derive(Tabled)]
struct UsageRow {
    #[tabled(rename = "Container")]
    container: String,
    #[tabled(rename = "Pod")]
    pod: String,
    #[tabled(rename = "Last")]
    last: String,
    #[tabled(rename = "Min")]
    min: String,
    #[tabled(rename = "Max")]
    max: String,
    #[tabled(rename = "Avg")]
    avg: String,
    #[tabled(rename = "Points")]
    points: u64,
}

impl From<&ContainerMetrics> for UsageRow {
    fn from(record: &ContainerMetrics) -> Self {
        let (last, min, max, avg) = match record.summary {
            MetricSummary::Cpu { last, min, max, avg } => (
                last.display(),
                min.display(),
                max.display(),
                avg.display(),
            ),
            MetricSummary::Memory { last, min, max } => (
                last.display(),
                min.display(),
                max.display(),
                "-".to_string(),
            ),
        };

        Self {
            container: record.container_name.clone(),
            pod: record.pod_name.clone(),
            last,
            min,
            max,
            avg,
            points: record.data_points,
        }
    }
}

/// Render a report as a rounded table
pub fn render_table(report: &HistoricalReport) -> String {
    let rows: Vec<UsageRow> = report.metrics.iter().map(UsageRow::from).collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Closing line printed under the table
pub fn totals_line(report: &HistoricalReport) -> String {
    format!(
        "Results shown are for a period of {}. {} data points were evaluated.",
        format_duration(report.duration),
        report.data_points()
    )
}

const CSV_HEADER: &str = "Container,Pod,Last,Min,Max,Avg,Points";

/// Render a report as CSV with the table's columns
pub fn render_csv(report: &HistoricalReport) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for record in &report.metrics {
        let row = UsageRow::from(record);
        let fields = [
            csv_field(&row.container),
            csv_field(&row.pod),
            csv_field(&row.last),
            csv_field(&row.min),
            csv_field(&row.max),
            csv_field(&row.avg),
            row.points.to_string(),
        ];
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// `kube-resource-usage-all` or `kube-resource-usage-<namespace>`
pub fn csv_file_prefix(namespace: Option<&str>) -> String {
    match namespace {
        Some(ns) => format!("kube-resource-usage-{}", ns),
        None => "kube-resource-usage-all".to_string(),
    }
}

/// Write the report to a timestamped CSV file in `dir`
pub fn export_csv(
    report: &HistoricalReport,
    namespace: Option<&str>,
    dir: &Path,
) -> Result<PathBuf> {
    let stamp = chrono::Local::now().format("%Y%m%d%H%M%S");
    let path = dir.join(format!("{}-{}.csv", csv_file_prefix(namespace), stamp));
    std::fs::write(&path, render_csv(report))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// Print a report in the requested format
pub fn print_report(
    report: &HistoricalReport,
    format: OutputFormat,
    namespace: Option<&str>,
) -> Result<()> {
    match format {
        OutputFormat::Csv => {
            let path = export_csv(report, namespace, Path::new("."))?;
            print_success(&format!(
                "Exported {} rows to {}",
                report.metrics.len(),
                path.display()
            ));
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Table => {
            if report.metrics.is_empty() {
                print_warning("No container metrics found");
                return Ok(());
            }
            println!(
                "{}",
                format!("Historical {} usage", report.kind).to_uppercase().bold()
            );
            println!("{}", render_table(report));
            print_info(&totals_line(report));
        }
    }
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}
