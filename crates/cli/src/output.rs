//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use stats_lib::MetricRecord;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print rows as a rounded table
pub fn print_table<T: Tabled>(rows: Vec<T>) {
    if rows.is_empty() {
        println!("{}", "No items found".yellow());
        return;
    }
    println!("{}", Table::new(rows).with(Style::rounded()));
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Two decimals, `-` when there is no reading
pub fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.2}"),
        None => "-".to_string(),
    }
}

/// Color a thread usage percentage against the alert threshold
pub fn color_usage(used: f64, threshold: f64) -> String {
    let formatted = format!("{used:.2}");
    if used >= threshold {
        formatted.red().bold().to_string()
    } else if used >= threshold * 0.75 {
        formatted.yellow().to_string()
    } else {
        formatted.green().to_string()
    }
}

/// Color a host collection status
pub fn color_status(status: &str) -> String {
    match status {
        "ok" => status.green().to_string(),
        "fallback" => status.yellow().to_string(),
        "failed" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Row for flattened metric tables
#[derive(Tabled)]
pub struct RecordRow {
    #[tabled(rename = "Resource")]
    pub resource: String,
    #[tabled(rename = "Key")]
    pub key: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

impl RecordRow {
    pub fn new(resource: &str, record: &MetricRecord) -> Self {
        Self {
            resource: resource.to_string(),
            key: record.key.clone(),
            value: format!("{:.2}", record.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(Some(91.456)), "91.46");
        assert_eq!(format_value(None), "-");
    }

    #[test]
    fn test_record_row() {
        let record = MetricRecord {
            key: "EdgePerformanceMetrics|CPU_Stats|Cores:0|USAGE".into(),
            timestamp: 1,
            value: 45.5,
        };
        let row = RecordRow::new("edge-01", &record);
        assert_eq!(row.value, "45.50");
        assert_eq!(row.resource, "edge-01");
    }
}
