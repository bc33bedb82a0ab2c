//! Output formatting utilities

use advisor_lib::{Confidence, ErrorReport, OperationResult, SessionStatus, Tier};
use anyhow::{Context, Result};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON operation envelope
    Json,
}

/// Print a table of rows, or nothing when empty
pub fn print_table<T: Tabled>(items: &[T]) {
    if items.is_empty() {
        return;
    }
    let table = Table::new(items).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print an operation envelope as pretty JSON on stdout
pub fn print_envelope<T: Serialize>(envelope: &OperationResult<T>) -> Result<()> {
    let json = serde_json::to_string_pretty(envelope).context("Failed to serialize result")?;
    println!("{}", json);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message with its remediation hint
pub fn print_error(subject: &str, error: &ErrorReport) {
    eprintln!(
        "{} {}: {} ({})",
        "✗".red().bold(),
        subject,
        error.message,
        error.kind
    );
    if let Some(hint) = &error.remediation {
        eprintln!("  {} {}", "hint:".dimmed(), hint);
    }
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    if bytes >= GB {
        format!("{:.2}Gi", bytes / GB)
    } else if bytes >= MB {
        format!("{:.2}Mi", bytes / MB)
    } else if bytes >= KB {
        format!("{:.2}Ki", bytes / KB)
    } else {
        format!("{:.0}B", bytes)
    }
}

/// Format a metric value, switching to byte units for memory
pub fn format_value(value: f64, bytes: bool) -> String {
    if bytes {
        format_bytes(value)
    } else if value.abs() >= 100.0 || value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}

/// Color a tier by how much capacity it represents
pub fn color_tier(tier: Tier) -> String {
    let label = tier.label();
    match tier {
        Tier::T0 | Tier::T1 => label.green().to_string(),
        Tier::T2 => label.cyan().to_string(),
        Tier::T3 => label.yellow().to_string(),
        Tier::T4 => label.red().bold().to_string(),
    }
}

/// Color confidence based on value
pub fn color_confidence(confidence: Confidence) -> String {
    let formatted = confidence.to_string();
    match confidence {
        Confidence::High => formatted.green().to_string(),
        Confidence::Medium => formatted.yellow().to_string(),
        Confidence::Low => formatted.red().to_string(),
    }
}

/// Color session status
pub fn color_status(status: SessionStatus) -> String {
    let formatted = status.to_string();
    match status {
        SessionStatus::Completed => formatted.green().to_string(),
        SessionStatus::Cancelled => formatted.yellow().to_string(),
        SessionStatus::Empty => formatted.red().to_string(),
    }
}
