//! Progress reporting for packing and build runs
//!
//! Provides a spinner with live counters using indicatif, and the header and
//! summary printed around a run.

use crate::report::RunReport;
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress reporter that displays run status
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .expect("Invalid progress template")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the display before working on batch `current` of `total`
    pub fn update(&self, report: &RunReport, current: usize, total: usize) {
        let msg = format!(
            "Batch {}/{} | Files: {} | Size: {} | Built: {} | Skipped: {} | Recorded: {}",
            current,
            total,
            format_number(report.files_collected),
            format_size(report.bytes_collected, BINARY),
            report.archives_built + report.manifests_written,
            report.archives_already_built,
            report.archives_recorded,
        );

        self.bar.set_message(msg);
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a summary of a run
pub fn print_summary(title: &str, report: &RunReport, duration: Duration, output: &str) {
    println!();
    println!("{}", style(title).green().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Datasets:").bold(), format_number(report.datasets));
    println!(
        "  {} {} ({})",
        style("Files:").bold(),
        format_number(report.files_collected),
        format_size(report.bytes_collected, BINARY)
    );
    if report.files_already_archived > 0 {
        println!(
            "  {} {}",
            style("Already archived:").bold(),
            format_number(report.files_already_archived)
        );
    }
    println!("  {} {}", style("Archives built:").bold(), report.archives_built);
    if report.archives_already_built > 0 {
        println!("  {} {}", style("Already built:").bold(), report.archives_already_built);
    }
    if report.manifests_written > 0 {
        println!("  {} {}", style("Manifests:").bold(), report.manifests_written);
    }
    if report.archives_recorded > 0 {
        println!(
            "  {} {} ({} associations)",
            style("Recorded:").bold(),
            report.archives_recorded,
            format_number(report.associations_updated)
        );
    }
    println!("  {} {:.1}s", style("Duration:").bold(), duration.as_secs_f64());

    let problems = [
        ("Unreadable files:", report.files_unreadable),
        ("Oversized files:", report.files_oversized),
        ("Merges over max size:", report.oversized_merges),
        ("Failed members:", report.member_failures),
        ("Failed batches:", report.batches_failed),
        ("Catalog failures:", report.catalog_failures),
    ];
    for (label, count) in problems.iter().filter(|(_, count)| *count > 0) {
        println!("  {} {}", style(label).yellow().bold(), format_number(*count));
    }
    if !report.unregistered_datasets.is_empty() {
        let names: Vec<_> = report.unregistered_datasets.iter().map(String::as_str).collect();
        println!("  {} {}", style("Unregistered datasets:").yellow().bold(), names.join(", "));
    }

    println!("  {} {}", style("Output:").bold(), output);
    println!();
}

/// Print a header at the start of a run
pub fn print_header(command: &str, source: &str, output: &str) {
    println!();
    println!(
        "{} {} {}",
        style("dsarchive").cyan().bold(),
        env!("CARGO_PKG_VERSION"),
        style(command).dim()
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Source:").bold(), source);
    println!("  {} {}", style("Output:").bold(), output);
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
        assert_eq!(format_number(1234567890), "1,234,567,890");
    }
}
