//! Progress reporting for the exporter
//!
//! One line is printed per finished PV; the progress bar below the lines
//! tracks how many PVs are done.

use crate::export::TaskResult;
use crate::scheduler::{RunProgress, RunReport};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

/// Marker for an exported PV
pub const SUCCESS_MARK: &str = "✔";

/// Marker for a skipped or failed PV
pub const FAILURE_MARK: &str = "✘";

/// Progress reporter that prints per-PV lines under a progress bar
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a reporter for `total` PVs; a hidden bar still prints lines
    pub fn new(total: u64, show_bar: bool) -> Self {
        let bar = if show_bar {
            let bar = ProgressBar::new(total);
            if let Ok(bar_style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            {
                bar.set_style(bar_style.progress_chars("=> "));
            }
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        } else {
            ProgressBar::hidden()
        };

        Self { bar }
    }

    /// Report one finished PV
    pub fn report(&self, result: &TaskResult, progress: &RunProgress) {
        let line = format_result_line(result, progress);
        let line = if result.is_success() {
            style(line).green().to_string()
        } else {
            style(line).red().to_string()
        };

        // stdout in both modes; the bar redraws below the line
        self.bar.suspend(|| println!("{}", line));
        self.bar.inc(1);
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

/// Progress line for one finished PV
///
/// `✔ SR:Current (12/240, ✘: 3)` for an export,
/// `✘ jane: reserved name (12/240, ✘: 4)` for anything else.
pub fn format_result_line(result: &TaskResult, progress: &RunProgress) -> String {
    let mut line = match result.failure_reason() {
        None => format!("{} {}", SUCCESS_MARK, result.pv_name),
        Some(reason) => format!("{} {}: {}", FAILURE_MARK, result.pv_name, reason),
    };

    line.push_str(&format!(" ({}/{}", progress.exported, progress.total));
    if progress.failed > 0 {
        line.push_str(&format!(", {}: {}", FAILURE_MARK, progress.failed));
    }
    line.push(')');
    line
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| {
            chunk
                .iter()
                .rev()
                .map(|&b| b as char)
                .collect::<String>()
        })
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a summary of the run
pub fn print_summary(report: &RunReport, output_dir: &Path) {
    let duration_secs = report.duration.as_secs_f64();
    let samples = report.samples_written();
    let rate = if duration_secs > 0.0 {
        samples as f64 / duration_secs
    } else {
        0.0
    };

    println!();
    if report.completed {
        println!("{}", style("Export Complete").green().bold());
    } else {
        println!("{}", style("Export Interrupted").yellow().bold());
    }
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {}",
        style("Exported:").bold(),
        format_number(report.exported.len() as u64)
    );
    if !report.failed.is_empty() {
        println!(
            "  {} {}",
            style("Failed:").yellow().bold(),
            format_number(report.failed.len() as u64)
        );
    }
    println!("  {} {}", style("Samples:").bold(), format_number(samples));
    println!(
        "  {} {:.1}s ({:.0} samples/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    println!("  {} {}", style("Output:").bold(), output_dir.display());
    println!();
    println!("Successfully processed {} PVs", report.exported.len());
}

/// Print a header at the start of the run
pub fn print_header(archive: &str, output: &Path, workers: usize, pv_count: usize) {
    println!();
    println!(
        "{} {}",
        style("pv-export").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Archive:").bold(), archive);
    println!("  {} {}", style("Output:").bold(), output.display());
    println!("  {} {}", style("Workers:").bold(), workers);
    println!("  {} {}", style("PVs:").bold(), format_number(pv_count as u64));
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SkipReason;

    #[test]
    fn test_report_advances_hidden_bar() {
        let reporter = ProgressReporter::new(2, false);
        let progress = RunProgress {
            exported: 0,
            failed: 1,
            total: 2,
        };
        reporter.report(&TaskResult::skipped("jane", SkipReason::ReservedName), &progress);
        assert_eq!(reporter.bar.position(), 1);
        assert!(reporter.bar.is_hidden());
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }

    #[test]
    fn test_line_without_failures() {
        let result = TaskResult {
            pv_name: "SR:Current".into(),
            outcome: crate::export::TaskOutcome::Skipped {
                reason: SkipReason::TextValued,
            },
        };
        let progress = RunProgress {
            exported: 12,
            failed: 0,
            total: 240,
        };
        assert_eq!(
            format_result_line(&result, &progress),
            "✘ SR:Current: text-valued PV (12/240)"
        );
    }

    #[test]
    fn test_failure_line() {
        let result = TaskResult::skipped("jane", SkipReason::ReservedName);
        let progress = RunProgress {
            exported: 0,
            failed: 1,
            total: 4,
        };
        assert_eq!(
            format_result_line(&result, &progress),
            "✘ jane: reserved name (0/4, ✘: 1)"
        );

        let result = TaskResult::failed_with("SR:Bad", "Unknown PV 'SR:Bad'".into());
        assert_eq!(
            format_result_line(&result, &progress),
            "✘ SR:Bad: Unknown PV 'SR:Bad' (0/4, ✘: 1)"
        );
    }
}
