//! pv-export - Channel archive to BTSF exporter
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use pv_export::archive::{Archive, ArchiveConnector, SqliteConnector};
use pv_export::config::{CliArgs, ExportConfig};
use pv_export::progress::{print_header, print_summary, ProgressReporter};
use pv_export::report::{write_report, RunSummary};
use pv_export::scheduler::ExportCoordinator;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    // Validate and create config
    let config = ExportConfig::from_args(args).context("Invalid configuration")?;

    // Select PVs on a short-lived connection
    let connector = SqliteConnector;
    let archive = connector
        .connect(&config.archive)
        .context("Failed to connect to archive")?;
    let pv_names = config
        .selector
        .select(&archive)
        .context("Failed to list PVs")?;
    archive.close().context("Failed to close archive")?;
    info!(count = pv_names.len(), "PVs selected");

    print_header(
        &config.archive.to_display_string(),
        &config.output_dir,
        config.worker_count,
        pv_names.len(),
    );

    let tasks = config.tasks(pv_names);
    let coordinator = ExportCoordinator::new(connector, config.worker_count);

    // Setup signal handler for graceful shutdown
    let shutdown_flag = coordinator.shutdown_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, finishing running exports...");
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let progress = ProgressReporter::new(tasks.len() as u64, config.show_progress);
    let started_at = Utc::now();

    let report = coordinator
        .run(tasks, |result, tally| progress.report(result, tally))
        .context("Export failed")?;

    if report.completed {
        progress.finish("Export completed");
    } else {
        progress.finish("Export interrupted");
        info!("Export was interrupted before completion");
    }

    print_summary(&report, &config.output_dir);

    if let Some(path) = &config.report_path {
        let summary = RunSummary::new(
            &report,
            config.archive.to_display_string(),
            &config.output_dir,
            started_at,
        );
        write_report(path, &summary)
            .with_context(|| format!("Failed to write report to '{}'", path.display()))?;
        info!(path = %path.display(), "Report written");
    }

    // Per-PV failures are reported above and do not fail the run
    if !report.failed.is_empty() {
        info!(failed = report.failed.len(), "Export completed with failures");
    }

    Ok(())
}

/// Setup tracing/logging
fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("pv_export=debug,warn")
    } else {
        EnvFilter::new("pv_export=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
