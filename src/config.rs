//! Configuration types for pv-export
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//! - Task list construction from the selected PV names

use crate::archive::ArchiveParams;
use crate::error::ConfigError;
use crate::export::{ExportTask, PvSelector};
use clap::Parser;
use std::path::PathBuf;

/// Maximum reasonable worker count
const MAX_WORKERS: usize = 512;

/// Export archived PVs into per-channel BTSF files
#[derive(Parser, Debug, Clone)]
#[command(
    name = "pv-export",
    version,
    about = "Export archived PVs into per-channel binary time-series files",
    long_about = "Copies the sample history of every selected PV from the channel archive into \
                  one BTSF file per PV below OUTPUT_DIR.\n\n\
                  Re-running the export only appends samples recorded since the last run.",
    after_help = "EXAMPLES:\n    \
        pv-export archive.db ./btsf\n    \
        pv-export /srv/archive ./btsf --db-name archive -j 16\n    \
        pv-export archive.db ./btsf --include 'SR:' --exclude '.*:Spare'"
)]
pub struct CliArgs {
    /// Archive host (a database file, or a directory holding <DB_NAME>.db)
    #[arg(value_name = "DB_HOST")]
    pub db_host: String,

    /// Directory to write BTSF files into
    #[arg(value_name = "OUTPUT_DIR")]
    pub output_folder: PathBuf,

    /// Archive user; only labels the run in the header, logs and report (no effect on the SQLite backend)
    #[arg(long, default_value = "report", value_name = "USER")]
    pub db_user: String,

    /// Archive port; only labels the run in the header, logs and report (no effect on the SQLite backend)
    #[arg(long, default_value = "5432", value_name = "PORT")]
    pub db_port: u16,

    /// Archive database name
    #[arg(long, default_value = "archive", value_name = "NAME")]
    pub db_name: String,

    /// Number of parallel export workers
    #[arg(short = 'j', long, default_value = "8", value_name = "NUM")]
    pub processes: usize,

    /// PVs to be included (regex, can be repeated; default: .*)
    #[arg(long = "include", value_name = "REGEX", action = clap::ArgAction::Append)]
    pub include: Vec<String>,

    /// PVs to be excluded (regex, can be repeated; none by default)
    #[arg(long = "exclude", value_name = "REGEX", action = clap::ArgAction::Append)]
    pub exclude: Vec<String>,

    /// Write a JSON report of the run to this file
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Quiet mode - hide the progress bar
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Archive connection parameters
    pub archive: ArchiveParams,

    /// Root directory for BTSF files
    pub output_dir: PathBuf,

    /// Number of worker threads
    pub worker_count: usize,

    /// Compiled include/exclude patterns
    pub selector: PvSelector,

    /// JSON report destination
    pub report_path: Option<PathBuf>,

    /// Show progress bar
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl ExportConfig {
    /// Create and validate configuration from CLI arguments
    ///
    /// The output directory is created when missing.
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        if args.processes == 0 || args.processes > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: args.processes,
                max: MAX_WORKERS,
            });
        }

        let selector = PvSelector::new(&args.include, &args.exclude)?;

        let output_dir = args.output_folder;
        if output_dir.exists() && !output_dir.is_dir() {
            return Err(ConfigError::InvalidOutputDir {
                path: output_dir,
                reason: "exists and is not a directory".to_string(),
            });
        }
        std::fs::create_dir_all(&output_dir).map_err(|e| ConfigError::InvalidOutputDir {
            path: output_dir.clone(),
            reason: e.to_string(),
        })?;

        if let Some(report) = &args.report {
            if let Some(parent) = report.parent() {
                if !parent.as_os_str().is_empty() && !parent.is_dir() {
                    return Err(ConfigError::InvalidReportPath {
                        path: report.clone(),
                        reason: format!("Parent directory '{}' does not exist", parent.display()),
                    });
                }
            }
        }

        Ok(Self {
            archive: ArchiveParams {
                host: args.db_host,
                port: args.db_port,
                user: args.db_user,
                dbname: args.db_name,
            },
            output_dir,
            worker_count: args.processes,
            selector,
            report_path: args.report,
            show_progress: !args.quiet,
            verbose: args.verbose,
        })
    }

    /// One export task per selected PV
    pub fn tasks(&self, pv_names: Vec<String>) -> Vec<ExportTask> {
        pv_names
            .into_iter()
            .map(|pv| ExportTask::new(pv, self.output_dir.clone(), self.archive.clone()))
            .collect()
    }
}
