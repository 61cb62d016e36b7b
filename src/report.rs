//! JSON run report
//!
//! Written with `--report FILE` after a run. Holds one entry per finished
//! PV, split into exported and failed lists.

use crate::error::Result;
use crate::export::TaskResult;
use crate::scheduler::RunReport;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Serialized form of a run
#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
    pub version: &'static str,
    pub archive: String,
    pub output_dir: &'a Path,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub completed: bool,
    pub total: usize,
    pub samples_written: u64,
    pub exported: &'a [TaskResult],
    pub failed: &'a [TaskResult],
}

impl<'a> RunSummary<'a> {
    pub fn new(
        report: &'a RunReport,
        archive: String,
        output_dir: &'a Path,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            archive,
            output_dir,
            started_at,
            duration_secs: report.duration.as_secs_f64(),
            completed: report.completed,
            total: report.total,
            samples_written: report.samples_written(),
            exported: &report.exported,
            failed: &report.failed,
        }
    }
}

/// Write the summary as pretty-printed JSON
pub fn write_report(path: &Path, summary: &RunSummary<'_>) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, summary)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SkipReason;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_write_report() {
        let dir = tempdir().unwrap();
        let report = RunReport {
            exported: vec![],
            failed: vec![
                TaskResult::skipped("jane", SkipReason::ReservedName),
                TaskResult::failed_with("SR:Bad", "boom".into()),
            ],
            total: 2,
            duration: Duration::from_millis(1500),
            completed: true,
        };

        let path = dir.path().join("report.json");
        let summary = RunSummary::new(&report, "report@archive.db:5432/archive".into(), dir.path(), Utc::now());
        write_report(&path, &summary).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["total"], 2);
        assert_eq!(json["completed"], true);
        assert_eq!(json["duration_secs"], 1.5);
        assert_eq!(json["failed"][0]["pv_name"], "jane");
        assert_eq!(json["failed"][1]["status"], "failed");
        assert_eq!(json["exported"].as_array().unwrap().len(), 0);
    }
}
