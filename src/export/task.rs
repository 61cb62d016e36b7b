//! Export tasks and their results
//!
//! A task names one PV and where its file goes. Tasks are immutable once
//! built and carry everything a worker needs to open its own archive
//! connection.

use crate::archive::{ArchiveParams, Channel, ChannelGroup};
use crate::error::{SkipReason, TaskError};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// PV names that are never exported
pub const RESERVED_PV_NAMES: &[&str] = &["jane", "freddy"];

/// Characters that make a PV name unusable as a path
pub const UNSAFE_CHARS: &[char] = &['/', '(', ')'];

/// Separates namespace segments in a PV name
pub const NAMESPACE_SEPARATOR: char = ':';

/// Extension of exported files
pub const FILE_EXTENSION: &str = "btsf";

/// One PV to export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTask {
    pv_name: String,
    output_dir: PathBuf,
    archive: ArchiveParams,
}

impl ExportTask {
    pub fn new(
        pv_name: impl Into<String>,
        output_dir: impl Into<PathBuf>,
        archive: ArchiveParams,
    ) -> Self {
        Self {
            pv_name: pv_name.into(),
            output_dir: output_dir.into(),
            archive,
        }
    }

    pub fn pv_name(&self) -> &str {
        &self.pv_name
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn archive(&self) -> &ArchiveParams {
        &self.archive
    }

    /// Path of this PV's BTSF file
    pub fn target_path(&self) -> PathBuf {
        target_path(&self.output_dir, &self.pv_name)
    }
}

/// Check a PV name against the naming policy
///
/// Returns why the PV must be skipped, or `None` when it can be exported.
pub fn check_pv_name(pv_name: &str) -> Option<SkipReason> {
    if pv_name.contains(UNSAFE_CHARS) {
        return Some(SkipReason::UnsafeName);
    }
    if RESERVED_PV_NAMES.iter().any(|reserved| *reserved == pv_name) {
        return Some(SkipReason::ReservedName);
    }

    // `SR::A` would share a file with `SR:A`
    let unsafe_segment = pv_name
        .split(NAMESPACE_SEPARATOR)
        .any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if unsafe_segment {
        return Some(SkipReason::UnsafeName);
    }

    None
}

/// Map a PV name to its file below `output_dir`
///
/// `A:B:C` becomes `A/B/C.btsf`. Only meaningful for names that pass
/// [`check_pv_name`].
pub fn target_path(output_dir: &Path, pv_name: &str) -> PathBuf {
    let mut path = output_dir.to_path_buf();
    let mut segments: Vec<&str> = pv_name.split(NAMESPACE_SEPARATOR).collect();
    let leaf = segments.pop().unwrap_or_default();

    for segment in segments {
        path.push(segment);
    }
    path.push(format!("{}.{}", leaf, FILE_EXTENSION));
    path
}

/// How a task starts writing its file
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExportState {
    /// No usable records yet; the file is (re)created
    Fresh,
    /// Append samples strictly after `last_time`
    Resume { last_time: f64 },
}

impl ExportState {
    /// Sample cursor for the archive query
    pub fn cursor(&self) -> Option<f64> {
        match self {
            ExportState::Fresh => None,
            ExportState::Resume { last_time } => Some(*last_time),
        }
    }
}

/// What happened to one PV
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Exported {
        channel: Channel,
        group: ChannelGroup,
        /// Records appended by this run
        samples: u64,
        state: ExportState,
    },
    Skipped {
        reason: SkipReason,
    },
    Failed {
        error: String,
    },
}

/// Result reported for every task
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub pv_name: String,

    #[serde(flatten)]
    pub outcome: TaskOutcome,
}

impl TaskResult {
    pub fn skipped(pv_name: &str, reason: SkipReason) -> Self {
        Self {
            pv_name: pv_name.to_string(),
            outcome: TaskOutcome::Skipped { reason },
        }
    }

    pub fn failed(pv_name: &str, error: &TaskError) -> Self {
        Self::failed_with(pv_name, error.to_string())
    }

    pub fn failed_with(pv_name: &str, error: String) -> Self {
        Self {
            pv_name: pv_name.to_string(),
            outcome: TaskOutcome::Failed { error },
        }
    }

    /// True when the PV was exported, even if no new samples were found
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Exported { .. })
    }

    /// Records appended for this PV
    pub fn samples(&self) -> u64 {
        match &self.outcome {
            TaskOutcome::Exported { samples, .. } => *samples,
            _ => 0,
        }
    }

    /// Short failure description for progress lines
    pub fn failure_reason(&self) -> Option<String> {
        match &self.outcome {
            TaskOutcome::Exported { .. } => None,
            TaskOutcome::Skipped { reason } => Some(reason.to_string()),
            TaskOutcome::Failed { error } => Some(error.clone()),
        }
    }
}
