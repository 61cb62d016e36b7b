//! Per-PV export pipeline
//!
//! # Architecture
//!
//! ```text
//!   ExportTask
//!       │
//!       ▼
//!  check_pv_name ──── unsafe / reserved ───▶ Skipped
//!       │
//!       ▼
//!  connect + channel, group, value kind ─── text ───▶ Skipped
//!       │
//!       ▼
//!  decide_state (Fresh | Resume { last_time })
//!       │
//!       ▼
//!  open_writer ──▶ stream_samples ──▶ finish ──▶ Exported
//! ```
//!
//! Any error along the way ends the task as `Failed`; it never affects
//! other tasks.

pub mod resume;
pub mod selector;
pub mod stream;
pub mod task;

pub use resume::{decide_state, open_writer};
pub use selector::PvSelector;
pub use stream::stream_samples;
pub use task::{check_pv_name, ExportState, ExportTask, TaskOutcome, TaskResult};

use crate::archive::{Archive, ArchiveConnector};
use crate::error::{SkipReason, TaskError};
use std::fs;
use tracing::{debug, warn};

/// Export one PV
///
/// Opens its own archive connection, so it can run on any worker thread.
pub fn process_task<C: ArchiveConnector>(task: &ExportTask, connector: &C) -> TaskResult {
    let pv_name = task.pv_name();

    if let Some(reason) = check_pv_name(pv_name) {
        debug!(pv = %pv_name, reason = %reason, "PV skipped");
        return TaskResult::skipped(pv_name, reason);
    }

    match export_pv(task, connector) {
        Ok(outcome) => TaskResult {
            pv_name: pv_name.to_string(),
            outcome,
        },
        Err(e) => {
            warn!(pv = %pv_name, error = %e, "PV export failed");
            TaskResult::failed(pv_name, &e)
        }
    }
}

fn export_pv<C: ArchiveConnector>(
    task: &ExportTask,
    connector: &C,
) -> Result<TaskOutcome, TaskError> {
    let pv_name = task.pv_name();
    let archive = connector.connect(task.archive())?;

    let channel_id = archive.channel_id(pv_name)?;
    let channel = archive.channel(channel_id)?;
    let group = archive.group(channel.group_id)?;
    let kind = archive.value_kind(pv_name)?;

    let Some(metric_type) = kind.metric_type() else {
        debug!(pv = %pv_name, "Text-valued PV skipped");
        archive.close()?;
        return Ok(TaskOutcome::Skipped {
            reason: SkipReason::TextValued,
        });
    };

    let path = task.target_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| TaskError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let state = decide_state(&path)?;
    let mut writer = open_writer(&path, state, pv_name, metric_type)?;
    let samples = stream_samples(&archive, &channel, kind, state, &mut writer)?;
    writer.finish().map_err(|source| TaskError::Output {
        path: path.clone(),
        source,
    })?;
    archive.close()?;

    debug!(
        pv = %pv_name,
        channel = channel.id,
        group = %group.name,
        samples = samples,
        resumed = matches!(state, ExportState::Resume { .. }),
        "PV exported"
    );

    Ok(TaskOutcome::Exported {
        channel,
        group,
        samples,
        state,
    })
}
