//! Resume detection
//!
//! An existing file with at least one record is extended; a missing or
//! record-less file is (re)created from scratch. A file that exists but
//! cannot be parsed fails the task rather than being overwritten.

use super::task::ExportState;
use crate::btsf::{BinaryTimeSeriesFile, IntroSection, Metric, MetricType};
use crate::error::{BtsfError, TaskError};
use std::path::Path;
use tracing::debug;

/// Spare bytes reserved after the annotations payload of a new file
pub const ANNOTATION_CAPACITY: u32 = 512 * 1024;

/// Decide how to start writing `path`
pub fn decide_state(path: &Path) -> Result<ExportState, TaskError> {
    let file = match BinaryTimeSeriesFile::open_read(path) {
        Ok(file) => file,
        Err(BtsfError::NotFound { .. }) => return Ok(ExportState::Fresh),
        Err(source) => {
            return Err(TaskError::ExistingFile {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    match file.last() {
        Ok(record) => {
            debug!(path = %path.display(), last_time = record.time, records = file.len(), "Resuming");
            Ok(ExportState::Resume {
                last_time: record.time,
            })
        }
        Err(BtsfError::Empty) => Ok(ExportState::Fresh),
        Err(source) => Err(TaskError::ExistingFile {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Metrics of a new file for `pv_name`
pub fn file_metrics(pv_name: &str, metric_type: MetricType) -> Vec<Metric> {
    vec![Metric::time(), Metric::new(pv_name, metric_type)]
}

/// Empty annotations section for a new file
pub fn annotation_section() -> IntroSection {
    let payload = serde_json::Value::Object(serde_json::Map::new())
        .to_string()
        .into_bytes();
    IntroSection::annotations(payload, ANNOTATION_CAPACITY)
}

/// Open the writer for `path` according to `state`
///
/// A resumed file must store the same value type the PV records now.
pub fn open_writer(
    path: &Path,
    state: ExportState,
    pv_name: &str,
    metric_type: MetricType,
) -> Result<BinaryTimeSeriesFile, TaskError> {
    match state {
        ExportState::Fresh => BinaryTimeSeriesFile::create(
            path,
            file_metrics(pv_name, metric_type),
            vec![annotation_section()],
        )
        .map_err(|source| TaskError::Output {
            path: path.to_path_buf(),
            source,
        }),
        ExportState::Resume { .. } => {
            let file = BinaryTimeSeriesFile::open_append(path).map_err(|source| {
                TaskError::ExistingFile {
                    path: path.to_path_buf(),
                    source,
                }
            })?;

            let found = file.value_metric().metric_type;
            if found != metric_type {
                return Err(TaskError::MetricMismatch {
                    path: path.to_path_buf(),
                    expected: metric_type.name(),
                    found: found.name(),
                });
            }
            Ok(file)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_fresh() {
        let dir = tempdir().unwrap();
        let state = decide_state(&dir.path().join("missing.btsf")).unwrap();
        assert_eq!(state, ExportState::Fresh);
    }

    #[test]
    fn test_header_only_file_is_fresh() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pv.btsf");
        let file = open_writer(&path, ExportState::Fresh, "PV", MetricType::Double).unwrap();
        file.finish().unwrap();

        assert_eq!(decide_state(&path).unwrap(), ExportState::Fresh);
    }

    #[test]
    fn test_existing_records_resume() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pv.btsf");
        let mut file = open_writer(&path, ExportState::Fresh, "PV", MetricType::Int64).unwrap();
        file.append(10.0, 1i64).unwrap();
        file.append(12.5, 2i64).unwrap();
        file.finish().unwrap();

        assert_eq!(
            decide_state(&path).unwrap(),
            ExportState::Resume { last_time: 12.5 }
        );
    }

    #[test]
    fn test_garbage_file_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pv.btsf");
        std::fs::write(&path, b"not a btsf file at all").unwrap();

        let err = decide_state(&path).unwrap_err();
        assert!(matches!(err, TaskError::ExistingFile { .. }));
        assert_eq!(std::fs::read(&path).unwrap(), b"not a btsf file at all");
    }

    #[test]
    fn test_new_file_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pv.btsf");
        open_writer(&path, ExportState::Fresh, "SR:Current", MetricType::Double)
            .unwrap()
            .finish()
            .unwrap();

        let file = BinaryTimeSeriesFile::open_read(&path).unwrap();
        assert_eq!(file.metrics().len(), 2);
        assert!(file.metrics()[0].is_time);
        assert_eq!(file.value_metric().name, "SR:Current");
        assert_eq!(file.intro_sections().len(), 1);
        assert_eq!(file.intro_sections()[0].payload, b"{}");
        assert_eq!(file.intro_sections()[0].followup_size, ANNOTATION_CAPACITY + 14);
    }

    #[test]
    fn test_resume_type_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pv.btsf");
        let mut file = open_writer(&path, ExportState::Fresh, "PV", MetricType::Double).unwrap();
        file.append(1.0, 0.5).unwrap();
        file.finish().unwrap();

        let state = decide_state(&path).unwrap();
        let err = open_writer(&path, state, "PV", MetricType::Int64).unwrap_err();
        assert!(matches!(
            err,
            TaskError::MetricMismatch {
                expected: "Int64",
                found: "Double",
                ..
            }
        ));
    }
}
