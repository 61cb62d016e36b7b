//! Sample streaming
//!
//! Copies archive samples into an open BTSF writer one record at a time.
//! NULL values are replaced by the kind's default; any other value that the
//! file cannot store fails the task with the offending record attached.

use super::task::ExportState;
use crate::archive::{Archive, Channel, RawValue, Sample, ValueKind};
use crate::btsf::{BinaryTimeSeriesFile, Value};
use crate::error::{BtsfError, BtsfResult, TaskError};
use tracing::trace;

/// Value written for a NULL sample
pub fn null_default(kind: ValueKind) -> Value {
    match kind {
        ValueKind::Integer => Value::Int64(0),
        ValueKind::Real | ValueKind::Text => Value::Double(f64::NAN),
    }
}

/// Convert an archive value to a BTSF value
pub fn convert(raw: &RawValue) -> BtsfResult<Value> {
    match raw {
        RawValue::Real(v) => Ok(Value::Double(*v)),
        RawValue::Integer(v) => Ok(Value::Int64(*v)),
        RawValue::Text(s) => Err(BtsfError::Unrepresentable {
            value: format!("{:?}", s),
            expected: "a number",
        }),
        RawValue::Blob(b) => Err(BtsfError::Unrepresentable {
            value: format!("<{} byte blob>", b.len()),
            expected: "a number",
        }),
    }
}

/// Stream the channel's samples after `state` into `writer`
///
/// Returns the number of records appended. Records appended before a
/// failure stay in the writer's buffer and reach the file when it is
/// dropped.
pub fn stream_samples<A: Archive>(
    archive: &A,
    channel: &Channel,
    kind: ValueKind,
    state: ExportState,
    writer: &mut BinaryTimeSeriesFile,
) -> Result<u64, TaskError> {
    let column = kind.column();
    let mut written = 0u64;

    archive.for_each_sample::<TaskError, _>(channel.id, kind, state.cursor(), |sample: Sample| {
        let value = match &sample.value {
            None => Ok(null_default(kind)),
            Some(raw) => convert(raw),
        };

        value
            .and_then(|value| writer.append(sample.time, value))
            .map_err(|source| TaskError::Record {
                index: written,
                channel_id: channel.id,
                column,
                time: sample.time,
                value: describe(&sample.value),
                source,
            })?;

        written += 1;
        Ok(())
    })?;

    trace!(channel = channel.id, records = written, "Samples streamed");
    Ok(written)
}

fn describe(value: &Option<RawValue>) -> String {
    match value {
        None => "NULL".to_string(),
        Some(raw) => format!("{:?}", raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ChannelGroup;
    use crate::btsf::{Metric, MetricType};
    use crate::error::{ArchiveError, ArchiveResult};
    use tempfile::tempdir;

    /// In-memory archive with one channel
    struct VecArchive {
        samples: Vec<Sample>,
    }

    impl Archive for VecArchive {
        fn pv_names(&self) -> ArchiveResult<Vec<String>> {
            Ok(vec!["PV".into()])
        }

        fn channel_id(&self, _pv_name: &str) -> ArchiveResult<i64> {
            Ok(1)
        }

        fn channel(&self, channel_id: i64) -> ArchiveResult<Channel> {
            Err(ArchiveError::UnknownChannel(channel_id))
        }

        fn group(&self, group_id: i64) -> ArchiveResult<ChannelGroup> {
            Err(ArchiveError::UnknownGroup(group_id))
        }

        fn value_kind(&self, _pv_name: &str) -> ArchiveResult<ValueKind> {
            Ok(ValueKind::Real)
        }

        fn for_each_sample<E, F>(
            &self,
            _channel_id: i64,
            _kind: ValueKind,
            after: Option<f64>,
            mut visit: F,
        ) -> Result<(), E>
        where
            F: FnMut(Sample) -> Result<(), E>,
            E: From<ArchiveError>,
        {
            for sample in &self.samples {
                if after.map_or(true, |after| sample.time > after) {
                    visit(sample.clone())?;
                }
            }
            Ok(())
        }
    }

    fn channel() -> Channel {
        Channel {
            id: 1,
            name: "PV".into(),
            group_id: 1,
            description: None,
            sample_period: None,
        }
    }

    fn writer(dir: &std::path::Path, metric_type: MetricType) -> BinaryTimeSeriesFile {
        BinaryTimeSeriesFile::create(
            &dir.join("pv.btsf"),
            vec![Metric::time(), Metric::new("PV", metric_type)],
            vec![],
        )
        .unwrap()
    }

    fn sample(time: f64, value: Option<RawValue>) -> Sample {
        Sample { time, value }
    }

    #[test]
    fn test_null_defaults() {
        assert_eq!(null_default(ValueKind::Integer), Value::Int64(0));
        assert!(null_default(ValueKind::Real).as_f64().is_nan());
    }

    #[test]
    fn test_stream_with_nulls() {
        let dir = tempdir().unwrap();
        let archive = VecArchive {
            samples: vec![
                sample(1.0, Some(RawValue::Real(1.5))),
                sample(2.0, None),
                sample(3.0, Some(RawValue::Real(-2.0))),
            ],
        };
        let mut file = writer(dir.path(), MetricType::Double);

        let n = stream_samples(&archive, &channel(), ValueKind::Real, ExportState::Fresh, &mut file)
            .unwrap();
        assert_eq!(n, 3);

        let records = file.records().unwrap();
        assert_eq!(records[0].value, Value::Double(1.5));
        assert!(records[1].value.as_f64().is_nan());
        assert_eq!(records[2].time, 3.0);
    }

    #[test]
    fn test_stream_integer_null_is_zero() {
        let dir = tempdir().unwrap();
        let archive = VecArchive {
            samples: vec![sample(1.0, None), sample(2.0, Some(RawValue::Integer(7)))],
        };
        let mut file = writer(dir.path(), MetricType::Int64);

        stream_samples(&archive, &channel(), ValueKind::Integer, ExportState::Fresh, &mut file)
            .unwrap();
        let values: Vec<Value> = file.records().unwrap().iter().map(|r| r.value).collect();
        assert_eq!(values, vec![Value::Int64(0), Value::Int64(7)]);
    }

    #[test]
    fn test_stream_resumes_after_cursor() {
        let dir = tempdir().unwrap();
        let archive = VecArchive {
            samples: vec![
                sample(1.0, Some(RawValue::Real(1.0))),
                sample(2.0, Some(RawValue::Real(2.0))),
                sample(3.0, Some(RawValue::Real(3.0))),
            ],
        };
        let mut file = writer(dir.path(), MetricType::Double);

        let state = ExportState::Resume { last_time: 2.0 };
        let n = stream_samples(&archive, &channel(), ValueKind::Real, state, &mut file).unwrap();
        assert_eq!(n, 1);
        assert_eq!(file.last().unwrap().time, 3.0);
    }

    #[test]
    fn test_unrepresentable_value_reports_context() {
        let dir = tempdir().unwrap();
        let archive = VecArchive {
            samples: vec![
                sample(1.0, Some(RawValue::Integer(1))),
                sample(2.0, Some(RawValue::Real(0.5))),
                sample(3.0, Some(RawValue::Integer(3))),
            ],
        };
        let mut file = writer(dir.path(), MetricType::Int64);

        let err = stream_samples(&archive, &channel(), ValueKind::Integer, ExportState::Fresh, &mut file)
            .unwrap_err();
        match err {
            TaskError::Record {
                index,
                channel_id,
                column,
                time,
                value,
                ..
            } => {
                assert_eq!(index, 1);
                assert_eq!(channel_id, 1);
                assert_eq!(column, "num_val");
                assert_eq!(time, 2.0);
                assert_eq!(value, "Real(0.5)");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(file.len(), 1);
    }

    #[test]
    fn test_text_value_fails() {
        let dir = tempdir().unwrap();
        let archive = VecArchive {
            samples: vec![sample(1.0, Some(RawValue::Text("on".into())))],
        };
        let mut file = writer(dir.path(), MetricType::Double);

        let err = stream_samples(&archive, &channel(), ValueKind::Real, ExportState::Fresh, &mut file)
            .unwrap_err();
        assert!(matches!(err, TaskError::Record { index: 0, .. }));
    }
}
