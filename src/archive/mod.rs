//! Channel archive access
//!
//! The exporter reads from a relational channel archive laid out in the
//! classic RDB archiver schema:
//!
//! ```text
//! chan_grp (grp_id, name, descr)
//!     │ 1:n
//! channel  (channel_id, name, descr, grp_id, smpl_per)
//!     │ 1:n
//! sample   (channel_id, smpl_time, nanosecs, float_val, num_val, str_val)
//! ```
//!
//! Access goes through the [`Archive`] trait so the pipeline does not depend
//! on a particular database driver. Each export task opens its own
//! connection through an [`ArchiveConnector`]; connections are never shared
//! between threads.

pub mod schema;
pub mod sqlite;

pub use sqlite::{SqliteArchive, SqliteConnector};

use crate::btsf::MetricType;
use crate::error::{ArchiveError, ArchiveResult};
use serde::Serialize;

/// Parameters needed to open an archive connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveParams {
    /// Archive host (for the SQLite backend: a database file or a directory)
    pub host: String,

    pub port: u16,

    pub user: String,

    /// Database name
    pub dbname: String,
}

impl ArchiveParams {
    /// Format for display in logs and the run header
    pub fn to_display_string(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.dbname)
    }
}

/// Which sample column a PV records its values in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// `float_val`
    Real,
    /// `num_val`
    Integer,
    /// `str_val`
    Text,
}

impl ValueKind {
    /// Name of the sample column holding this kind
    pub fn column(&self) -> &'static str {
        match self {
            ValueKind::Real => "float_val",
            ValueKind::Integer => "num_val",
            ValueKind::Text => "str_val",
        }
    }

    /// BTSF metric type for this kind, `None` for text
    pub fn metric_type(&self) -> Option<MetricType> {
        match self {
            ValueKind::Real => Some(MetricType::Double),
            ValueKind::Integer => Some(MetricType::Int64),
            ValueKind::Text => None,
        }
    }

    pub fn is_exportable(&self) -> bool {
        self.metric_type().is_some()
    }
}

/// Archive metadata for a PV
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Channel {
    pub id: i64,
    pub name: String,
    pub group_id: i64,
    pub description: Option<String>,

    /// Configured sampling period in seconds
    pub sample_period: Option<f64>,
}

/// Engine group a channel belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelGroup {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// A value as stored in the archive, before any conversion
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Real(f64),
    Integer(i64),
    Text(String),
    Blob(Vec<u8>),
}

/// One archived sample
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Seconds since the epoch
    pub time: f64,

    /// `None` when the value column is NULL
    pub value: Option<RawValue>,
}

/// Convert a whole-second timestamp plus nanoseconds to epoch seconds
///
/// Both the exporter and the resume cursor go through this function, so a
/// persisted timestamp compares equal to the archive sample it came from.
pub fn epoch_seconds(secs: i64, nanos: i64) -> f64 {
    secs as f64 + nanos as f64 * 1e-9
}

/// Read access to a channel archive
pub trait Archive {
    /// Names of all PVs known to the archive
    fn pv_names(&self) -> ArchiveResult<Vec<String>>;

    /// Channel id for a PV name
    fn channel_id(&self, pv_name: &str) -> ArchiveResult<i64>;

    /// Channel metadata
    fn channel(&self, channel_id: i64) -> ArchiveResult<Channel>;

    /// Group metadata
    fn group(&self, group_id: i64) -> ArchiveResult<ChannelGroup>;

    /// Infer which column a PV records its values in
    fn value_kind(&self, pv_name: &str) -> ArchiveResult<ValueKind>;

    /// Visit the samples of a channel in time order
    ///
    /// With `after` set, only samples strictly later than `after` are
    /// visited. Visiting stops at the first error returned by `visit`.
    fn for_each_sample<E, F>(
        &self,
        channel_id: i64,
        kind: ValueKind,
        after: Option<f64>,
        visit: F,
    ) -> Result<(), E>
    where
        F: FnMut(Sample) -> Result<(), E>,
        E: From<ArchiveError>;

    /// Close the connection
    fn close(self) -> ArchiveResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// Opens one archive connection per task
pub trait ArchiveConnector: Send + Sync {
    type Archive: Archive;

    fn connect(&self, params: &ArchiveParams) -> ArchiveResult<Self::Archive>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_kind_columns() {
        assert_eq!(ValueKind::Real.column(), "float_val");
        assert_eq!(ValueKind::Integer.column(), "num_val");
        assert_eq!(ValueKind::Text.column(), "str_val");

        assert_eq!(ValueKind::Real.metric_type(), Some(MetricType::Double));
        assert_eq!(ValueKind::Integer.metric_type(), Some(MetricType::Int64));
        assert!(!ValueKind::Text.is_exportable());
    }

    #[test]
    fn test_epoch_seconds() {
        assert_eq!(epoch_seconds(10, 0), 10.0);
        assert!((epoch_seconds(10, 500_000_000) - 10.5).abs() < 1e-12);
    }

    #[test]
    fn test_stored_time_matches_epoch_seconds() {
        for nanos in [0, 1, 250_000_000, 123_456_789, 999_999_999] {
            let text = schema::format_time(1_700_000_000, 1).unwrap();
            assert_eq!(
                schema::parse_time(&text, nanos, 1).unwrap(),
                epoch_seconds(1_700_000_000, nanos)
            );
        }
    }

    #[test]
    fn test_params_display() {
        let params = ArchiveParams {
            host: "archiver.local".into(),
            port: 5432,
            user: "report".into(),
            dbname: "archive".into(),
        };
        assert_eq!(params.to_display_string(), "report@archiver.local:5432/archive");
    }
}
