//! Archive snapshot schema
//!
//! SQLite rendition of the RDB archiver tables the exporter reads. Sample
//! times are split the way the archiver stores them: `smpl_time` holds the
//! UTC second as `YYYY-MM-DD HH:MM:SS` text and `nanosecs` the sub-second
//! part. Keeping `smpl_time` in that fixed-width form lets the sample cursor
//! compare it as text.

use super::{epoch_seconds, RawValue};
use crate::error::{ArchiveError, ArchiveResult};
use chrono::{DateTime, NaiveDateTime};
use rusqlite::{params, Connection};

/// Text format of `sample.smpl_time`
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse format, tolerating a fractional part left in `smpl_time`
const PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Tables the exporter needs
pub const REQUIRED_TABLES: &[&str] = &["chan_grp", "channel", "sample"];

const CREATE_CHAN_GRP_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS chan_grp (
    grp_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    eng_id INTEGER,
    descr TEXT
)
"#;

const CREATE_CHANNEL_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS channel (
    channel_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    descr TEXT,
    grp_id INTEGER NOT NULL,
    smpl_per REAL,                -- Sampling period in seconds

    FOREIGN KEY (grp_id) REFERENCES chan_grp(grp_id)
)
"#;

const CREATE_SAMPLE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS sample (
    channel_id INTEGER NOT NULL,
    smpl_time TEXT NOT NULL,      -- UTC second, YYYY-MM-DD HH:MM:SS
    nanosecs INTEGER DEFAULT 0,
    severity_id INTEGER,
    status_id INTEGER,
    num_val INTEGER,
    float_val REAL,
    str_val TEXT,

    FOREIGN KEY (channel_id) REFERENCES channel(channel_id)
)
"#;

const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_sample_channel_time ON sample(channel_id, smpl_time, nanosecs)",
    "CREATE INDEX IF NOT EXISTS idx_channel_name ON channel(name)",
];

/// Create the archive tables
pub fn create_archive(conn: &Connection) -> ArchiveResult<()> {
    conn.execute(CREATE_CHAN_GRP_TABLE, [])?;
    conn.execute(CREATE_CHANNEL_TABLE, [])?;
    conn.execute(CREATE_SAMPLE_TABLE, [])?;
    Ok(())
}

/// Create the indexes the sample cursor relies on
pub fn create_indexes(conn: &Connection) -> ArchiveResult<()> {
    for sql in CREATE_INDEXES {
        conn.execute(sql, [])?;
    }
    Ok(())
}

/// Check that all required tables exist
pub fn verify(conn: &Connection) -> ArchiveResult<()> {
    let mut stmt = conn.prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")?;
    for table in REQUIRED_TABLES {
        if !stmt.exists([*table])? {
            return Err(ArchiveError::ConnectionFailed {
                location: conn.path().unwrap_or("<memory>").to_string(),
                reason: format!("missing table '{}'", table),
            });
        }
    }
    Ok(())
}

/// Insert a channel group
pub fn insert_group(conn: &Connection, grp_id: i64, name: &str) -> ArchiveResult<()> {
    conn.execute(
        "INSERT INTO chan_grp (grp_id, name) VALUES (?1, ?2)",
        params![grp_id, name],
    )?;
    Ok(())
}

/// Insert a channel
pub fn insert_channel(
    conn: &Connection,
    channel_id: i64,
    name: &str,
    grp_id: i64,
) -> ArchiveResult<()> {
    conn.execute(
        "INSERT INTO channel (channel_id, name, grp_id) VALUES (?1, ?2, ?3)",
        params![channel_id, name, grp_id],
    )?;
    Ok(())
}

/// Insert a sample at `time` epoch seconds
///
/// The value goes into the column matching its type; `None` leaves every
/// value column NULL.
pub fn insert_sample(
    conn: &Connection,
    channel_id: i64,
    time: f64,
    value: Option<RawValue>,
) -> ArchiveResult<()> {
    let secs = time.floor();
    let nanos = ((time - secs) * 1e9).round() as i64;
    let smpl_time = format_time(secs as i64, channel_id)?;

    let (num_val, float_val, str_val) = match value {
        Some(RawValue::Integer(v)) => (Some(v), None, None),
        Some(RawValue::Real(v)) => (None, Some(v), None),
        Some(RawValue::Text(v)) => (None, None, Some(v)),
        Some(RawValue::Blob(_)) | None => (None, None, None),
    };

    conn.execute(
        "INSERT INTO sample (channel_id, smpl_time, nanosecs, num_val, float_val, str_val) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![channel_id, smpl_time, nanos, num_val, float_val, str_val],
    )?;
    Ok(())
}

/// Format whole epoch seconds as `smpl_time` text
pub fn format_time(secs: i64, channel_id: i64) -> ArchiveResult<String> {
    DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.format(TIME_FORMAT).to_string())
        .ok_or_else(|| ArchiveError::InvalidTime {
            channel_id,
            value: secs.to_string(),
        })
}

/// Convert `smpl_time` text and `nanosecs` to epoch seconds
pub fn parse_time(smpl_time: &str, nanosecs: i64, channel_id: i64) -> ArchiveResult<f64> {
    let parsed = NaiveDateTime::parse_from_str(smpl_time, PARSE_FORMAT).map_err(|_| {
        ArchiveError::InvalidTime {
            channel_id,
            value: smpl_time.to_string(),
        }
    })?;
    Ok(epoch_seconds(parsed.and_utc().timestamp(), nanosecs))
}
