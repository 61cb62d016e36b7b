//! SQLite archive backend
//!
//! Reads an SQLite snapshot of the archiver tables (see [`super::schema`]).
//! Each [`SqliteArchive`] owns one read-only connection.

use super::schema::{self, format_time, parse_time};
use super::{
    Archive, ArchiveConnector, ArchiveParams, Channel, ChannelGroup, RawValue, Sample, ValueKind,
};
use crate::error::{ArchiveError, ArchiveResult};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// How long a reader waits on a locked database
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Opens [`SqliteArchive`] connections
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteConnector;

impl ArchiveConnector for SqliteConnector {
    type Archive = SqliteArchive;

    fn connect(&self, params: &ArchiveParams) -> ArchiveResult<SqliteArchive> {
        SqliteArchive::open(params)
    }
}

/// Resolve the database file for a set of connection parameters
///
/// A host naming a directory holds one database per name
/// (`<host>/<dbname>.db`); any other host is the database file itself.
pub fn database_path(params: &ArchiveParams) -> PathBuf {
    let host = Path::new(&params.host);
    if host.is_dir() {
        host.join(format!("{}.db", params.dbname))
    } else {
        host.to_path_buf()
    }
}

/// Read-only connection to an SQLite archive snapshot
pub struct SqliteArchive {
    conn: Connection,
}

impl SqliteArchive {
    /// Open the archive described by `params`
    pub fn open(params: &ArchiveParams) -> ArchiveResult<Self> {
        let path = database_path(params);
        if !path.is_file() {
            return Err(ArchiveError::ConnectionFailed {
                location: path.display().to_string(),
                reason: "no such archive database".into(),
            });
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| ArchiveError::ConnectionFailed {
            location: path.display().to_string(),
            reason: e.to_string(),
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        debug!(path = %path.display(), "Archive connection opened");
        Self::from_connection(conn)
    }

    /// Wrap an existing connection
    pub fn from_connection(conn: Connection) -> ArchiveResult<Self> {
        schema::verify(&conn)?;
        Ok(Self { conn })
    }
}

impl Archive for SqliteArchive {
    fn pv_names(&self) -> ArchiveResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM channel ORDER BY channel_id")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn channel_id(&self, pv_name: &str) -> ArchiveResult<i64> {
        self.conn
            .query_row(
                "SELECT channel_id FROM channel WHERE name = ?1",
                [pv_name],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| ArchiveError::UnknownPv(pv_name.to_string()))
    }

    fn channel(&self, channel_id: i64) -> ArchiveResult<Channel> {
        self.conn
            .query_row(
                "SELECT channel_id, name, grp_id, descr, smpl_per FROM channel WHERE channel_id = ?1",
                [channel_id],
                |row| {
                    Ok(Channel {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        group_id: row.get(2)?,
                        description: row.get(3)?,
                        sample_period: row.get(4)?,
                    })
                },
            )
            .optional()?
            .ok_or(ArchiveError::UnknownChannel(channel_id))
    }

    fn group(&self, group_id: i64) -> ArchiveResult<ChannelGroup> {
        self.conn
            .query_row(
                "SELECT grp_id, name, descr FROM chan_grp WHERE grp_id = ?1",
                [group_id],
                |row| {
                    Ok(ChannelGroup {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        description: row.get(2)?,
                    })
                },
            )
            .optional()?
            .ok_or(ArchiveError::UnknownGroup(group_id))
    }

    /// The kind is taken from the most recent sample with a value. A channel
    /// without any valued sample is treated as real-valued.
    fn value_kind(&self, pv_name: &str) -> ArchiveResult<ValueKind> {
        let channel_id = self.channel_id(pv_name)?;
        let columns: Option<(bool, bool, bool)> = self
            .conn
            .query_row(
                "SELECT float_val IS NOT NULL, num_val IS NOT NULL, str_val IS NOT NULL \
                 FROM sample \
                 WHERE channel_id = ?1 \
                   AND (float_val IS NOT NULL OR num_val IS NOT NULL OR str_val IS NOT NULL) \
                 ORDER BY smpl_time DESC, nanosecs DESC LIMIT 1",
                [channel_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        Ok(match columns {
            Some((_, _, true)) => ValueKind::Text,
            Some((true, _, _)) => ValueKind::Real,
            Some((false, true, _)) => ValueKind::Integer,
            _ => ValueKind::Real,
        })
    }

    fn for_each_sample<E, F>(
        &self,
        channel_id: i64,
        kind: ValueKind,
        after: Option<f64>,
        mut visit: F,
    ) -> Result<(), E>
    where
        F: FnMut(Sample) -> Result<(), E>,
        E: From<ArchiveError>,
    {
        let column = kind.column();
        let prefilter = match after {
            Some(after) => Some(format_time(after.floor() as i64, channel_id)?),
            None => None,
        };

        // Whole-second prefilter in SQL; the exact boundary is checked below
        let sql = match prefilter {
            Some(_) => format!(
                "SELECT smpl_time, nanosecs, {column} FROM sample \
                 WHERE channel_id = ?1 AND smpl_time >= ?2 \
                 ORDER BY smpl_time, nanosecs"
            ),
            None => format!(
                "SELECT smpl_time, nanosecs, {column} FROM sample \
                 WHERE channel_id = ?1 \
                 ORDER BY smpl_time, nanosecs"
            ),
        };

        let mut stmt = self.conn.prepare(&sql).map_err(ArchiveError::from)?;
        let mut rows = match &prefilter {
            Some(start) => stmt.query(params![channel_id, start]),
            None => stmt.query(params![channel_id]),
        }
        .map_err(ArchiveError::from)?;

        while let Some(row) = rows.next().map_err(ArchiveError::from)? {
            let smpl_time: String = row.get(0).map_err(ArchiveError::from)?;
            let nanosecs: Option<i64> = row.get(1).map_err(ArchiveError::from)?;
            let time = parse_time(&smpl_time, nanosecs.unwrap_or(0), channel_id)?;

            if let Some(after) = after {
                if time <= after {
                    continue;
                }
            }

            let value = match row.get_ref(2).map_err(ArchiveError::from)? {
                ValueRef::Null => None,
                ValueRef::Integer(v) => Some(RawValue::Integer(v)),
                ValueRef::Real(v) => Some(RawValue::Real(v)),
                ValueRef::Text(v) => Some(RawValue::Text(String::from_utf8_lossy(v).into_owned())),
                ValueRef::Blob(v) => Some(RawValue::Blob(v.to_vec())),
            };

            visit(Sample { time, value })?;
        }

        Ok(())
    }

    fn close(self) -> ArchiveResult<()> {
        self.conn.close().map_err(|(_, e)| ArchiveError::from(e))
    }
}
