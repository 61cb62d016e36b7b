//! Error types for pv-export
//!
//! This module defines the error hierarchy for the exporter:
//! - Archive access errors (connection, metadata, sample cursor)
//! - BTSF container errors (header parsing, typed appends)
//! - Configuration and CLI errors
//! - Worker pool errors
//!
//! Per-task failures are kept separate from run-level errors: a
//! [`TaskError`] aborts one channel and is reported in its result, while an
//! [`ExportError`] aborts the whole run before any task is dispatched.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for a pv-export run
#[derive(Error, Debug)]
pub enum ExportError {
    /// Archive errors (e.g. cannot enumerate channels)
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// I/O errors (report file, output directory)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON report serialization
    #[error("Report error: {0}")]
    Report(#[from] serde_json::Error),
}

/// Archive connection and query errors
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// SQLite error from the snapshot backend
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Archive could not be opened
    #[error("Failed to connect to archive '{location}': {reason}")]
    ConnectionFailed { location: String, reason: String },

    /// No channel with this name
    #[error("Unknown PV '{0}'")]
    UnknownPv(String),

    /// No channel with this id
    #[error("Unknown channel id {0}")]
    UnknownChannel(i64),

    /// No group with this id
    #[error("Unknown channel group id {0}")]
    UnknownGroup(i64),

    /// Sample timestamp could not be parsed
    #[error("Invalid sample time '{value}' for channel {channel_id}")]
    InvalidTime { channel_id: i64, value: String },
}

/// BTSF container errors
#[derive(Error, Debug)]
pub enum BtsfError {
    /// File does not exist
    #[error("BTSF file not found: '{}'", path.display())]
    NotFound { path: PathBuf },

    /// File exists but holds no records
    #[error("BTSF file is empty")]
    Empty,

    /// Header or payload is malformed
    #[error("Corrupt BTSF file '{}': {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    /// Metric layout is invalid for a new file
    #[error("Invalid metric layout: {0}")]
    InvalidMetrics(String),

    /// Value cannot be stored in the target metric
    #[error("Value {value} cannot be stored as {expected}")]
    Unrepresentable { value: String, expected: &'static str },

    /// Append would break timestamp ordering
    #[error("Timestamp {time} is earlier than last persisted {last}")]
    OutOfOrder { time: f64, last: f64 },

    /// Write attempted on a file opened for reading
    #[error("BTSF file was opened read-only")]
    ReadOnly,

    /// Underlying I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid include/exclude pattern
    #[error("Invalid {kind} pattern '{pattern}': {reason}")]
    InvalidPattern {
        kind: &'static str,
        pattern: String,
        reason: String,
    },

    /// Output directory error
    #[error("Invalid output directory '{}': {reason}", path.display())]
    InvalidOutputDir { path: PathBuf, reason: String },

    /// Report path error
    #[error("Invalid report path '{}': {reason}", path.display())]
    InvalidReportPath { path: PathBuf, reason: String },
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked outside of a task
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },

    /// Worker thread could not be spawned
    #[error("Failed to initialize worker {id}: {reason}")]
    InitFailed { id: usize, reason: String },

    /// Task queue closed before all tasks were queued
    #[error("Failed to queue task: queue closed")]
    QueueSendFailed,
}

/// Fatal error for a single export task
#[derive(Error, Debug)]
pub enum TaskError {
    /// Archive failure while exporting
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Existing output file could not be read or opened
    #[error("Cannot use existing file '{}': {source}", path.display())]
    ExistingFile {
        path: PathBuf,
        #[source]
        source: BtsfError,
    },

    /// Existing output file stores a different value type
    #[error("File '{}' stores {found} values but the PV is {expected}", path.display())]
    MetricMismatch {
        path: PathBuf,
        expected: &'static str,
        found: &'static str,
    },

    /// A record could not be written
    #[error(
        "Record {index} of channel {channel_id} ({column}) at {time}: cannot write {value}: {source}"
    )]
    Record {
        index: u64,
        channel_id: i64,
        column: &'static str,
        time: f64,
        value: String,
        #[source]
        source: BtsfError,
    },

    /// Output file or directory I/O
    #[error("Output error for '{}': {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: BtsfError,
    },

    /// Output directory could not be created
    #[error("Cannot create directory '{}': {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why a PV was skipped without being an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Name contains characters that are unsafe in a path
    UnsafeName,
    /// Name is on the reserved list
    ReservedName,
    /// PV records text values
    TextValued,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::UnsafeName => f.write_str("unsafe name"),
            SkipReason::ReservedName => f.write_str("reserved name"),
            SkipReason::TextValued => f.write_str("text-valued PV"),
        }
    }
}

/// Result type alias for ExportError
pub type Result<T> = std::result::Result<T, ExportError>;

/// Result type alias for ArchiveError
pub type ArchiveResult<T> = std::result::Result<T, ArchiveError>;

/// Result type alias for BtsfError
pub type BtsfResult<T> = std::result::Result<T, BtsfError>;
