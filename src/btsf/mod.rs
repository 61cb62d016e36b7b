//! Binary time-series files (BTSF)
//!
//! A BTSF file is a small self-describing header followed by fixed-size
//! little-endian records. Each record holds one value per declared metric;
//! the first metric is always the time axis (seconds since the epoch as a
//! double).
//!
//! # Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Prelude (24 bytes)                           │
//! │  "BTSF" | version u16 | reserved u16         │
//! │  metric count u32 | section count u32        │
//! │  data offset u64                             │
//! ├──────────────────────────────────────────────┤
//! │ Metrics: type u8 | flags u8 | len u16 | name │
//! ├──────────────────────────────────────────────┤
//! │ Intro sections: type u16 | reserved u16      │
//! │  payload size u32 | followup size u32        │
//! │  reserved u32 | payload | zero followup      │
//! ├──────────────────────────────────────────────┤
//! │ Padding to 16 bytes                          │
//! ├──────────────────────────────────────────────┤
//! │ Records: 8 bytes per metric                  │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! The zero-filled followup of an intro section reserves room for the
//! section to grow in place later without rewriting the records.

pub mod file;

pub use file::BinaryTimeSeriesFile;

/// File magic
pub const MAGIC: &[u8; 4] = b"BTSF";

/// Current format version
pub const FORMAT_VERSION: u16 = 1;

/// Size of the fixed prelude
pub const PRELUDE_SIZE: usize = 24;

/// Header is padded so records start on this boundary
pub const HEADER_ALIGN: usize = 16;

/// Bytes per metric value in a record
pub const VALUE_SIZE: usize = 8;

/// Size of an intro section header
pub const SECTION_HEADER_SIZE: usize = 16;

/// Storage type of a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MetricType {
    /// IEEE-754 double
    Double = 1,
    /// Signed 64-bit integer
    Int64 = 2,
}

impl MetricType {
    /// Convert from the on-disk tag
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(MetricType::Double),
            2 => Some(MetricType::Int64),
            _ => None,
        }
    }

    /// Human readable type name
    pub fn name(&self) -> &'static str {
        match self {
            MetricType::Double => "Double",
            MetricType::Int64 => "Int64",
        }
    }
}

/// A named column of the time series
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metric {
    /// Metric name (the PV name for value metrics)
    pub name: String,

    /// Storage type
    pub metric_type: MetricType,

    /// True for the time axis
    pub is_time: bool,
}

impl Metric {
    /// Create a value metric
    pub fn new(name: impl Into<String>, metric_type: MetricType) -> Self {
        Self {
            name: name.into(),
            metric_type,
            is_time: false,
        }
    }

    /// Create the time axis metric
    pub fn time() -> Self {
        Self {
            name: "time".to_string(),
            metric_type: MetricType::Double,
            is_time: true,
        }
    }
}

/// Kind of an intro section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntroSectionType {
    /// JSON annotations
    Annotations,
    /// Section written by a newer tool
    Other(u16),
}

impl IntroSectionType {
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => IntroSectionType::Annotations,
            other => IntroSectionType::Other(other),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            IntroSectionType::Annotations => 1,
            IntroSectionType::Other(v) => *v,
        }
    }
}

/// Free-form block stored between the metrics and the records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntroSection {
    pub section_type: IntroSectionType,

    /// Section content
    pub payload: Vec<u8>,

    /// Zero bytes reserved after the payload
    pub followup_size: u32,
}

impl IntroSection {
    /// Annotations section with `capacity` spare bytes, padded so the
    /// payload plus followup ends on a 16-byte boundary
    pub fn annotations(payload: Vec<u8>, capacity: u32) -> Self {
        let pad = (HEADER_ALIGN - payload.len() % HEADER_ALIGN) % HEADER_ALIGN;
        Self {
            section_type: IntroSectionType::Annotations,
            payload,
            followup_size: capacity + pad as u32,
        }
    }

    /// Bytes this section occupies on disk, including its header
    pub fn encoded_len(&self) -> usize {
        SECTION_HEADER_SIZE + self.payload.len() + self.followup_size as usize
    }
}

/// A single metric value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Double(f64),
    Int64(i64),
}

impl Value {
    /// Value as f64, promoting integers
    pub fn as_f64(&self) -> f64 {
        match self {
            Value::Double(v) => *v,
            Value::Int64(v) => *v as f64,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Double(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

/// One persisted row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Record {
    /// Seconds since the epoch
    pub time: f64,

    pub value: Value,
}
