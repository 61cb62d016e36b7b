//! BTSF file handle
//!
//! [`BinaryTimeSeriesFile`] is opened in one of two modes:
//! - `Read` for inspecting the header and the last record
//! - `Append` for adding records after the existing ones
//!
//! Files are append-only: records are never rewritten, and an append whose
//! timestamp is earlier than the last persisted record is rejected.

use super::{
    IntroSection, IntroSectionType, Metric, MetricType, Record, Value, FORMAT_VERSION,
    HEADER_ALIGN, MAGIC, PRELUDE_SIZE, VALUE_SIZE,
};
use crate::error::{BtsfError, BtsfResult};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Metric flag bit marking the time axis
const FLAG_TIME: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenMode {
    Read,
    Append,
}

#[derive(Debug)]
enum Handle {
    Read(File),
    Append(BufWriter<File>),
}

/// Parsed header
struct Header {
    metrics: Vec<Metric>,
    sections: Vec<IntroSection>,
    data_offset: u64,
}

/// An open BTSF file
#[derive(Debug)]
pub struct BinaryTimeSeriesFile {
    path: PathBuf,
    handle: Handle,
    metrics: Vec<Metric>,
    sections: Vec<IntroSection>,
    data_offset: u64,
    len: u64,
    last: Option<Record>,
}

impl BinaryTimeSeriesFile {
    /// Create a new file, truncating any existing one
    ///
    /// `metrics` must be the time axis followed by exactly one value metric.
    pub fn create(
        path: &Path,
        metrics: Vec<Metric>,
        intro_sections: Vec<IntroSection>,
    ) -> BtsfResult<Self> {
        validate_metrics(&metrics).map_err(BtsfError::InvalidMetrics)?;
        let header = encode_header(&metrics, &intro_sections)?;

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&header)?;
        writer.flush()?;

        Ok(Self {
            path: path.to_path_buf(),
            handle: Handle::Append(writer),
            metrics,
            sections: intro_sections,
            data_offset: header.len() as u64,
            len: 0,
            last: None,
        })
    }

    /// Open an existing file for reading
    pub fn open_read(path: &Path) -> BtsfResult<Self> {
        Self::open(path, OpenMode::Read)
    }

    /// Open an existing file for appending records
    pub fn open_append(path: &Path) -> BtsfResult<Self> {
        Self::open(path, OpenMode::Append)
    }

    fn open(path: &Path, mode: OpenMode) -> BtsfResult<Self> {
        let mut file = match OpenOptions::new()
            .read(true)
            .write(mode == OpenMode::Append)
            .open(path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BtsfError::NotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let file_len = file.metadata()?.len();
        let header = read_header(&mut file, path, file_len)?;
        let record_size = record_size(&header.metrics) as u64;

        let data_len = file_len - header.data_offset;
        if data_len % record_size != 0 {
            return Err(corrupt(
                path,
                format!(
                    "{} trailing bytes after the last complete record",
                    data_len % record_size
                ),
            ));
        }
        let len = data_len / record_size;

        let last = if len > 0 {
            let mut buf = vec![0u8; record_size as usize];
            file.seek(SeekFrom::Start(header.data_offset + (len - 1) * record_size))?;
            file.read_exact(&mut buf)?;
            Some(decode_record(&header.metrics, &buf))
        } else {
            None
        };

        let handle = match mode {
            OpenMode::Read => Handle::Read(file),
            OpenMode::Append => {
                file.seek(SeekFrom::End(0))?;
                Handle::Append(BufWriter::new(file))
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            handle,
            metrics: header.metrics,
            sections: header.sections,
            data_offset: header.data_offset,
            len,
            last,
        })
    }

    /// Append one record
    ///
    /// Integers are accepted for a `Double` metric; doubles are rejected for
    /// an `Int64` metric.
    pub fn append(&mut self, time: f64, value: impl Into<Value>) -> BtsfResult<()> {
        let value = value.into();
        let writer = match &mut self.handle {
            Handle::Append(writer) => writer,
            Handle::Read(_) => return Err(BtsfError::ReadOnly),
        };

        if !time.is_finite() {
            return Err(BtsfError::Unrepresentable {
                value: time.to_string(),
                expected: "time",
            });
        }
        if let Some(last) = &self.last {
            if time < last.time {
                return Err(BtsfError::OutOfOrder {
                    time,
                    last: last.time,
                });
            }
        }

        let (encoded, stored) = encode_value(self.metrics[1].metric_type, value)?;
        let mut buf = [0u8; 2 * VALUE_SIZE];
        buf[..VALUE_SIZE].copy_from_slice(&time.to_le_bytes());
        buf[VALUE_SIZE..].copy_from_slice(&encoded);
        writer.write_all(&buf)?;

        self.len += 1;
        self.last = Some(Record {
            time,
            value: stored,
        });
        Ok(())
    }

    /// Most recently persisted record
    pub fn last(&self) -> BtsfResult<Record> {
        self.last.ok_or(BtsfError::Empty)
    }

    /// Read every record in file order
    pub fn records(&mut self) -> BtsfResult<Vec<Record>> {
        if let Handle::Append(writer) = &mut self.handle {
            writer.flush()?;
        }

        let record_size = record_size(&self.metrics);
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.data_offset))?;
        let mut data = Vec::new();
        file.take(self.len * record_size as u64)
            .read_to_end(&mut data)?;

        Ok(data
            .chunks_exact(record_size)
            .map(|chunk| decode_record(&self.metrics, chunk))
            .collect())
    }

    /// Flush buffered records and sync them to disk
    pub fn finish(self) -> BtsfResult<()> {
        if let Handle::Append(mut writer) = self.handle {
            writer.flush()?;
            writer.get_ref().sync_data()?;
        }
        Ok(())
    }

    /// Number of records in the file
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Declared metrics, time axis first
    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    /// The value metric
    pub fn value_metric(&self) -> &Metric {
        &self.metrics[1]
    }

    pub fn intro_sections(&self) -> &[IntroSection] {
        &self.sections
    }
}

fn corrupt(path: &Path, reason: impl Into<String>) -> BtsfError {
    BtsfError::Corrupt {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn validate_metrics(metrics: &[Metric]) -> Result<(), String> {
    match metrics {
        [time, value] => {
            if !time.is_time || time.metric_type != MetricType::Double {
                return Err("first metric must be a Double time axis".into());
            }
            if value.is_time {
                return Err("only one time axis is allowed".into());
            }
            Ok(())
        }
        _ => Err(format!(
            "expected a time axis and one value metric, got {} metrics",
            metrics.len()
        )),
    }
}

fn record_size(metrics: &[Metric]) -> usize {
    metrics.len() * VALUE_SIZE
}

fn encode_value(metric_type: MetricType, value: Value) -> BtsfResult<([u8; VALUE_SIZE], Value)> {
    match (metric_type, value) {
        (MetricType::Double, Value::Double(v)) => Ok((v.to_le_bytes(), value)),
        (MetricType::Double, Value::Int64(v)) => {
            let promoted = v as f64;
            Ok((promoted.to_le_bytes(), Value::Double(promoted)))
        }
        (MetricType::Int64, Value::Int64(v)) => Ok((v.to_le_bytes(), value)),
        (MetricType::Int64, Value::Double(v)) => Err(BtsfError::Unrepresentable {
            value: v.to_string(),
            expected: MetricType::Int64.name(),
        }),
    }
}

fn decode_record(metrics: &[Metric], buf: &[u8]) -> Record {
    let time = f64::from_le_bytes(to_array(&buf[..VALUE_SIZE]));
    let raw = to_array(&buf[VALUE_SIZE..2 * VALUE_SIZE]);
    let value = match metrics[1].metric_type {
        MetricType::Double => Value::Double(f64::from_le_bytes(raw)),
        MetricType::Int64 => Value::Int64(i64::from_le_bytes(raw)),
    };
    Record { time, value }
}

fn to_array(bytes: &[u8]) -> [u8; VALUE_SIZE] {
    let mut out = [0u8; VALUE_SIZE];
    out.copy_from_slice(bytes);
    out
}

fn encode_header(metrics: &[Metric], sections: &[IntroSection]) -> BtsfResult<Vec<u8>> {
    let mut body = Vec::with_capacity(sections.iter().map(IntroSection::encoded_len).sum());

    for metric in metrics {
        let name = metric.name.as_bytes();
        let name_len = u16::try_from(name.len()).map_err(|_| {
            BtsfError::InvalidMetrics(format!("metric name too long: {}", metric.name))
        })?;
        body.push(metric.metric_type as u8);
        body.push(if metric.is_time { FLAG_TIME } else { 0 });
        body.extend_from_slice(&name_len.to_le_bytes());
        body.extend_from_slice(name);
    }

    for section in sections {
        let payload_size = u32::try_from(section.payload.len()).map_err(|_| {
            BtsfError::InvalidMetrics("intro section payload exceeds 4 GiB".into())
        })?;
        body.extend_from_slice(&section.section_type.as_u16().to_le_bytes());
        body.extend_from_slice(&0u16.to_le_bytes());
        body.extend_from_slice(&payload_size.to_le_bytes());
        body.extend_from_slice(&section.followup_size.to_le_bytes());
        body.extend_from_slice(&0u32.to_le_bytes());
        body.extend_from_slice(&section.payload);
        body.resize(body.len() + section.followup_size as usize, 0);
    }

    let data_offset = (PRELUDE_SIZE + body.len()).div_ceil(HEADER_ALIGN) * HEADER_ALIGN;

    let mut header = Vec::with_capacity(data_offset);
    header.extend_from_slice(MAGIC);
    header.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    header.extend_from_slice(&0u16.to_le_bytes());
    header.extend_from_slice(&(metrics.len() as u32).to_le_bytes());
    header.extend_from_slice(&(sections.len() as u32).to_le_bytes());
    header.extend_from_slice(&(data_offset as u64).to_le_bytes());
    header.extend_from_slice(&body);
    header.resize(data_offset, 0);

    Ok(header)
}

/// Cursor over header bytes
struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let bytes = self.buf.get(self.pos..end)?;
        self.pos = end;
        Some(bytes)
    }

    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    fn u16(&mut self) -> Option<u16> {
        self.take(2).map(|b| u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Option<u32> {
        self.take(4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Option<u64> {
        self.take(8).map(|b| u64::from_le_bytes(to_array(b)))
    }
}

fn read_header(file: &mut File, path: &Path, file_len: u64) -> BtsfResult<Header> {
    let truncated = || corrupt(path, "truncated header");

    if file_len < PRELUDE_SIZE as u64 {
        return Err(truncated());
    }

    let mut prelude = [0u8; PRELUDE_SIZE];
    file.read_exact(&mut prelude)?;
    let mut reader = ByteReader::new(&prelude);

    if reader.take(MAGIC.len()) != Some(&MAGIC[..]) {
        return Err(corrupt(path, "bad magic"));
    }
    let version = reader.u16().ok_or_else(truncated)?;
    if version != FORMAT_VERSION {
        return Err(corrupt(path, format!("unsupported version {}", version)));
    }
    reader.u16().ok_or_else(truncated)?;
    let metric_count = reader.u32().ok_or_else(truncated)?;
    let section_count = reader.u32().ok_or_else(truncated)?;
    let data_offset = reader.u64().ok_or_else(truncated)?;

    if data_offset < PRELUDE_SIZE as u64 || data_offset > file_len {
        return Err(corrupt(
            path,
            format!("data offset {} outside file of {} bytes", data_offset, file_len),
        ));
    }

    let mut rest = vec![0u8; data_offset as usize - PRELUDE_SIZE];
    file.read_exact(&mut rest)?;
    let mut reader = ByteReader::new(&rest);

    let mut metrics = Vec::new();
    for _ in 0..metric_count {
        let tag = reader.u8().ok_or_else(truncated)?;
        let flags = reader.u8().ok_or_else(truncated)?;
        let name_len = reader.u16().ok_or_else(truncated)?;
        let name = reader.take(name_len as usize).ok_or_else(truncated)?;

        let metric_type = MetricType::from_u8(tag)
            .ok_or_else(|| corrupt(path, format!("unknown metric type {}", tag)))?;
        let name = String::from_utf8(name.to_vec())
            .map_err(|_| corrupt(path, "metric name is not UTF-8"))?;
        metrics.push(Metric {
            name,
            metric_type,
            is_time: flags & FLAG_TIME != 0,
        });
    }
    validate_metrics(&metrics).map_err(|reason| corrupt(path, reason))?;

    let mut sections = Vec::new();
    for _ in 0..section_count {
        let section_type = reader.u16().ok_or_else(truncated)?;
        reader.u16().ok_or_else(truncated)?;
        let payload_size = reader.u32().ok_or_else(truncated)?;
        let followup_size = reader.u32().ok_or_else(truncated)?;
        reader.u32().ok_or_else(truncated)?;
        let payload = reader.take(payload_size as usize).ok_or_else(truncated)?;
        reader.take(followup_size as usize).ok_or_else(truncated)?;

        sections.push(IntroSection {
            section_type: IntroSectionType::from_u16(section_type),
            payload: payload.to_vec(),
            followup_size,
        });
    }

    Ok(Header {
        metrics,
        sections,
        data_offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn double_metrics() -> Vec<Metric> {
        vec![Metric::time(), Metric::new("SR:C01:Current", MetricType::Double)]
    }

    fn int_metrics() -> Vec<Metric> {
        vec![Metric::time(), Metric::new("SR:C01:State", MetricType::Int64)]
    }

    #[test]
    fn test_create_append_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("current.btsf");

        let section = IntroSection::annotations(b"{}".to_vec(), 1024);
        let mut file = BinaryTimeSeriesFile::create(&path, double_metrics(), vec![section.clone()])
            .unwrap();
        file.append(1.0, 10.5).unwrap();
        file.append(2.0, f64::NAN).unwrap();
        file.append(2.0, 7i64).unwrap();
        file.finish().unwrap();

        let mut file = BinaryTimeSeriesFile::open_read(&path).unwrap();
        assert_eq!(file.len(), 3);
        assert_eq!(file.metrics(), &double_metrics()[..]);
        assert_eq!(file.intro_sections(), &[section][..]);
        assert_eq!(file.last().unwrap(), Record { time: 2.0, value: Value::Double(7.0) });

        let records = file.records().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].value, Value::Double(10.5));
        assert!(matches!(records[1].value, Value::Double(v) if v.is_nan()));
    }

    #[test]
    fn test_header_alignment() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("aligned.btsf");

        BinaryTimeSeriesFile::create(&path, int_metrics(), vec![])
            .unwrap()
            .finish()
            .unwrap();

        let size = std::fs::metadata(&path).unwrap().len();
        assert_eq!(size % HEADER_ALIGN as u64, 0);
    }

    #[test]
    fn test_empty_and_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.btsf");

        let missing = BinaryTimeSeriesFile::open_read(&path);
        assert!(matches!(missing, Err(BtsfError::NotFound { .. })));

        BinaryTimeSeriesFile::create(&path, int_metrics(), vec![])
            .unwrap()
            .finish()
            .unwrap();
        let file = BinaryTimeSeriesFile::open_read(&path).unwrap();
        assert!(file.is_empty());
        assert!(matches!(file.last(), Err(BtsfError::Empty)));
    }

    #[test]
    fn test_append_after_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.btsf");

        let mut file = BinaryTimeSeriesFile::create(&path, int_metrics(), vec![]).unwrap();
        file.append(10.0, 1i64).unwrap();
        file.finish().unwrap();

        let mut file = BinaryTimeSeriesFile::open_append(&path).unwrap();
        assert_eq!(file.last().unwrap().time, 10.0);
        file.append(11.0, 2i64).unwrap();
        file.finish().unwrap();

        let mut file = BinaryTimeSeriesFile::open_read(&path).unwrap();
        let times: Vec<f64> = file.records().unwrap().iter().map(|r| r.time).collect();
        assert_eq!(times, vec![10.0, 11.0]);
    }

    #[test]
    fn test_int_metric_rejects_double() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.btsf");

        let mut file = BinaryTimeSeriesFile::create(&path, int_metrics(), vec![]).unwrap();
        let err = file.append(1.0, 0.5).unwrap_err();
        assert!(matches!(err, BtsfError::Unrepresentable { expected: "Int64", .. }));
        assert!(file.is_empty());
    }

    #[test]
    fn test_out_of_order_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("current.btsf");

        let mut file = BinaryTimeSeriesFile::create(&path, double_metrics(), vec![]).unwrap();
        file.append(5.0, 1.0).unwrap();
        let err = file.append(4.0, 1.0).unwrap_err();
        assert!(matches!(err, BtsfError::OutOfOrder { .. }));
        assert!(file.append(f64::NAN, 1.0).is_err());
        assert_eq!(file.len(), 1);
    }

    #[test]
    fn test_read_only_append() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("current.btsf");
        BinaryTimeSeriesFile::create(&path, double_metrics(), vec![])
            .unwrap()
            .finish()
            .unwrap();

        let mut file = BinaryTimeSeriesFile::open_read(&path).unwrap();
        assert!(matches!(file.append(1.0, 1.0), Err(BtsfError::ReadOnly)));
    }

    #[test]
    fn test_corrupt_files() {
        let dir = tempdir().unwrap();

        let garbage = dir.path().join("garbage.btsf");
        std::fs::write(&garbage, b"definitely not a time series file").unwrap();
        assert!(matches!(
            BinaryTimeSeriesFile::open_read(&garbage),
            Err(BtsfError::Corrupt { .. })
        ));

        let short = dir.path().join("short.btsf");
        std::fs::write(&short, b"BT").unwrap();
        assert!(matches!(
            BinaryTimeSeriesFile::open_read(&short),
            Err(BtsfError::Corrupt { .. })
        ));

        let partial = dir.path().join("partial.btsf");
        let mut file = BinaryTimeSeriesFile::create(&partial, double_metrics(), vec![]).unwrap();
        file.append(1.0, 1.0).unwrap();
        file.finish().unwrap();
        let mut bytes = std::fs::read(&partial).unwrap();
        bytes.extend_from_slice(&[0u8; 5]);
        std::fs::write(&partial, bytes).unwrap();
        assert!(matches!(
            BinaryTimeSeriesFile::open_append(&partial),
            Err(BtsfError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_invalid_metric_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.btsf");

        let no_time = vec![
            Metric::new("a", MetricType::Double),
            Metric::new("b", MetricType::Double),
        ];
        assert!(matches!(
            BinaryTimeSeriesFile::create(&path, no_time, vec![]),
            Err(BtsfError::InvalidMetrics(_))
        ));
        assert!(!path.exists());
    }
}
