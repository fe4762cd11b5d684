use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{PipelineError, Result};

/// One sensor modality. The kind is determined once, from the file stem,
/// at the moment a file is first opened and travels with the table from
/// then on; it is never re-derived from the table's columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Acc,
    Eda,
    Temp,
}

impl StreamKind {
    pub const ALL: [StreamKind; 3] = [StreamKind::Acc, StreamKind::Eda, StreamKind::Temp];

    pub fn name(self) -> &'static str {
        match self {
            StreamKind::Acc => constants::ACC_STREAM,
            StreamKind::Eda => constants::EDA_STREAM,
            StreamKind::Temp => constants::TEMP_STREAM,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            constants::ACC_STREAM => Some(StreamKind::Acc),
            constants::EDA_STREAM => Some(StreamKind::Eda),
            constants::TEMP_STREAM => Some(StreamKind::Temp),
            _ => None,
        }
    }

    /// Determine the stream from a file stem, e.g. `.../acc.csv` -> `Acc`.
    pub fn from_path(path: &Path) -> Result<Self> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| PipelineError::structural(path, "missing file name"))?;
        Self::from_name(stem)
            .ok_or_else(|| PipelineError::structural(path, format!("unknown stream '{stem}'")))
    }

    /// Column names of a raw per-device file.
    pub fn raw_header(self) -> &'static [&'static str] {
        match self {
            StreamKind::Acc => &["time", "x", "y", "z"],
            StreamKind::Eda | StreamKind::Temp => &["time", "measure_value"],
        }
    }

    /// Column names once `dev_id`/`ppt_id` have been attached.
    pub fn combined_header(self) -> &'static [&'static str] {
        match self {
            StreamKind::Acc => &["time", "x", "y", "z", "dev_id", "ppt_id"],
            StreamKind::Eda | StreamKind::Temp => &["time", "measure_value", "dev_id", "ppt_id"],
        }
    }

    pub fn combined_header_line(self) -> String {
        self.combined_header().join(",")
    }

    /// Number of measurement columns following `time`.
    pub fn value_columns(self) -> usize {
        match self {
            StreamKind::Acc => 3,
            StreamKind::Eda | StreamKind::Temp => 1,
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One row of a stream table. Fields stay string-typed end to end; values
/// are never reinterpreted numerically before upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorRow {
    pub time: String,
    pub values: Vec<String>,
}

impl SensorRow {
    /// Whether the primary measurement (`x` for accelerometer,
    /// `measure_value` otherwise) is missing. These exports encode a
    /// missing reading either as an empty field or as a literal `nan`.
    pub fn is_null_measurement(&self) -> bool {
        let primary = self.values.first().map(String::as_str).unwrap_or("");
        let trimmed = primary.trim();
        trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan")
    }
}

/// An in-memory stream file: all rows of one (participant, device, stream,
/// month) CSV, tagged with the stream kind it was opened as.
#[derive(Debug, Clone)]
pub struct SensorTable {
    pub stream: StreamKind,
    pub rows: Vec<SensorRow>,
}

impl SensorTable {
    pub fn new(stream: StreamKind) -> Self {
        Self {
            stream,
            rows: Vec::new(),
        }
    }

    /// Load a raw per-device CSV. The header row is positional: column
    /// names are not trusted, but the column count must match the stream.
    pub fn read_csv(path: &Path, stream: StreamKind) -> Result<Self> {
        let file = File::open(path).map_err(|e| PipelineError::file(path, e))?;
        let mut reader = csv::Reader::from_reader(BufReader::new(file));

        let expected = stream.raw_header().len();
        let header = reader.headers()?;
        if header.len() != expected {
            return Err(PipelineError::structural(
                path,
                format!(
                    "expected {} columns for the {} stream, found {}",
                    expected,
                    stream,
                    header.len()
                ),
            ));
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(SensorRow {
                time: record[0].to_string(),
                values: record.iter().skip(1).map(str::to_string).collect(),
            });
        }
        Ok(Self { stream, rows })
    }

    /// Persist the table back to `path`, replacing any existing file.
    /// Writes to a sibling temp file first and renames, so a crash cannot
    /// leave a half-rewritten file behind.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("csv.tmp");
        {
            let file = File::create(&tmp).map_err(|e| PipelineError::file(&tmp, e))?;
            let mut writer = csv::Writer::from_writer(BufWriter::new(file));
            writer.write_record(self.stream.raw_header())?;
            for row in &self.rows {
                writer.write_record(std::iter::once(row.time.as_str()).chain(row.values.iter().map(String::as_str)))?;
            }
            writer.flush().map_err(|e| PipelineError::file(&tmp, e))?;
        }
        std::fs::rename(&tmp, path).map_err(|e| PipelineError::file(path, e))?;
        Ok(())
    }
}
