use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{PipelineError, Result};

/// Statistics for one rolling write.
#[derive(Debug, Default)]
pub struct ShardReport {
    pub files: Vec<PathBuf>,
    pub rows_written: u64,
    pub bytes_written: u64,
}

/// Append-or-rotate CSV writer bounded by a byte budget.
///
/// Serialized chunks are appended to the current file until the next chunk
/// would push it past `max_bytes`; the file is then flushed, closed, and a
/// successor opened. Every physical file starts with the header, written
/// exactly once. Files open lazily, so a writer that never receives a
/// chunk produces no output. If the caller bails out mid-stream, dropping
/// the writer closes the current file handle.
pub struct ShardWriter {
    dir: PathBuf,
    prefix: String,
    header: String,
    max_bytes: u64,
    writer: Option<BufWriter<File>>,
    index: usize,
    current_bytes: u64,
    report: ShardReport,
}

impl ShardWriter {
    pub fn new(
        dir: &Path,
        prefix: impl Into<String>,
        header: impl Into<String>,
        max_bytes: u64,
    ) -> Self {
        Self {
            dir: dir.to_path_buf(),
            prefix: prefix.into(),
            header: header.into(),
            max_bytes,
            writer: None,
            index: 0,
            current_bytes: 0,
            report: ShardReport::default(),
        }
    }

    fn header_bytes(&self) -> u64 {
        self.header.len() as u64 + 1
    }

    fn current_path(&self) -> PathBuf {
        self.dir.join(format!("{}{}.csv", self.prefix, self.index))
    }

    fn open_next(&mut self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| PipelineError::file(&self.dir, e))?;
        let path = self.current_path();
        let file = File::create(&path).map_err(|e| PipelineError::file(&path, e))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(self.header.as_bytes())
            .and_then(|_| writer.write_all(b"\n"))
            .map_err(|e| PipelineError::file(&path, e))?;
        self.current_bytes = self.header_bytes();
        self.report.bytes_written += self.header_bytes();
        self.report.files.push(path);
        self.writer = Some(writer);
        Ok(())
    }

    fn close_current(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .flush()
                .map_err(|e| PipelineError::file(&self.current_path(), e))?;
        }
        Ok(())
    }

    /// Append one serialized chunk of `rows` CSV rows (no header).
    ///
    /// A chunk that cannot fit an empty file even on its own is a budget
    /// violation the rotation logic cannot repair; it is reported rather
    /// than written oversized.
    pub fn append_chunk(&mut self, chunk: &[u8], rows: u64) -> Result<()> {
        let chunk_len = chunk.len() as u64;
        if self.header_bytes() + chunk_len > self.max_bytes {
            return Err(PipelineError::SizeBudgetViolation {
                path: self.current_path(),
                bytes: chunk_len,
                max_bytes: self.max_bytes,
            });
        }

        if self.writer.is_none() {
            self.open_next()?;
        } else if self.current_bytes + chunk_len > self.max_bytes {
            self.close_current()?;
            self.index += 1;
            self.open_next()?;
            debug!("Rotated to {}", self.current_path().display());
        }

        let path = self.current_path();
        if let Some(writer) = self.writer.as_mut() {
            writer
                .write_all(chunk)
                .map_err(|e| PipelineError::file(&path, e))?;
        }
        self.current_bytes += chunk_len;
        self.report.rows_written += rows;
        self.report.bytes_written += chunk_len;
        Ok(())
    }

    /// Flush and close the current file, returning what was written.
    pub fn finish(mut self) -> Result<ShardReport> {
        self.close_current()?;
        Ok(std::mem::take(&mut self.report))
    }
}
