use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::constants;
use crate::error::{PipelineError, Result};
use crate::pipeline::shard::ShardWriter;
use crate::types::StreamKind;

#[derive(Debug)]
pub struct RecombineReport {
    pub stream: StreamKind,
    pub files_in: usize,
    pub rows_in: u64,
    pub rows_out: u64,
    pub shards: Vec<PathBuf>,
}

/// Repack already-combined partition files for one stream into the minimum
/// number of upload shards under `<output_dir>/<stream>/`, none exceeding
/// `max_bytes`.
///
/// Inputs stream through in sorted order in bounded chunks; rows never
/// load wholesale. No input files is a no-op; a single input is copied
/// byte-for-byte since it already fits the budget it was written under.
pub fn recombine_stream(
    inputs: &[PathBuf],
    stream: StreamKind,
    output_dir: &Path,
    max_bytes: u64,
) -> Result<RecombineReport> {
    let out_dir = output_dir.join(stream.name());

    let mut inputs: Vec<PathBuf> = inputs.to_vec();
    inputs.sort();

    if inputs.is_empty() {
        info!("No combined files for {}; nothing to recombine", stream);
        return Ok(RecombineReport {
            stream,
            files_in: 0,
            rows_in: 0,
            rows_out: 0,
            shards: Vec::new(),
        });
    }

    if inputs.len() == 1 {
        let src = &inputs[0];
        fs::create_dir_all(&out_dir).map_err(|e| PipelineError::file(&out_dir, e))?;
        let dest = out_dir.join(constants::shard_file_name(stream.name(), 0));
        fs::copy(src, &dest).map_err(|e| PipelineError::file(src, e))?;
        let rows = count_rows(src)?;
        info!(
            "Copied single combined file for {} to {}",
            stream,
            dest.display()
        );
        return Ok(RecombineReport {
            stream,
            files_in: 1,
            rows_in: rows,
            rows_out: rows,
            shards: vec![dest],
        });
    }

    let prefix = format!("{}_combined_", stream.name());
    let mut writer = ShardWriter::new(&out_dir, prefix, stream.combined_header_line(), max_bytes);
    let mut rows_in = 0u64;
    for path in &inputs {
        rows_in += append_partition(path, stream, &mut writer)?;
    }
    let shard_report = writer.finish()?;

    if shard_report.rows_written != rows_in {
        return Err(PipelineError::Inconsistency(format!(
            "recombination wrote {} rows from {} input rows for {}",
            shard_report.rows_written, rows_in, stream
        )));
    }

    info!(
        "Recombined {} files ({} rows) into {} shards for {}",
        inputs.len(),
        rows_in,
        shard_report.files.len(),
        stream
    );
    Ok(RecombineReport {
        stream,
        files_in: inputs.len(),
        rows_in,
        rows_out: shard_report.rows_written,
        shards: shard_report.files,
    })
}

/// Combined partition files under `dir`, sorted by name. A missing
/// directory simply has no partitions.
pub fn partition_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !dir.exists() {
        return Ok(files);
    }
    for entry in fs::read_dir(dir).map_err(|e| PipelineError::file(dir, e))? {
        let entry = entry.map_err(|e| PipelineError::file(dir, e))?;
        let path = entry.path();
        if path.is_file() && path.extension().map(|e| e == "csv").unwrap_or(false) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn append_partition(path: &Path, stream: StreamKind, writer: &mut ShardWriter) -> Result<u64> {
    let file = File::open(path).map_err(|e| PipelineError::file(path, e))?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let header = match lines.next() {
        Some(line) => line.map_err(|e| PipelineError::file(path, e))?,
        None => return Ok(0), // an empty partition carries nothing
    };
    if header != stream.combined_header_line() {
        return Err(PipelineError::structural(
            path,
            format!("unexpected header '{header}' for the {stream} stream"),
        ));
    }

    let mut buf: Vec<u8> = Vec::with_capacity(constants::RECOMBINE_CHUNK_BYTES);
    let mut rows_buffered = 0u64;
    let mut rows_total = 0u64;
    for line in lines {
        let line = line.map_err(|e| PipelineError::file(path, e))?;
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        rows_buffered += 1;
        if buf.len() >= constants::RECOMBINE_CHUNK_BYTES {
            writer.append_chunk(&buf, rows_buffered)?;
            rows_total += rows_buffered;
            buf.clear();
            rows_buffered = 0;
        }
    }
    if !buf.is_empty() {
        writer.append_chunk(&buf, rows_buffered)?;
        rows_total += rows_buffered;
    }
    Ok(rows_total)
}

fn count_rows(path: &Path) -> Result<u64> {
    let file = File::open(path).map_err(|e| PipelineError::file(path, e))?;
    let reader = BufReader::new(file);
    let mut rows = 0u64;
    for (i, line) in reader.lines().enumerate() {
        line.map_err(|e| PipelineError::file(path, e))?;
        if i > 0 {
            rows += 1;
        }
    }
    Ok(rows)
}
