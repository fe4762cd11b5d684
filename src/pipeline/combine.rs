use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::PipelineConfig;
use crate::constants;
use crate::discovery;
use crate::error::{PipelineError, Result};
use crate::pathmeta::{self, PathIds};
use crate::pipeline::shard::ShardWriter;
use crate::types::StreamKind;

#[derive(Debug)]
pub struct CombineReport {
    pub month: String,
    pub stream: StreamKind,
    pub files_in: usize,
    pub rows: u64,
    pub partitions: Vec<PathBuf>,
}

/// Merge every staged, cleaned per-device file for one (month, stream)
/// into partition files under `pending_upload/<month>/<stream>/`, tagging
/// each row with its `dev_id` and `ppt_id`.
///
/// Files are read in bounded chunks and appended through a rolling writer,
/// so peak memory tracks the chunk size, never the month's total size.
pub fn combine_stream(
    config: &PipelineConfig,
    month: &str,
    stream: StreamKind,
) -> Result<CombineReport> {
    let month_dir = config.dedup_dir().join(month);
    let out_dir = config.pending_dir().join(month).join(stream.name());

    let files = discovery::filter_streams(discovery::discover_stream_files(&month_dir)?, &[stream]);

    let mut writer = ShardWriter::new(
        &out_dir,
        "combined_",
        stream.combined_header_line(),
        config.partition_target_bytes,
    );
    let mut rows_total = 0u64;

    for path in &files {
        // the walk is stream-scoped already; a mismatch here means the
        // staging copy or the glob went wrong, which is not recoverable
        let found = StreamKind::from_path(path)?;
        if found != stream {
            return Err(PipelineError::structural(
                path,
                format!("expected a {stream} file, found {found}"),
            ));
        }
        let ids = pathmeta::extract_ids(path)?;
        info!(
            ppt = %ids.ppt_id,
            dev = %ids.device_id,
            stream = %stream,
            month = %month,
            "Combining {}",
            path.display()
        );
        rows_total += append_file(path, stream, &ids, &mut writer)?;
    }

    let shard_report = writer.finish()?;
    info!(
        "Combined {} files ({} rows) into {} partitions for {}/{}",
        files.len(),
        rows_total,
        shard_report.files.len(),
        month,
        stream
    );
    Ok(CombineReport {
        month: month.to_string(),
        stream,
        files_in: files.len(),
        rows: rows_total,
        partitions: shard_report.files,
    })
}

fn append_file(
    path: &Path,
    stream: StreamKind,
    ids: &PathIds,
    writer: &mut ShardWriter,
) -> Result<u64> {
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

    let mut chunk: Vec<Vec<String>> = Vec::with_capacity(constants::COMBINE_CHUNK_ROWS);
    let mut rows = 0u64;
    for record in reader.records() {
        let record = record?;
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        row.push(ids.device_id.clone());
        row.push(ids.ppt_id.clone());
        chunk.push(row);
        if chunk.len() >= constants::COMBINE_CHUNK_ROWS {
            rows += flush_chunk(&mut chunk, writer)?;
        }
    }
    rows += flush_chunk(&mut chunk, writer)?;
    Ok(rows)
}

fn flush_chunk(chunk: &mut Vec<Vec<String>>, writer: &mut ShardWriter) -> Result<u64> {
    if chunk.is_empty() {
        return Ok(0);
    }
    let rows = chunk.len() as u64;
    let mut buf = csv::Writer::from_writer(Vec::new());
    for row in chunk.iter() {
        buf.write_record(row)?;
    }
    let bytes = buf.into_inner().map_err(|e| {
        PipelineError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
    })?;
    writer.append_chunk(&bytes, rows)?;
    chunk.clear();
    Ok(rows)
}
