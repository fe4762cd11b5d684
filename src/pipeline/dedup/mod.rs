// Per-file deduplication: load each staged stream file, classify its rows,
// persist the cleaned table, and record the counts in the audit ledger.

pub mod classify;
pub mod ledger;

use std::path::Path;

use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::discovery;
use crate::error::{PipelineError, Result};
use crate::pathmeta;
use crate::types::{SensorTable, StreamKind};

use ledger::{DuplicateLedger, LedgerEntry};

#[derive(Debug, Default)]
pub struct DedupReport {
    pub files_processed: usize,
    pub rows_seen: u64,
    pub rows_dropped: u64,
    pub errors: Vec<String>,
}

struct FileOutcome {
    rows_seen: u64,
    rows_dropped: u64,
}

/// Walk the staging tree and deduplicate every file for the requested
/// streams, optionally restricted to one month.
///
/// A structural or I/O problem stops the affected file only; the run
/// carries on with the next one and the failure is surfaced in the report.
/// A ledger write failure aborts the whole run, because the ledger is the
/// audit contract. With `scan_only` the counts are recorded but no row is
/// dropped and no file rewritten.
pub fn dedup_staged(
    config: &PipelineConfig,
    month: Option<&str>,
    streams: &[StreamKind],
    ledger: &DuplicateLedger,
    scan_only: bool,
) -> Result<DedupReport> {
    let staging = config.dedup_dir();
    let mut report = DedupReport::default();

    if !staging.exists() {
        warn!(
            "Staging tree {} does not exist; nothing to deduplicate",
            staging.display()
        );
        return Ok(report);
    }

    let files = discovery::filter_streams(discovery::discover_stream_files(&staging)?, streams);
    for path in &files {
        match process_file(path, month, ledger, scan_only) {
            Ok(Some(outcome)) => {
                report.files_processed += 1;
                report.rows_seen += outcome.rows_seen;
                report.rows_dropped += outcome.rows_dropped;
            }
            Ok(None) => {} // outside the requested month
            Err(e @ PipelineError::Ledger(_)) => return Err(e),
            Err(e) => {
                error!("Failed to process {}: {}", path.display(), e);
                report.errors.push(format!("{}: {}", path.display(), e));
            }
        }
    }

    info!(
        "Deduplicated {} files: {} rows seen, {} dropped, {} errors",
        report.files_processed,
        report.rows_seen,
        report.rows_dropped,
        report.errors.len()
    );
    Ok(report)
}

fn process_file(
    path: &Path,
    month_filter: Option<&str>,
    ledger: &DuplicateLedger,
    scan_only: bool,
) -> Result<Option<FileOutcome>> {
    let stream = StreamKind::from_path(path)?;
    let month = pathmeta::month_token(path)?;
    if let Some(filter) = month_filter {
        if month != filter {
            return Ok(None);
        }
    }
    let ids = pathmeta::extract_ids(path)?;

    info!(
        ppt = %ids.ppt_id,
        dev = %ids.device_id,
        stream = %stream,
        month = %month,
        "Classifying {}",
        path.display()
    );

    let mut table = SensorTable::read_csv(path, stream)?;
    classify::normalize_quirks(&mut table);
    let classification = classify::classify(&table)?;
    let counts = classification.counts;

    let mut rows_dropped = 0;
    if !scan_only {
        let outcome = classify::apply_drop_policy(&table, &classification);
        rows_dropped = counts.total_rows - outcome.table.rows.len() as u64;
        outcome.table.write_csv(path)?;
    }

    ledger.record_or_update(LedgerEntry::new(&ids, &month, stream, counts))?;

    debug!(
        total_rows = counts.total_rows,
        total_dupes = counts.total_dupes,
        perfect = counts.perfect,
        unclear = counts.unclear,
        nan = counts.nan,
        rows_dropped,
        "Recorded counts for {}",
        path.display()
    );

    Ok(Some(FileOutcome {
        rows_seen: counts.total_rows,
        rows_dropped,
    }))
}
