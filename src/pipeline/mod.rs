// Deduplication and batch-recombination pipeline: staging, cleaning,
// combining, and repacking of wearable stream exports.

pub mod combine;
pub mod dedup;
pub mod recombine;
pub mod shard;
pub mod stage;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::discovery;
use crate::error::{PipelineError, Result};
use crate::notify::Notifier;
use crate::pathmeta;
use crate::types::StreamKind;

use dedup::ledger::DuplicateLedger;

/// What one invocation of the full pipeline should cover.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub root: PathBuf,
    pub streams: Vec<StreamKind>,
    pub month: Option<String>,
    pub output_dir: PathBuf,
    pub scan_only: bool,
}

/// Result of a complete pipeline run, persisted as JSON for the operator.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub months: Vec<String>,
    pub streams: Vec<StreamKind>,
    pub scan_only: bool,
    pub staged_files: usize,
    pub classified_files: usize,
    pub rows_seen: u64,
    pub rows_dropped: u64,
    pub partitions_written: usize,
    pub shards_written: usize,
    pub errors: Vec<String>,
    pub summary_file: String,
}

/// Run the full pipeline: discover raw files, stage them, classify and
/// drop duplicates, combine per stream, and repack into upload shards.
///
/// Combine and recombine failures stop the affected (month, stream) only;
/// the run continues and collects them. Staging and ledger failures abort.
pub fn run_full(
    config: &PipelineConfig,
    request: &RunRequest,
    ledger: &DuplicateLedger,
    notifier: &dyn Notifier,
) -> Result<RunSummary> {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    info!(run = %run_id, "Starting pipeline run over {}", request.root.display());

    // Step 1: discover and stage
    let discovered = discovery::filter_streams(
        discovery::discover_stream_files(&request.root)?,
        &request.streams,
    );
    let staged = stage::stage_files(&discovered, &config.dedup_dir())?;

    // Step 2: classify and drop duplicates, recording counts in the ledger
    let dedup_report = dedup::dedup_staged(
        config,
        request.month.as_deref(),
        &request.streams,
        ledger,
        request.scan_only,
    )?;
    let mut errors = dedup_report.errors.clone();

    // Steps 3 and 4: combine and recombine each staged month. Skipped on a
    // scan-only run, where nothing was cleaned.
    let months: Vec<String> = match &request.month {
        Some(month) => vec![month.clone()],
        None => month_dirs(&config.dedup_dir())?,
    };

    let mut partitions_written = 0usize;
    let mut shards_written = 0usize;
    if !request.scan_only {
        for month in &months {
            for stream in &request.streams {
                match combine::combine_stream(config, month, *stream) {
                    Ok(report) => {
                        partitions_written += report.partitions.len();
                        match recombine::recombine_stream(
                            &report.partitions,
                            *stream,
                            &request.output_dir.join(month),
                            config.max_shard_bytes,
                        ) {
                            Ok(r) => shards_written += r.shards.len(),
                            Err(e) => {
                                error!("Recombine failed for {}/{}: {}", month, stream, e);
                                errors.push(format!("recombine {month}/{stream}: {e}"));
                            }
                        }
                    }
                    Err(e) => {
                        error!("Combine failed for {}/{}: {}", month, stream, e);
                        errors.push(format!("combine {month}/{stream}: {e}"));
                    }
                }
            }
        }
    }

    let finished_at = Utc::now();
    let summary_path = config
        .runs_dir()
        .join(format!("run_{}.json", finished_at.format("%Y%m%d_%H%M%S")));
    let summary = RunSummary {
        run_id,
        started_at,
        finished_at,
        months,
        streams: request.streams.clone(),
        scan_only: request.scan_only,
        staged_files: staged.files_copied,
        classified_files: dedup_report.files_processed,
        rows_seen: dedup_report.rows_seen,
        rows_dropped: dedup_report.rows_dropped,
        partitions_written,
        shards_written,
        errors,
        summary_file: summary_path.to_string_lossy().to_string(),
    };
    persist_summary(&summary, &summary_path)?;
    info!(run = %run_id, "Saved run summary to {}", summary_path.display());

    if config.notifications {
        notifier.notify(&format!(
            "wearprep run {} finished: {} files staged, {} classified, {} shards written, {} errors",
            run_id,
            summary.staged_files,
            summary.classified_files,
            summary.shards_written,
            summary.errors.len()
        ));
    }

    Ok(summary)
}

/// Month directories present under `root` (the staging or pending tree).
pub fn month_dirs(root: &Path) -> Result<Vec<String>> {
    let mut months = Vec::new();
    if !root.exists() {
        return Ok(months);
    }
    for entry in fs::read_dir(root).map_err(|e| PipelineError::file(root, e))? {
        let entry = entry.map_err(|e| PipelineError::file(root, e))?;
        if !entry.path().is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if pathmeta::month_token(Path::new(name)).is_ok() {
                months.push(name.to_string());
            }
        }
    }
    months.sort();
    Ok(months)
}

fn persist_summary(summary: &RunSummary, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| PipelineError::file(parent, e))?;
    }
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(path, json).map_err(|e| PipelineError::file(path, e))?;
    Ok(())
}
